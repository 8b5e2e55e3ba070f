//! Record encoding and segment layout constants.

use std::io::Write;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::error::{Error, Result};

/// Fixed record header: u16 key_len + u32 value_len + u32 flags +
/// u16 tombstone.
pub const RECORD_HEADER_LEN: usize = 12;

/// Trailer at the end of every segment file: bloom_start + index_start,
/// both 8-byte big-endian.
pub const TRAILER_LEN: u64 = 16;

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub key_len: usize,
    pub value_len: usize,
    pub flags: u32,
    pub tombstone: bool,
}

impl RecordHeader {
    /// Total encoded record length, header included.
    pub fn record_len(&self) -> usize {
        RECORD_HEADER_LEN + self.key_len + self.value_len
    }
}

/// Encodes one record into `w`. The caller is responsible for key and
/// value length bounds; the engine validates them before any write.
pub fn encode_record<W: Write>(
    w: &mut W,
    key: &[u8],
    value: &[u8],
    flags: u32,
    tombstone: bool,
) -> Result<()> {
    w.write_u16::<BigEndian>(key.len() as u16)?;
    w.write_u32::<BigEndian>(value.len() as u32)?;
    w.write_u32::<BigEndian>(flags)?;
    w.write_u16::<BigEndian>(u16::from(tombstone))?;
    w.write_all(key)?;
    w.write_all(value)?;
    Ok(())
}

/// Decodes a record header from the front of `buf`.
pub fn decode_header(buf: &[u8]) -> Result<RecordHeader> {
    if buf.len() < RECORD_HEADER_LEN {
        return Err(Error::CorruptSegment(format!(
            "record header truncated: {} bytes remain",
            buf.len()
        )));
    }
    Ok(RecordHeader {
        key_len: BigEndian::read_u16(&buf[0..2]) as usize,
        value_len: BigEndian::read_u32(&buf[2..6]) as usize,
        flags: BigEndian::read_u32(&buf[6..10]),
        tombstone: BigEndian::read_u16(&buf[10..12]) == 1,
    })
}
