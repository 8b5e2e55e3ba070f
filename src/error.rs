use thiserror::Error;

/// A cinderkv Result returning [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the storage engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller supplied an empty key or an oversized key/value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A filesystem or positional-read failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A segment file failed structural validation: unreadable trailer,
    /// a sparse-index entry overrunning the file, or a record header
    /// claiming more bytes than remain.
    #[error("corrupt segment: {0}")]
    CorruptSegment(String),

    /// A lock-acquisition or invariant violation that indicates a bug.
    #[error("internal error: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Internal(format!("poisoned lock: {err}"))
    }
}
