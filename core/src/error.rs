use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing/trailer/decompression mismatch: the bytes on disk don't agree
    /// with what they claim to be.
    #[error("corruption: {0}")]
    Corruption(String),

    /// A chunk named by a VersionIndex has no placement in the supplied
    /// ContentIndex.
    #[error("inconsistency: {0}")]
    Inconsistency(String),

    /// At least one worker job reported failure; this wraps the first one
    /// collected.
    #[error("job failed: {0}")]
    JobFailure(Box<Error>),

    /// A worker job panicked instead of returning an error.
    #[error("job panicked: {0}")]
    JobPanic(String),
}

impl Error {
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    pub fn inconsistency(msg: impl Into<String>) -> Self {
        Error::Inconsistency(msg.into())
    }
}
