use thiserror::Error;

/// Failure while walking a file's metadata structures.
///
/// Never leaves the engine: [`crate::container::extract_capture_date`] maps every
/// variant to an unknown date.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("read of {len} bytes at offset {offset} runs past the end of the data ({available} bytes)")]
    TruncatedData {
        offset: usize,
        len: usize,
        available: usize,
    },

    #[error("malformed directory: {0}")]
    MalformedDirectory(String),

    #[error("unsupported container")]
    UnsupportedContainer,
}

impl ParseError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        ParseError::MalformedDirectory(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
