use std::path::PathBuf;

use thiserror::Error; // A popular crate for defining errors

#[derive(Error, Debug)]
pub enum TransferError {
    #[cfg(feature = "local")]
    #[error("Network connection error: {0}")]
    ReqwestClient(#[from] reqwest::Error,),

    #[cfg(feature = "local")]
    #[error("Network connection error: {0}")]
    ReqwestMiddleware(#[from] reqwest_middleware::Error),

    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Can't (de)serialize transfer record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Part task could not be joined: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File {} is locked by another download", .0.display())]
    FileLocked(PathBuf),

    #[error("Server ignored range request for bytes {start}-{end}")]
    RangeNotSupported { start: u64, end: u64 },

    #[error("Part {part_number} ended after {received} of {expected} bytes")]
    ShortPart { part_number: u32, received: u64, expected: u64 },

    #[error("Part download was canceled")]
    Canceled,

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("Critical system failure: {0}")]
    Fatal(String),
}

/// Raised when one part of a multipart download fails and takes the
/// whole download down with it. The failing part's error is kept as the source.
#[derive(Error, Debug)]
#[error("Unable to complete multi-part download. Individual part download failed : {source}")]
pub struct CompletionError {
    part_number: u32,
    #[source]
    source: Box<TransferError>,
}

impl CompletionError {
    pub fn new(part_number: u32, source: TransferError) -> Self {
        Self { part_number, source: Box::new(source) }
    }

    ///Number of the part whose failure aborted the download.
    pub fn part_number(&self) -> u32 {
        self.part_number
    }

    pub fn cause(&self) -> &TransferError {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_completion_error_keeps_cause() {
        let err = CompletionError::new(2, TransferError::Fatal("disk full".into()));
        assert_eq!(err.part_number(), 2);
        assert!(err.to_string().starts_with("Unable to complete multi-part download."));
        assert!(err.to_string().contains("disk full"));
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("Critical system failure: disk full"));
    }
}
