//! Document error types
//!
//! Unified error handling for all document formats (PDF, EPUB, TXT).

use std::path::PathBuf;

use thiserror::Error;

/// Unified document error type
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Path or URI does not resolve to an existing resource
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Detected or requested format has no backing engine
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// EPUB container descriptor or package document missing/unparseable
    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    /// Chapter (or page) index outside `[0, count)`
    #[error("Invalid chapter index {index} (document has {count} chapters)")]
    InvalidChapterIndex { index: usize, count: usize },

    /// Text encoding could not be determined (strict charset mode only)
    #[error("Unable to detect text encoding: {0}")]
    EncodingUndetectable(String),

    /// No document is open on the engine
    #[error("No document is open")]
    NotOpen,

    /// The session was closed; its data is no longer available
    #[error("Document session has been closed")]
    DocumentClosed,

    /// Operation cancelled through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation not offered by this format
    #[error("Operation not supported for {format}: {operation}")]
    UnsupportedOperation {
        format: &'static str,
        operation: &'static str,
    },

    /// Failed to render content
    #[error("Render error: {0}")]
    Render(String),

    /// MuPDF error
    #[error("PDF error: {0}")]
    Pdf(String),

    /// XML parse error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// ZIP archive error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Invalid heading pattern
    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking task failed to complete
    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl DocumentError {
    /// Shorthand for an out-of-range index error
    pub fn invalid_index(index: usize, count: usize) -> Self {
        DocumentError::InvalidChapterIndex { index, count }
    }
}

impl From<mupdf::Error> for DocumentError {
    fn from(err: mupdf::Error) -> Self {
        DocumentError::Pdf(err.to_string())
    }
}

impl From<tokio::task::JoinError> for DocumentError {
    fn from(err: tokio::task::JoinError) -> Self {
        DocumentError::TaskJoin(err.to_string())
    }
}

/// Result type alias for document operations
pub type Result<T> = std::result::Result<T, DocumentError>;

/// Alias for Result
pub type DocumentResult<T> = Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_index_message() {
        let err = DocumentError::invalid_index(7, 3);
        assert_eq!(
            err.to_string(),
            "Invalid chapter index 7 (document has 3 chapters)"
        );
    }

    #[test]
    fn test_file_not_found_message() {
        let err = DocumentError::FileNotFound(PathBuf::from("/books/missing.epub"));
        assert_eq!(err.to_string(), "File not found: /books/missing.epub");
    }
}
