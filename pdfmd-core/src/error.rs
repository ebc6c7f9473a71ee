use std::path::PathBuf;

/// Error taxonomy for the conversion pipeline, mapped to HTTP status codes
/// by the API facade (`NotFound` -> 404, `InvalidArgument` -> 400,
/// everything else -> 500). `PageProcessingError` and `OcrError` are never
/// returned from `convert_pdf` itself: they are recorded inline in the
/// Markdown output and never abort a job.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("corrupt or unreadable PDF: {0}")]
    Corrupt(String),

    #[error("error processing page {page}: {reason}")]
    PageProcessingError { page: usize, reason: String },

    #[error("OCR failed on page {page}: {reason}")]
    OcrError { page: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unauthorized")]
    Unauthorized,

    #[error("canceled")]
    Canceled,
}

pub type Result<T> = std::result::Result<T, ConvertError>;
