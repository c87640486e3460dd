use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the bill tracker crates.
#[derive(Error, Debug)]
pub enum BillError {
    /// A file could not be read or written.
    #[error("Failed to access file {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed or produced.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A bill form failed validation before persistence.
    #[error("Invalid bill: {0}")]
    Validation(String),

    /// No record with the given id exists in the store.
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// A merged row was targeted by a delete; only source records can be deleted.
    #[error("Merged record {0} cannot be deleted individually")]
    CompositeRecord(String),

    /// The OCR service answered with a non-success HTTP status.
    #[error("OCR request failed with status {status}: {body}")]
    OcrStatus { status: u16, body: String },

    /// The OCR request never produced a response (connect, timeout, TLS).
    #[error("OCR transport error: {0}")]
    OcrTransport(String),

    /// The OCR service answered but the payload held no usable JSON.
    #[error("OCR response was not valid JSON: {0}")]
    OcrResponse(String),

    /// No API key was configured for the OCR service.
    #[error("Gemini API key is not configured")]
    MissingApiKey,

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BillError {
    /// Wrap an I/O error together with the path it concerns.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BillError::FileAccess {
            path: path.into(),
            source,
        }
    }

    /// Whether a failed OCR attempt is worth retrying.
    ///
    /// Rate limiting (429), server errors (5xx) and transport failures are
    /// transient; every other error is final.
    pub fn is_transient(&self) -> bool {
        match self {
            BillError::OcrStatus { status, .. } => *status == 429 || (500..600).contains(status),
            BillError::OcrTransport(_) => true,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the bill tracker crates.
pub type Result<T> = std::result::Result<T, BillError>;
