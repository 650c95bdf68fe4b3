//! Error type shared across the ingestion pipeline.

/// Errors produced by the knowledge-graph core.
///
/// Variants map onto the failure classes the orchestrator distinguishes:
/// bad input, transient I/O, store failures, clone failures, timeouts,
/// cooperative cancellation, and everything else.
#[derive(Debug, thiserror::Error)]
pub enum KgError {
    /// Invalid request or unsupported input (missing path, bad file type).
    #[error("invalid input: {0}")]
    Input(String),

    /// Filesystem-level failure (unreadable file, missing directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Store insert or query failure.
    #[error("store error: {0}")]
    Store(String),

    /// Remote clone failed.
    #[error("clone failed: {0}")]
    Clone(String),

    /// A bounded operation exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Cooperative cancellation was observed at a probe point.
    ///
    /// The display string is persisted verbatim as the source's
    /// `parsing_error`, so clients can match on it.
    #[error("Parsing was cancelled by user")]
    Cancelled,

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for KgError {
    fn from(e: rusqlite::Error) -> Self {
        KgError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for KgError {
    fn from(e: serde_json::Error) -> Self {
        KgError::Internal(format!("serialization: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, KgError>;
