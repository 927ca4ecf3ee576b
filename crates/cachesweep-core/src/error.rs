//! Error taxonomy shared by the cachesweep crates.

use thiserror::Error;

/// Errors surfaced by scans, the registry, and configuration.
///
/// `Timeout` and `AnalyzerFailure` describe a single file and are normally
/// folded into run statistics rather than returned; they exist as variants so
/// callers that invoke the analyzer directly can propagate them.
#[derive(Debug, Error)]
pub enum SweepError {
    /// A record referenced by name does not exist.
    #[error("repository not found: {name}")]
    NotFound { name: String },

    /// A record with the same path is already registered.
    #[error("repository already exists: {path}")]
    AlreadyExists { path: String },

    /// The analyzer did not finish within its bound.
    #[error("analyzer timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The analyzer exited non-zero or could not be started.
    #[error("analyzer failed: {reason}")]
    AnalyzerFailure { reason: String },

    /// Missing binary, configuration, repository root, or cache namespace.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The underlying transactional store rejected an operation.
    #[error("store error: {0}")]
    Store(String),

    /// `accumulate` was called on an aggregator that was already finalized.
    #[error("run aggregator already finalized")]
    Finalized,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SweepError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        SweepError::Precondition(msg.into())
    }

    /// True for errors that abort a whole run before any file is processed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SweepError::Precondition(_) | SweepError::Io(_))
    }
}

impl From<rusqlite::Error> for SweepError {
    fn from(err: rusqlite::Error) -> Self {
        SweepError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for SweepError {
    fn from(err: serde_json::Error) -> Self {
        SweepError::Store(format!("serialization failed: {err}"))
    }
}

/// Convenience result alias.
pub type SweepResult<T> = std::result::Result<T, SweepError>;
