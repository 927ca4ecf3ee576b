use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Marker the analyzer prints when it reused a stored result.
pub const CACHE_HIT_MARKER: &str = "Using cached";

/// Marker the analyzer prints when it persisted a fresh result.
pub const CACHE_WRITE_MARKER: &str = "Analysis cached";

/// Reason recorded for a failure whose output was empty.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Reason recorded for an invocation that exceeded its time bound.
pub const TIMEOUT_REASON: &str = "timeout";

/// One file to analyze. Created by the selector, consumed once by the invoker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileTask {
    pub absolute: PathBuf,
    pub relative: PathBuf,
}

impl FileTask {
    pub fn new(root: &Path, absolute: PathBuf) -> Self {
        let relative = absolute
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| absolute.clone());
        Self { absolute, relative }
    }
}

/// Result of a single analyzer invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvocationOutcome {
    Success { cached: bool },
    Failure { reason: String },
    Timeout,
}

impl InvocationOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        InvocationOutcome::Failure {
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> StatusClass {
        match self {
            InvocationOutcome::Success { cached: true } => StatusClass::Cached,
            InvocationOutcome::Success { cached: false } => StatusClass::Success,
            InvocationOutcome::Failure { .. } | InvocationOutcome::Timeout => StatusClass::Error,
        }
    }

    /// Reason to record in the failure list, `None` for successes.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            InvocationOutcome::Success { .. } => None,
            InvocationOutcome::Failure { reason } => Some(reason),
            InvocationOutcome::Timeout => Some(TIMEOUT_REASON),
        }
    }
}

/// Coarse status used by progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Cached,
    Success,
    Error,
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusClass::Cached => "cached",
            StatusClass::Success => "success",
            StatusClass::Error => "error",
        };
        f.write_str(s)
    }
}

/// A failed file and the reason it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Counts accumulated over one scan run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub new_analyses: usize,
    pub cache_hits: usize,
    pub failed: usize,
    pub failures: Vec<FailureEntry>,
}

impl RunStatistics {
    pub fn total(&self) -> usize {
        self.new_analyses + self.cache_hits + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
