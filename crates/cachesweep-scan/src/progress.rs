use cachesweep_core::StatusClass;
use serde::Serialize;
use std::path::PathBuf;

/// One per-file progress notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    /// 1-based.
    pub index: usize,
    pub total: usize,
    pub percent: f64,
    pub path: PathBuf,
    pub status: StatusClass,
    pub reason: Option<String>,
}

impl Progress {
    pub fn new(
        index: usize,
        total: usize,
        path: PathBuf,
        status: StatusClass,
        reason: Option<String>,
    ) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            ((index as f64 / total as f64) * 1000.0).round() / 10.0
        };
        Self {
            index,
            total,
            percent,
            path,
            status,
            reason,
        }
    }

    /// `[3/10  30.0%] ✓ src/lib.rs`
    pub fn line(&self) -> String {
        let symbol = match self.status {
            StatusClass::Cached => "⚡",
            StatusClass::Success => "✓",
            StatusClass::Error => "✗",
        };
        format!(
            "[{}/{} {:5.1}%] {symbol} {}",
            self.index,
            self.total,
            self.percent,
            self.path.display()
        )
    }
}

/// Receives progress notifications. Observational only.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, progress: &Progress);
}

/// Prints to stdout.
pub struct StdoutProgress;

impl ProgressSink for StdoutProgress {
    fn emit(&self, progress: &Progress) {
        println!("{}", progress.line());
        if let Some(reason) = &progress.reason {
            println!("   └─ Error: {reason}");
        }
    }
}

/// Discards notifications (`--json` runs).
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn emit(&self, _progress: &Progress) {}
}

/// Collects notifications in memory (for testing).
#[derive(Default)]
pub struct CollectProgress {
    events: std::sync::Mutex<Vec<Progress>>,
}

impl CollectProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Progress> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for CollectProgress {
    fn emit(&self, progress: &Progress) {
        self.events.lock().unwrap().push(progress.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_has_one_decimal() {
        let p = Progress::new(1, 3, "a.rs".into(), StatusClass::Success, None);
        assert_eq!(p.percent, 33.3);
        let p = Progress::new(2, 3, "a.rs".into(), StatusClass::Success, None);
        assert_eq!(p.percent, 66.7);
        let p = Progress::new(3, 3, "a.rs".into(), StatusClass::Success, None);
        assert_eq!(p.percent, 100.0);
    }

    #[test]
    fn line_format() {
        let p = Progress::new(1, 4, "src/lib.rs".into(), StatusClass::Cached, None);
        assert_eq!(p.line(), "[1/4  25.0%] ⚡ src/lib.rs");
        let p = Progress::new(
            4,
            4,
            "src/x.rs".into(),
            StatusClass::Error,
            Some("timeout".into()),
        );
        assert_eq!(p.line(), "[4/4 100.0%] ✗ src/x.rs");
    }
}
