use crate::progress::{Progress, ProgressSink};
use cachesweep_core::{FailureEntry, InvocationOutcome, RunStatistics, SweepError, SweepResult};
use std::path::Path;

/// Folds per-file outcomes into [`RunStatistics`].
pub struct RunAggregator<'a> {
    total: usize,
    seen: usize,
    stats: RunStatistics,
    finalized: bool,
    progress: &'a dyn ProgressSink,
}

impl<'a> RunAggregator<'a> {
    /// `total` is the number of files the run expects to dispatch.
    pub fn new(total: usize, progress: &'a dyn ProgressSink) -> Self {
        Self {
            total,
            seen: 0,
            stats: RunStatistics::default(),
            finalized: false,
            progress,
        }
    }

    pub fn accumulate(&mut self, outcome: &InvocationOutcome, path: &Path) -> SweepResult<()> {
        if self.finalized {
            return Err(SweepError::Finalized);
        }
        self.seen += 1;

        let reason = outcome.failure_reason().map(str::to_string);
        match outcome {
            InvocationOutcome::Success { cached: true } => self.stats.cache_hits += 1,
            InvocationOutcome::Success { cached: false } => self.stats.new_analyses += 1,
            InvocationOutcome::Failure { .. } | InvocationOutcome::Timeout => {
                self.stats.failed += 1;
                self.stats.failures.push(FailureEntry {
                    path: path.to_path_buf(),
                    reason: reason.clone().unwrap_or_default(),
                });
            }
        }

        self.progress.emit(&Progress::new(
            self.seen,
            self.total.max(self.seen),
            path.to_path_buf(),
            outcome.status(),
            reason,
        ));
        Ok(())
    }

    /// Number of outcomes accumulated so far.
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Snapshot of the statistics. Further `accumulate` calls are rejected.
    pub fn finalize(&mut self) -> RunStatistics {
        self.finalized = true;
        self.stats.clone()
    }
}
