//! One scan of one repository:
//! `Init → CacheCheck → Discover → (empty? → Done) → Dispatch* → Report → (commit?) → Done`.

use crate::aggregate::RunAggregator;
use crate::git::Vcs;
use crate::invoke::Analyzer;
use crate::progress::ProgressSink;
use crate::select::{select, ExclusionProfile};
use cachesweep_core::{RunStatistics, SweepError, SweepResult};
use cachesweep_store::ScanLock;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Failures listed in the human-readable report.
pub const MAX_REPORTED_FAILURES: usize = 10;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub repo_root: PathBuf,
    pub limit: Option<usize>,
    pub exclusions: ExclusionProfile,
    pub extension: String,
    /// Cache namespace directory, relative to `repo_root`.
    pub cache_dir_name: String,
    pub auto_commit: bool,
    /// Where per-repository scan locks live. `None` disables locking.
    pub lock_dir: Option<PathBuf>,
}

/// What the commit step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "commit", content = "detail", rename_all = "snake_case")]
pub enum CommitOutcome {
    NotRequested,
    /// The run was cancelled before dispatch finished.
    Cancelled,
    /// Zero new analyses; the commit step was not entered.
    NothingNew,
    NotRepository,
    /// Staging produced no difference.
    NoChanges,
    Committed,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub repo_root: PathBuf,
    /// Files selected for dispatch (after `limit`).
    pub total: usize,
    pub stats: RunStatistics,
    pub commit: CommitOutcome,
    pub cache_status: Option<String>,
    pub cancelled: bool,
}

impl ScanReport {
    /// 0 iff no file failed. Commit outcome never affects it.
    pub fn exit_code(&self) -> u8 {
        if self.stats.has_failures() {
            1
        } else {
            0
        }
    }

    /// Whether any file got a fresh analysis.
    pub fn produced_new_analyses(&self) -> bool {
        self.stats.new_analyses > 0
    }

    pub fn render(&self) -> String {
        let s = &self.stats;
        let mut out = String::new();
        let _ = writeln!(out, "Scan of {}", self.repo_root.display());
        if self.total == 0 {
            let _ = writeln!(out, "  No matching files found.");
            return out;
        }
        let _ = writeln!(out, "  Files:         {}", self.total);
        let _ = writeln!(out, "  New analyses:  {}", s.new_analyses);
        let _ = writeln!(out, "  Cached:        {}", s.cache_hits);
        let _ = writeln!(out, "  Failed:        {}", s.failed);
        if self.cancelled {
            let _ = writeln!(
                out,
                "  Cancelled after {} of {} files.",
                s.total(),
                self.total
            );
        }

        if !s.failures.is_empty() {
            let _ = writeln!(out, "\nFailures:");
            for f in s.failures.iter().take(MAX_REPORTED_FAILURES) {
                let _ = writeln!(out, "  ✗ {}: {}", f.path.display(), f.reason);
            }
            if s.failures.len() > MAX_REPORTED_FAILURES {
                let _ = writeln!(
                    out,
                    "  ... +{} more",
                    s.failures.len() - MAX_REPORTED_FAILURES
                );
            }
        }

        if let Some(status) = &self.cache_status {
            let _ = writeln!(out, "\nCache status:");
            for line in status.lines() {
                let _ = writeln!(out, "  {line}");
            }
        }

        let commit = match &self.commit {
            CommitOutcome::NotRequested => None,
            CommitOutcome::Cancelled => Some("skipped (cancelled)".to_string()),
            CommitOutcome::NothingNew => Some("skipped (no new analyses)".to_string()),
            CommitOutcome::NotRepository => Some("skipped (not a git repository)".to_string()),
            CommitOutcome::NoChanges => Some("skipped (cache unchanged)".to_string()),
            CommitOutcome::Committed => Some("committed".to_string()),
            CommitOutcome::Failed(e) => Some(format!("failed: {e}")),
        };
        if let Some(commit) = commit {
            let _ = writeln!(out, "\nCommit: {commit}");
        }
        out
    }
}

pub fn commit_message(stats: &RunStatistics) -> String {
    format!(
        "chore: update analysis cache\n\n\
         - Scanned {} files\n\
         - Cached {} new analyses\n\
         - {} errors encountered\n\
         - Generated by cachesweep",
        stats.total(),
        stats.new_analyses,
        stats.failed
    )
}

/// Run one scan. Per-file failures land in the report; only precondition
/// failures (missing root, held lock, failed cache bootstrap) return `Err`.
pub async fn run_scan(
    opts: &ScanOptions,
    analyzer: &dyn Analyzer,
    vcs: &dyn Vcs,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> SweepResult<ScanReport> {
    // Init
    if !opts.repo_root.is_dir() {
        return Err(SweepError::precondition(format!(
            "repository path does not exist: {}",
            opts.repo_root.display()
        )));
    }
    let root = opts.repo_root.canonicalize()?;
    let _lock = match &opts.lock_dir {
        Some(dir) => Some(
            ScanLock::acquire(dir, &root).map_err(|e| SweepError::precondition(format!("{e:#}")))?,
        ),
        None => None,
    };

    // CacheCheck
    let cache_path = root.join(&opts.cache_dir_name);
    if !cache_path.is_dir() {
        tracing::info!("initializing cache namespace at {}", cache_path.display());
        analyzer.cache_init(&root).await?;
        if !cache_path.is_dir() {
            tracing::warn!(
                "cache init succeeded but {} does not exist",
                cache_path.display()
            );
        }
    }

    // Discover
    let tasks = select(&root, &opts.extension, opts.exclusions.clone()).collect_limited(opts.limit);
    let total = tasks.len();
    if total == 0 {
        tracing::info!("no matching files under {}", root.display());
        return Ok(ScanReport {
            repo_root: root,
            total: 0,
            stats: RunStatistics::default(),
            commit: if opts.auto_commit {
                CommitOutcome::NothingNew
            } else {
                CommitOutcome::NotRequested
            },
            cache_status: None,
            cancelled: false,
        });
    }
    tracing::info!("scanning {total} files under {}", root.display());

    // Dispatch*
    let mut aggregator = RunAggregator::new(total, progress);
    let mut cancelled = false;
    for task in &tasks {
        if cancel.is_cancelled() {
            tracing::warn!(
                "scan cancelled after {} of {total} files",
                aggregator.seen()
            );
            cancelled = true;
            break;
        }
        let outcome = analyzer.analyze(&root, &task.relative).await;
        tracing::debug!(path = %task.relative.display(), status = %outcome.status(), "analyzed");
        aggregator.accumulate(&outcome, &task.relative)?;
    }

    // Report
    let stats = aggregator.finalize();
    let cache_status = analyzer.cache_status(&root).await;

    // Commit
    let commit = if !opts.auto_commit {
        CommitOutcome::NotRequested
    } else if cancelled {
        CommitOutcome::Cancelled
    } else if stats.new_analyses == 0 {
        CommitOutcome::NothingNew
    } else {
        commit_cache(vcs, &root, Path::new(&opts.cache_dir_name), &stats).await
    };

    Ok(ScanReport {
        repo_root: root,
        total,
        stats,
        commit,
        cache_status,
        cancelled,
    })
}

async fn commit_cache(
    vcs: &dyn Vcs,
    root: &Path,
    cache: &Path,
    stats: &RunStatistics,
) -> CommitOutcome {
    if !vcs.is_repository(root).await {
        tracing::warn!("{} is not a git repository, skipping commit", root.display());
        return CommitOutcome::NotRepository;
    }
    let result = async {
        vcs.stage(root, cache).await?;
        if !vcs.has_staged_changes(root, cache).await? {
            return Ok(CommitOutcome::NoChanges);
        }
        vcs.commit(root, &commit_message(stats), cache).await?;
        Ok::<_, anyhow::Error>(CommitOutcome::Committed)
    }
    .await;

    match result {
        Ok(outcome) => {
            tracing::info!("commit step: {outcome:?}");
            outcome
        }
        Err(e) => {
            tracing::warn!("cache commit failed: {e:#}");
            CommitOutcome::Failed(format!("{e:#}"))
        }
    }
}
