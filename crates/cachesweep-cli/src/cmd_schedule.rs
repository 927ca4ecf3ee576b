use crate::cmd_repo::open_store;
use crate::cmd_scan::{exclusions, process_analyzer};
use cachesweep_core::{RepositoryRecord, SweepConfig};
use cachesweep_registry::{
    due_for_scan, run_pass, DispatchReport, PassOutcome, PassReport, ScanDispatcher,
};
use cachesweep_scan::{run_scan, GitCli, ProcessAnalyzer, ScanOptions, StdoutProgress};
use std::process::ExitCode;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

pub fn due(config: &SweepConfig, json: bool) -> anyhow::Result<ExitCode> {
    let store = open_store(config)?;
    let due = due_for_scan(&store.list_repos(true)?, OffsetDateTime::now_utc());
    if json {
        println!("{}", serde_json::to_string_pretty(&due)?);
    } else if due.is_empty() {
        println!("No repositories due for a scan");
    } else {
        for r in &due {
            let last = r
                .last_scan_check
                .map(|t| t.to_string())
                .unwrap_or_else(|| "never".to_string());
            println!("{:<25} every {}m, last checked {last}", r.name, r.scan_interval_minutes);
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Runs a full scan of a registered repository.
struct RegistryDispatcher {
    analyzer: ProcessAnalyzer,
    extension: String,
    cache_dir_name: String,
    auto_commit: bool,
    cancel: CancellationToken,
}

#[async_trait::async_trait]
impl ScanDispatcher for RegistryDispatcher {
    async fn dispatch(&self, record: &RepositoryRecord) -> anyhow::Result<DispatchReport> {
        println!("\n==> {} ({})", record.name, record.path);
        let opts = ScanOptions {
            repo_root: cachesweep_store::expand_home(&record.path),
            limit: None,
            exclusions: exclusions(true, &[]),
            extension: self.extension.clone(),
            cache_dir_name: self.cache_dir_name.clone(),
            auto_commit: self.auto_commit,
            lock_dir: Some(cachesweep_store::locks_dir()),
        };
        let report = run_scan(&opts, &self.analyzer, &GitCli, &StdoutProgress, &self.cancel).await?;
        print!("{}", report.render());
        Ok(DispatchReport {
            new_analyses: report.stats.new_analyses,
            failed: report.stats.failed,
            cancelled: report.cancelled,
        })
    }
}

fn print_pass(report: &PassReport) {
    if report.entries.is_empty() {
        println!("No repositories due for a scan");
        return;
    }
    println!();
    for (name, outcome) in &report.entries {
        let line = match outcome {
            PassOutcome::Scanned {
                new_analyses,
                failed,
            } => format!("scanned: {new_analyses} new, {failed} failed"),
            PassOutcome::Cancelled => "cancelled".to_string(),
            PassOutcome::DispatchFailed { error } => format!("not scanned: {error}"),
            PassOutcome::ClaimLost => "skipped (claimed elsewhere)".to_string(),
        };
        println!("{name:<25} {line}");
    }
}

pub fn run(
    config: &SweepConfig,
    watch: bool,
    tick_secs: u64,
    commit: bool,
) -> anyhow::Result<ExitCode> {
    let store = open_store(config)?;
    let cancel = CancellationToken::new();
    crate::ctrlc_cancel(cancel.clone());

    let dispatcher = RegistryDispatcher {
        analyzer: process_analyzer(config)?,
        extension: config.extension.clone(),
        cache_dir_name: config.cache_dir_name.clone(),
        auto_commit: commit,
        cancel: cancel.clone(),
    };
    let tick = Duration::from_secs(tick_secs.max(1));
    let rt = tokio::runtime::Runtime::new()?;

    loop {
        let report = rt.block_on(run_pass(&store, &dispatcher, OffsetDateTime::now_utc()))?;
        print_pass(&report);

        if !watch {
            let failed = report.dispatch_failures() > 0 || report.was_cancelled();
            return Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            });
        }
        if cancel.is_cancelled() {
            break;
        }
        tracing::debug!("next pass in {}s", tick.as_secs());
        rt.block_on(async {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(tick) => {}
            }
        });
        if cancel.is_cancelled() {
            break;
        }
    }
    println!("Stopped");
    Ok(ExitCode::SUCCESS)
}
