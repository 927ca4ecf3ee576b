use cachesweep_core::SweepConfig;
use cachesweep_scan::{
    run_scan, ExclusionProfile, GitCli, ProcessAnalyzer, ProgressSink, ScanOptions,
    SilentProgress, StdoutProgress,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

pub struct ScanArgs {
    pub repo: PathBuf,
    pub limit: Option<usize>,
    pub commit: bool,
    pub skip_cached: bool,
    pub exclude_tests: bool,
    pub excludes: Vec<String>,
    pub json: bool,
    pub lock: bool,
}

/// Resolve the analyzer binary and wrap it with the configured environment.
pub fn process_analyzer(config: &SweepConfig) -> anyhow::Result<ProcessAnalyzer> {
    let bin = config.resolve_analyzer()?;
    tracing::debug!("analyzer: {}", bin.display());
    Ok(ProcessAnalyzer::new(
        bin,
        config.analyzer_env.clone(),
        config.timeout,
    ))
}

pub fn exclusions(exclude_tests: bool, extra: &[String]) -> ExclusionProfile {
    let profile = ExclusionProfile::default();
    let profile = if exclude_tests {
        profile.with_tests()
    } else {
        profile
    };
    profile.with_patterns(extra.iter().cloned())
}

pub fn execute(config: &SweepConfig, args: ScanArgs) -> anyhow::Result<ExitCode> {
    let analyzer = process_analyzer(config)?;
    if args.skip_cached {
        tracing::info!("--skip-cached: the analyzer answers cached files from its own cache");
    }

    let repo_root = cachesweep_store::expand_home(&args.repo.to_string_lossy());
    let opts = ScanOptions {
        repo_root,
        limit: args.limit,
        exclusions: exclusions(args.exclude_tests, &args.excludes),
        extension: config.extension.clone(),
        cache_dir_name: config.cache_dir_name.clone(),
        auto_commit: args.commit,
        lock_dir: args.lock.then(cachesweep_store::locks_dir),
    };

    let cancel = CancellationToken::new();
    crate::ctrlc_cancel(cancel.clone());

    let progress: Box<dyn ProgressSink> = if args.json {
        Box::new(SilentProgress)
    } else {
        println!("Scanning {}", opts.repo_root.display());
        Box::new(StdoutProgress)
    };

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(run_scan(
        &opts,
        &analyzer,
        &GitCli,
        progress.as_ref(),
        &cancel,
    ))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        print!("{}", report.render());
    }
    Ok(ExitCode::from(report.exit_code()))
}
