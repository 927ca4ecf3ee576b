mod cmd_queue;
mod cmd_repo;
mod cmd_scan;
mod cmd_schedule;
mod logging;

use cachesweep_core::record::MAX_SCAN_INTERVAL_MINUTES;
use cachesweep_core::{ConfigOverrides, SweepConfig};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "cachesweep",
    version,
    about = "Warm an external analyzer's cache across repositories"
)]
struct Cli {
    /// Registry database (default: the file named by a sqlite DATABASE_URL)
    #[arg(long, global = true, env = "CACHESWEEP_DB")]
    db: Option<PathBuf>,
    /// Read environment from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
    /// Analyzer binary (name in PATH or a path)
    #[arg(long, global = true)]
    analyzer: Option<PathBuf>,
    /// Debug logging for cachesweep crates
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze every source file in a repository through the analyzer cache
    Scan {
        /// Repository root
        repo: PathBuf,
        /// Only the first N files, in path order
        #[arg(long)]
        limit: Option<usize>,
        /// Commit the cache directory when new analyses were cached
        #[arg(long)]
        commit: bool,
        /// Accepted for compatibility; cached files are already cheap
        #[arg(long)]
        skip_cached: bool,
        /// Exclude tests/, benches/, and examples/
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        exclude_tests: bool,
        /// Extra path substring to exclude (repeatable)
        #[arg(long = "exclude")]
        excludes: Vec<String>,
        /// Per-file timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
        /// Do not take the per-repository scan lock
        #[arg(long)]
        no_lock: bool,
    },
    /// List registered repositories
    List {
        /// Only repositories with status "active"
        #[arg(long)]
        active: bool,
        #[arg(long)]
        json: bool,
    },
    /// Register a repository
    Add {
        #[arg(long)]
        path: String,
        /// Defaults to the directory name
        #[arg(long)]
        name: Option<String>,
        /// Register even if the path does not exist
        #[arg(long)]
        allow_missing: bool,
    },
    /// Enable scheduled scans for a repository
    Enable {
        #[arg(long)]
        name: String,
        /// Minutes between scans
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(i64).range(1..=MAX_SCAN_INTERVAL_MINUTES))]
        interval: i64,
    },
    /// Disable scheduled scans for a repository
    Disable {
        #[arg(long)]
        name: String,
    },
    /// Make a repository due on the next scheduling pass
    Force {
        #[arg(long)]
        name: String,
    },
    /// Register every immediate subdirectory of a base directory
    Bulk {
        #[arg(long, default_value = "~/github")]
        base: String,
    },
    /// Register and enable the repositories in a YAML manifest
    Priority {
        #[arg(long)]
        manifest: PathBuf,
    },
    /// Repository counts
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Delete records whose path is a URL
    Cleanup,
    /// Show the task queue
    Queue {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Markdown summary of the task queue
    Summary {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Write to this file
        #[arg(long, conflicts_with = "save")]
        output: Option<PathBuf>,
        /// Write to task_summary_<timestamp>.md in the current directory
        #[arg(long)]
        save: bool,
    },
    /// Scheduled scans
    Schedule {
        #[command(subcommand)]
        cmd: ScheduleCmd,
    },
}

#[derive(Subcommand)]
enum ScheduleCmd {
    /// List repositories due for a scan now
    Due {
        #[arg(long)]
        json: bool,
    },
    /// Scan every due repository
    Run {
        /// Keep running, one pass per tick
        #[arg(long)]
        watch: bool,
        /// Seconds between passes with --watch
        #[arg(long, default_value_t = 60)]
        tick_secs: u64,
        /// Commit cache directories after each scan
        #[arg(long)]
        commit: bool,
        /// Per-file timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!("command failed: {e:?}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let timeout_secs = match &cli.cmd {
        Command::Scan { timeout, .. } => *timeout,
        Command::Schedule {
            cmd: ScheduleCmd::Run { timeout, .. },
        } => *timeout,
        _ => None,
    };
    let config = SweepConfig::load(&ConfigOverrides {
        analyzer: cli.analyzer,
        env_file: cli.env_file,
        db: cli.db,
        timeout_secs,
    })?;

    match cli.cmd {
        Command::Scan {
            repo,
            limit,
            commit,
            skip_cached,
            exclude_tests,
            excludes,
            timeout: _,
            json,
            no_lock,
        } => cmd_scan::execute(
            &config,
            cmd_scan::ScanArgs {
                repo,
                limit,
                commit,
                skip_cached,
                exclude_tests,
                excludes,
                json,
                lock: !no_lock,
            },
        ),
        Command::List { active, json } => cmd_repo::list(&config, active, json),
        Command::Add {
            path,
            name,
            allow_missing,
        } => cmd_repo::add(&config, &path, name.as_deref(), allow_missing),
        Command::Enable { name, interval } => cmd_repo::enable(&config, &name, interval),
        Command::Disable { name } => cmd_repo::disable(&config, &name),
        Command::Force { name } => cmd_repo::force(&config, &name),
        Command::Bulk { base } => cmd_repo::bulk(&config, &base),
        Command::Priority { manifest } => cmd_repo::priority(&config, &manifest),
        Command::Stats { json } => cmd_repo::stats(&config, json),
        Command::Cleanup => cmd_repo::cleanup(&config),
        Command::Queue { limit, json } => cmd_queue::queue(&config, limit, json),
        Command::Summary {
            limit,
            output,
            save,
        } => cmd_queue::summary(&config, limit, output.as_deref(), save),
        Command::Schedule { cmd } => match cmd {
            ScheduleCmd::Due { json } => cmd_schedule::due(&config, json),
            ScheduleCmd::Run {
                watch,
                tick_secs,
                commit,
                timeout: _,
            } => cmd_schedule::run(&config, watch, tick_secs, commit),
        },
    }
}

/// Cancel `cancel` on Ctrl+C. Scans stop at the next file boundary.
fn ctrlc_cancel(cancel: tokio_util::sync::CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn scan_flags_parse() {
        let cli = Cli::try_parse_from([
            "cachesweep",
            "scan",
            "/repo",
            "--limit",
            "5",
            "--commit",
            "--exclude-tests",
            "false",
            "--exclude",
            "/vendor/",
        ])
        .unwrap();
        match cli.cmd {
            Command::Scan {
                limit,
                commit,
                exclude_tests,
                excludes,
                ..
            } => {
                assert_eq!(limit, Some(5));
                assert!(commit);
                assert!(!exclude_tests);
                assert_eq!(excludes, vec!["/vendor/"]);
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn exclude_tests_defaults_on() {
        let cli = Cli::try_parse_from(["cachesweep", "scan", "."]).unwrap();
        assert!(matches!(
            cli.cmd,
            Command::Scan {
                exclude_tests: true,
                ..
            }
        ));
    }

    #[test]
    fn enable_rejects_zero_interval() {
        assert!(
            Cli::try_parse_from(["cachesweep", "enable", "--name", "x", "--interval", "0"])
                .is_err()
        );
    }

    #[test]
    fn enable_rejects_interval_beyond_a_year() {
        assert!(Cli::try_parse_from([
            "cachesweep",
            "enable",
            "--name",
            "x",
            "--interval",
            "153722867280912931",
        ])
        .is_err());
        assert!(
            Cli::try_parse_from(["cachesweep", "enable", "--name", "x", "--interval", "525600"])
                .is_ok()
        );
    }

    #[test]
    fn summary_output_conflicts_with_save() {
        assert!(Cli::try_parse_from([
            "cachesweep",
            "summary",
            "--output",
            "a.md",
            "--save"
        ])
        .is_err());
    }
}
