use anyhow::Context;
use cachesweep_core::{RepositoryRecord, SweepConfig};
use cachesweep_registry::{AddOutcome, PriorityManifest, RegistryStore, UpdateOutcome};
use std::path::Path;
use std::process::ExitCode;
use time::OffsetDateTime;

pub fn open_store(config: &SweepConfig) -> anyhow::Result<RegistryStore> {
    let db = config.require_db_path()?;
    tracing::debug!("registry: {}", db.display());
    RegistryStore::open_or_create(db)
        .with_context(|| format!("cannot open registry {}", db.display()))
}

pub fn list(config: &SweepConfig, active_only: bool, json: bool) -> anyhow::Result<ExitCode> {
    let store = open_store(config)?;
    let repos = store.list_repos(active_only)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&repos)?);
    } else {
        print!("{}", render_table(&repos));
    }
    Ok(ExitCode::SUCCESS)
}

fn render_table(repos: &[RepositoryRecord]) -> String {
    if repos.is_empty() {
        return "No repositories found\n".to_string();
    }
    let mut out = format!("{:<25} {:<6} {:<10} {:<10}\n", "Name", "Scan", "Interval", "Status");
    out.push_str(&"-".repeat(60));
    out.push('\n');
    for r in repos {
        let scan = if r.auto_scan_enabled { "✓" } else { "✗" };
        let interval = if r.auto_scan_enabled {
            format!("{}m", r.scan_interval_minutes)
        } else {
            "-".to_string()
        };
        out.push_str(&format!(
            "{:<25} {:<6} {:<10} {:<10}\n",
            r.name, scan, interval, r.status
        ));
    }
    out
}

/// Absolute form of a user-supplied path. `~/` paths are kept as written.
fn registered_path(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim_end_matches('/');
    let trimmed = if trimmed.is_empty() { raw } else { trimmed };
    if trimmed.starts_with("~/") || Path::new(trimmed).is_absolute() {
        return Ok(trimmed.to_string());
    }
    let abs = std::env::current_dir()?.join(trimmed);
    Ok(abs.to_string_lossy().into_owned())
}

fn default_name(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty() && n != "~")
}

pub fn add(
    config: &SweepConfig,
    raw_path: &str,
    name: Option<&str>,
    allow_missing: bool,
) -> anyhow::Result<ExitCode> {
    let path = registered_path(raw_path)?;
    if !allow_missing && !cachesweep_store::expand_home(&path).is_dir() {
        anyhow::bail!("path does not exist: {path} (use --allow-missing to add anyway)");
    }
    let name = match name {
        Some(n) => n.to_string(),
        None => default_name(&path)
            .with_context(|| format!("cannot derive a name from {path}; pass --name"))?,
    };

    let store = open_store(config)?;
    match store.add_repo(&path, &name, OffsetDateTime::now_utc())? {
        AddOutcome::Added(record) => {
            println!("Added repository: {} ({})", record.name, record.path);
            Ok(ExitCode::SUCCESS)
        }
        AddOutcome::AlreadyExists => {
            eprintln!("Repository already exists: {path}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report_update(outcome: UpdateOutcome, name: &str, done: &str) -> ExitCode {
    match outcome {
        UpdateOutcome::Updated => {
            println!("{done}");
            ExitCode::SUCCESS
        }
        UpdateOutcome::NotFound => {
            eprintln!("Repository not found: {name}");
            ExitCode::FAILURE
        }
    }
}

pub fn enable(config: &SweepConfig, name: &str, interval: i64) -> anyhow::Result<ExitCode> {
    let store = open_store(config)?;
    let outcome = store.enable_scan(name, interval, OffsetDateTime::now_utc())?;
    Ok(report_update(
        outcome,
        name,
        &format!("Enabled auto-scan for {name} (interval: {interval}m)"),
    ))
}

pub fn disable(config: &SweepConfig, name: &str) -> anyhow::Result<ExitCode> {
    let store = open_store(config)?;
    let outcome = store.disable_scan(name, OffsetDateTime::now_utc())?;
    Ok(report_update(
        outcome,
        name,
        &format!("Disabled auto-scan for {name}"),
    ))
}

pub fn force(config: &SweepConfig, name: &str) -> anyhow::Result<ExitCode> {
    let store = open_store(config)?;
    let outcome = store.force_scan(name, OffsetDateTime::now_utc())?;
    Ok(report_update(
        outcome,
        name,
        &format!("{name} will be scanned on the next pass"),
    ))
}

/// Immediate subdirectories of `base`, sorted, hidden ones skipped.
fn subdirectories(base: &Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(base)
        .with_context(|| format!("cannot read directory {}", base.display()))?
    {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub fn bulk(config: &SweepConfig, base: &str) -> anyhow::Result<ExitCode> {
    let base_path = cachesweep_store::expand_home(base);
    if !base_path.is_dir() {
        anyhow::bail!("directory not found: {}", base_path.display());
    }
    let base_path = base_path.canonicalize()?;
    let store = open_store(config)?;
    let now = OffsetDateTime::now_utc();

    let (mut added, mut existing) = (0usize, 0usize);
    for dir in subdirectories(&base_path)? {
        let path = dir.to_string_lossy().into_owned();
        let Some(name) = default_name(&path) else {
            continue;
        };
        match store.add_repo(&path, &name, now)? {
            AddOutcome::Added(_) => {
                println!("Added repository: {name}");
                added += 1;
            }
            AddOutcome::AlreadyExists => existing += 1,
        }
    }
    println!("Added {added} new repositories ({existing} already registered)");
    Ok(ExitCode::SUCCESS)
}

pub fn priority(config: &SweepConfig, manifest: &Path) -> anyhow::Result<ExitCode> {
    let manifest = PriorityManifest::load(manifest)?;
    let store = open_store(config)?;
    let applied = manifest.apply(&store, OffsetDateTime::now_utc())?;

    let mut missing = 0;
    for entry in &applied {
        let action = if entry.added { "added" } else { "present" };
        if entry.enabled {
            println!("{:<25} {action}, auto-scan every {}m", entry.name, entry.interval);
        } else {
            println!("{:<25} {action}, NOT enabled (no repository with this name)", entry.name);
            missing += 1;
        }
    }
    Ok(if missing == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub fn stats(config: &SweepConfig, json: bool) -> anyhow::Result<ExitCode> {
    let store = open_store(config)?;
    let stats = store.stats()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Repository Statistics");
        println!("  Total Repositories:    {}", stats.total);
        println!("  Active:                {}", stats.active);
        println!("  Auto-scanning:         {}", stats.scanning);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn cleanup(config: &SweepConfig) -> anyhow::Result<ExitCode> {
    let store = open_store(config)?;
    let removed = store.cleanup_invalid()?;
    println!("Removed {removed} invalid repositories");
    Ok(ExitCode::SUCCESS)
}
