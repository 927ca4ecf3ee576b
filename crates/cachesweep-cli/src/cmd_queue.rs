use crate::cmd_repo::open_store;
use cachesweep_core::SweepConfig;
use cachesweep_registry::{render_queue, render_summary, summary_file_name};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use time::OffsetDateTime;

pub fn queue(config: &SweepConfig, limit: usize, json: bool) -> anyhow::Result<ExitCode> {
    let store = open_store(config)?;
    let items = store.queue_items(limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        print!("{}", render_queue(&items));
    }
    Ok(ExitCode::SUCCESS)
}

pub fn summary(
    config: &SweepConfig,
    limit: usize,
    output: Option<&Path>,
    save: bool,
) -> anyhow::Result<ExitCode> {
    let store = open_store(config)?;
    let markdown = render_summary(&store.queue_items(limit)?);

    let target: Option<PathBuf> = match (output, save) {
        (Some(path), _) => Some(path.to_path_buf()),
        (None, true) => Some(PathBuf::from(summary_file_name(OffsetDateTime::now_utc()))),
        (None, false) => None,
    };

    match target {
        Some(path) => {
            cachesweep_store::write_atomic(&path, markdown.as_bytes())?;
            println!("Saved to {}", path.display());
        }
        None => println!("{markdown}"),
    }
    Ok(ExitCode::SUCCESS)
}
