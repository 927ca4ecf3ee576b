//! Priority manifest: repositories to register and auto-scan, keyed by name.
//!
//! ```yaml
//! fks:
//!   path: /home/u/github/fks
//!   interval: 30
//! actions:
//!   path: ~/github/actions
//! ```

use crate::sqlite_store::{AddOutcome, RegistryStore, UpdateOutcome};
use cachesweep_core::record::{DEFAULT_SCAN_INTERVAL_MINUTES, MAX_SCAN_INTERVAL_MINUTES};
use cachesweep_core::{SweepError, SweepResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PriorityEntry {
    pub path: String,
    #[serde(default = "default_interval")]
    pub interval: i64,
}

fn default_interval() -> i64 {
    DEFAULT_SCAN_INTERVAL_MINUTES
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PriorityManifest {
    pub entries: BTreeMap<String, PriorityEntry>,
}

/// What `apply` did for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedEntry {
    pub name: String,
    pub added: bool,
    pub enabled: bool,
    pub interval: i64,
}

impl PriorityManifest {
    pub fn from_yaml(text: &str) -> SweepResult<Self> {
        let manifest: Self = serde_yaml::from_str(text)
            .map_err(|e| SweepError::precondition(format!("invalid priority manifest: {e}")))?;
        for (name, entry) in &manifest.entries {
            if !(1..=MAX_SCAN_INTERVAL_MINUTES).contains(&entry.interval) {
                return Err(SweepError::precondition(format!(
                    "priority manifest entry {name:?}: interval must be 1..={MAX_SCAN_INTERVAL_MINUTES} minutes"
                )));
            }
        }
        Ok(manifest)
    }

    pub fn load(path: &Path) -> SweepResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SweepError::precondition(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    /// Add each entry if missing, then enable auto-scan at its interval.
    pub fn apply(&self, store: &RegistryStore, now: OffsetDateTime) -> SweepResult<Vec<AppliedEntry>> {
        let mut applied = Vec::with_capacity(self.entries.len());
        for (name, entry) in &self.entries {
            let added = matches!(store.add_repo(&entry.path, name, now)?, AddOutcome::Added(_));
            let enabled = store.enable_scan(name, entry.interval, now)? == UpdateOutcome::Updated;
            if !enabled {
                // Path was registered earlier under a different name.
                tracing::warn!(path = %entry.path, "no repository named {name}; not enabled");
            }
            applied.push(AppliedEntry {
                name: name.clone(),
                added,
                enabled,
                interval: entry.interval,
            });
        }
        Ok(applied)
    }
}
