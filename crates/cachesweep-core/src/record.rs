//! Persistent record kinds: registered repositories and backlog queue items.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const STATUS_ACTIVE: &str = "active";
pub const DEFAULT_SCAN_INTERVAL_MINUTES: i64 = 60;
/// Longest accepted scan interval: one year.
pub const MAX_SCAN_INTERVAL_MINUTES: i64 = 525_600;

/// A repository subject to scheduled scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub id: String,
    pub path: String,
    pub name: String,
    pub status: String,
    pub auto_scan_enabled: bool,
    pub scan_interval_minutes: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_scan_check: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_analyzed: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl RepositoryRecord {
    /// A freshly registered repository: active, auto-scan off, default interval.
    pub fn new(id: String, path: String, name: String, now: OffsetDateTime) -> Self {
        Self {
            id,
            path,
            name,
            status: STATUS_ACTIVE.to_string(),
            auto_scan_enabled: false,
            scan_interval_minutes: DEFAULT_SCAN_INTERVAL_MINUTES,
            last_scan_check: None,
            last_analyzed: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }

    pub fn is_local(&self) -> bool {
        is_local_path(&self.path)
    }
}

/// True for paths under a recognized local-filesystem prefix.
pub fn is_local_path(path: &str) -> bool {
    (path.starts_with('/') || path.starts_with("~/")) && !path.contains("://")
}

/// A prioritized follow-up work item. Read-only from this tool's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: i64,
    pub stage: String,
    pub repo_path: Option<String>,
    pub file_path: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl QueueItem {
    pub fn priority_label(&self) -> &'static str {
        priority_label(self.priority)
    }
}

/// Human label for an integer priority (1 = highest).
pub fn priority_label(priority: i64) -> &'static str {
    match priority {
        i64::MIN..=0 => "UNKNOWN",
        1 => "CRITICAL",
        2 => "HIGH",
        3 => "MEDIUM",
        _ => "LOW",
    }
}
