//! Scan eligibility and scheduling passes.

use crate::sqlite_store::RegistryStore;
use cachesweep_core::{RepositoryRecord, SweepResult};
use serde::Serialize;
use time::OffsetDateTime;

/// True iff auto-scan is on and the interval has fully elapsed (inclusive).
pub fn is_due(record: &RepositoryRecord, now: OffsetDateTime) -> bool {
    if !record.auto_scan_enabled {
        return false;
    }
    match record.last_scan_check {
        None => true,
        Some(last) => {
            (now - last).whole_seconds() >= record.scan_interval_minutes.saturating_mul(60)
        }
    }
}

/// Records due for a scan at `now`, in input order. Pure.
pub fn due_for_scan(records: &[RepositoryRecord], now: OffsetDateTime) -> Vec<RepositoryRecord> {
    records
        .iter()
        .filter(|r| is_due(r, now))
        .cloned()
        .collect()
}

/// What a dispatched scan reported back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub new_analyses: usize,
    pub failed: usize,
    /// The scan stopped early; the claim is released so it runs again.
    pub cancelled: bool,
}

/// Runs a scan for one registered repository. An `Err` means the scan did
/// not reach its report.
#[async_trait::async_trait]
pub trait ScanDispatcher: Send + Sync {
    async fn dispatch(&self, record: &RepositoryRecord) -> anyhow::Result<DispatchReport>;
}

/// Per-repository result of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PassOutcome {
    Scanned { new_analyses: usize, failed: usize },
    Cancelled,
    DispatchFailed { error: String },
    /// Another process claimed the record first.
    ClaimLost,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub entries: Vec<(String, PassOutcome)>,
}

impl PassReport {
    pub fn dispatch_failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, o)| matches!(o, PassOutcome::DispatchFailed { .. }))
            .count()
    }

    pub fn was_cancelled(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, o)| matches!(o, PassOutcome::Cancelled))
    }
}

/// One scheduling pass over the active local repositories.
///
/// Each due record is claimed (compare-and-set on `last_scan_check`) before
/// dispatch; a failed or cancelled dispatch restores the previous value so the
/// record stays due.
pub async fn run_pass(
    store: &RegistryStore,
    dispatcher: &dyn ScanDispatcher,
    now: OffsetDateTime,
) -> SweepResult<PassReport> {
    let records = store.list_repos(true)?;
    let due = due_for_scan(&records, now);
    tracing::info!("{} of {} repositories due", due.len(), records.len());

    let mut report = PassReport::default();
    for record in due {
        if !store.claim_scan(&record.id, record.last_scan_check, now)? {
            tracing::warn!(name = %record.name, "claim lost, skipping");
            report.entries.push((record.name, PassOutcome::ClaimLost));
            continue;
        }

        let outcome = match dispatcher.dispatch(&record).await {
            Ok(d) if d.cancelled => {
                store.revert_scan_claim(&record.id, now, record.last_scan_check)?;
                PassOutcome::Cancelled
            }
            Ok(d) => {
                if d.new_analyses > 0 {
                    store.mark_analyzed(&record.id, now)?;
                }
                PassOutcome::Scanned {
                    new_analyses: d.new_analyses,
                    failed: d.failed,
                }
            }
            Err(e) => {
                tracing::warn!(name = %record.name, "dispatch failed: {e:#}");
                store.revert_scan_claim(&record.id, now, record.last_scan_check)?;
                PassOutcome::DispatchFailed {
                    error: format!("{e:#}"),
                }
            }
        };

        let stop = outcome == PassOutcome::Cancelled;
        report.entries.push((record.name, outcome));
        if stop {
            break;
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_store::AddOutcome;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use time::Duration;

    fn t0() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn record(enabled: bool, last: Option<OffsetDateTime>) -> RepositoryRecord {
        let mut r = RepositoryRecord::new("id".into(), "/home/u/r".into(), "r".into(), t0());
        r.auto_scan_enabled = enabled;
        r.scan_interval_minutes = 60;
        r.last_scan_check = last;
        r
    }

    #[test]
    fn interval_boundary_is_inclusive() {
        let now = t0() + Duration::days(1);
        assert!(!is_due(&record(true, Some(now - Duration::seconds(3599))), now));
        assert!(is_due(&record(true, Some(now - Duration::seconds(3600))), now));
        assert!(is_due(&record(true, Some(now - Duration::seconds(3601))), now));
    }

    #[test]
    fn huge_interval_is_not_due_and_does_not_overflow() {
        let mut r = record(true, Some(t0()));
        r.scan_interval_minutes = i64::MAX / 10;
        assert!(!is_due(&r, t0() + Duration::seconds(1)));
        assert!(!is_due(&r, t0() + Duration::days(36_500)));
    }

    #[test]
    fn never_checked_is_due() {
        assert!(is_due(&record(true, None), t0()));
    }

    #[test]
    fn disabled_is_never_due() {
        let now = t0() + Duration::days(400);
        for last in [None, Some(t0()), Some(now - Duration::seconds(1))] {
            assert!(!is_due(&record(false, last), now));
        }
        let recs = vec![record(false, None), record(true, None)];
        let due = due_for_scan(&recs, now);
        assert_eq!(due.len(), 1);
        assert!(due[0].auto_scan_enabled);
    }

    /// Fails for the configured names, succeeds with one new analysis otherwise.
    struct ScriptedDispatcher {
        fail: Vec<String>,
        cancel: Vec<String>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedDispatcher {
        fn new(fail: &[&str], cancel: &[&str]) -> Self {
            Self {
                fail: fail.iter().map(|s| s.to_string()).collect(),
                cancel: cancel.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(HashMap::new()),
            }
        }

        fn calls(&self, name: &str) -> usize {
            self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
        }
    }

    #[async_trait::async_trait]
    impl ScanDispatcher for ScriptedDispatcher {
        async fn dispatch(&self, record: &RepositoryRecord) -> anyhow::Result<DispatchReport> {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(record.name.clone())
                .or_default() += 1;
            if self.fail.contains(&record.name) {
                anyhow::bail!("repository path does not exist");
            }
            Ok(DispatchReport {
                new_analyses: 1,
                failed: 0,
                cancelled: self.cancel.contains(&record.name),
            })
        }
    }

    fn store_with(names: &[&str]) -> (tempfile::TempDir, RegistryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::open_or_create(&dir.path().join("registry.db")).unwrap();
        for name in names {
            let added = store
                .add_repo(&format!("/home/u/{name}"), name, t0())
                .unwrap();
            assert!(matches!(added, AddOutcome::Added(_)));
            store.enable_scan(name, 60, t0()).unwrap();
        }
        (dir, store)
    }

    #[tokio::test]
    async fn successful_dispatch_advances_check_and_analyzed() {
        let (_dir, store) = store_with(&["a"]);
        let dispatcher = ScriptedDispatcher::new(&[], &[]);
        let now = t0() + Duration::hours(2);

        let report = run_pass(&store, &dispatcher, now).await.unwrap();
        assert_eq!(
            report.entries,
            vec![(
                "a".to_string(),
                PassOutcome::Scanned {
                    new_analyses: 1,
                    failed: 0
                }
            )]
        );
        let r = store.get_repo("a").unwrap().unwrap();
        assert_eq!(r.last_scan_check, Some(now));
        assert_eq!(r.last_analyzed, Some(now));

        // Not due again until the interval elapses.
        let report = run_pass(&store, &dispatcher, now + Duration::minutes(59))
            .await
            .unwrap();
        assert!(report.entries.is_empty());
        assert_eq!(dispatcher.calls("a"), 1);
    }

    #[tokio::test]
    async fn failed_dispatch_keeps_record_due() {
        let (_dir, store) = store_with(&["bad", "good"]);
        let dispatcher = ScriptedDispatcher::new(&["bad"], &[]);
        let now = t0() + Duration::hours(2);

        let report = run_pass(&store, &dispatcher, now).await.unwrap();
        assert_eq!(report.dispatch_failures(), 1);
        assert_eq!(store.get_repo("bad").unwrap().unwrap().last_scan_check, None);
        assert_eq!(
            store.get_repo("good").unwrap().unwrap().last_scan_check,
            Some(now)
        );

        // Retried on the next pass, the successful one is not.
        run_pass(&store, &dispatcher, now + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(dispatcher.calls("bad"), 2);
        assert_eq!(dispatcher.calls("good"), 1);
    }

    #[tokio::test]
    async fn cancelled_dispatch_stops_pass_and_releases_claim() {
        let (_dir, store) = store_with(&["a", "b"]);
        let dispatcher = ScriptedDispatcher::new(&[], &["a"]);
        let now = t0() + Duration::hours(2);

        let report = run_pass(&store, &dispatcher, now).await.unwrap();
        assert!(report.was_cancelled());
        assert_eq!(report.entries.len(), 1);
        assert_eq!(dispatcher.calls("b"), 0);
        assert_eq!(store.get_repo("a").unwrap().unwrap().last_scan_check, None);
    }

    #[tokio::test]
    async fn disabled_records_are_not_dispatched() {
        let (_dir, store) = store_with(&["a"]);
        store.disable_scan("a", t0()).unwrap();
        let dispatcher = ScriptedDispatcher::new(&[], &[]);
        let report = run_pass(&store, &dispatcher, t0() + Duration::days(1))
            .await
            .unwrap();
        assert!(report.entries.is_empty());
        assert_eq!(dispatcher.calls("a"), 0);
    }
}
