pub mod manifest;
pub mod schedule;
pub mod sqlite_store;
pub mod summary;

pub use manifest::{AppliedEntry, PriorityEntry, PriorityManifest};
pub use schedule::{
    due_for_scan, is_due, run_pass, DispatchReport, PassOutcome, PassReport, ScanDispatcher,
};
pub use sqlite_store::{AddOutcome, RegistryStats, RegistryStore, UpdateOutcome};
pub use summary::{render_queue, render_summary, summary_file_name, EMPTY_QUEUE};
