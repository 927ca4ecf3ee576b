pub mod aggregate;
pub mod git;
pub mod invoke;
pub mod mask;
pub mod orchestrator;
pub mod progress;
pub mod select;

pub use aggregate::RunAggregator;
pub use git::{GitCli, MockVcs, Vcs};
pub use invoke::{invoke, Analyzer, MockAnalyzer, ProcessAnalyzer};
pub use orchestrator::{run_scan, CommitOutcome, ScanOptions, ScanReport};
pub use progress::{CollectProgress, Progress, ProgressSink, SilentProgress, StdoutProgress};
pub use select::{select, ExclusionProfile, Selection};
