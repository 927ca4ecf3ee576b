pub mod config;
pub mod error;
pub mod record;
pub mod types;

pub use config::{ConfigOverrides, SweepConfig};
pub use error::{SweepError, SweepResult};
pub use record::{QueueItem, RepositoryRecord};
pub use types::*;
