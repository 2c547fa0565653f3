pub mod config;
pub mod directory;
pub mod error;
pub mod scheduler;
pub mod store;
pub mod transport;
pub mod types;

pub use config::SchedulerConfig;
pub use error::{PodSyncError, Result};
pub use scheduler::Scheduler;

use once_cell::sync::OnceCell;
use std::sync::Arc;

static GLOBAL_SCHEDULER: OnceCell<Arc<Scheduler>> = OnceCell::new();

/// Set the process-wide scheduler (called once during server startup)
pub fn set_global_scheduler(scheduler: Arc<Scheduler>) {
    let _ = GLOBAL_SCHEDULER.set(scheduler);
}

/// Get the process-wide scheduler if replication is enabled
pub fn get_global_scheduler() -> Option<Arc<Scheduler>> {
    GLOBAL_SCHEDULER.get().map(Arc::clone)
}
