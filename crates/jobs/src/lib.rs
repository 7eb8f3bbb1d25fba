//! Job manager: reconciles the configured set of [`LogStrategy`]s against
//! running [`LogJob`]s (one tail reader + one consumer pool per strategy),
//! starting new ones and stopping removed ones as config changes.

mod job;
mod manager;

pub use job::LogJob;
pub use manager::JobManager;
