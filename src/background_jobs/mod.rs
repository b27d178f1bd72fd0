//! Background job scheduling and execution.
//!
//! Recurring jobs are persisted as scheduled tasks and driven by a single
//! tick-based loop; see [`JobScheduler`].

mod context;
mod guard;
mod handle;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use guard::{RunningGuard, RunningSet};
pub use handle::{JobInfo, JobRunInfo, SchedulerHandle};
pub use job::{BackgroundJob, JobError};
pub use scheduler::{create_scheduler, JobScheduler, TickReport};
