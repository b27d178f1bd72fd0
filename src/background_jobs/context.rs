use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Child of the scheduler's shutdown token.
    pub cancellation_token: CancellationToken,

    /// The tick time the job was started for. Jobs evaluate time-based
    /// conditions against this rather than the wall clock.
    pub now: DateTime<Utc>,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, now: DateTime<Utc>) -> Self {
        Self {
            cancellation_token,
            now,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
