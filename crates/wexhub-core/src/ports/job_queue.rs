//! Processing queue ports (driven/secondary ports)

use std::time::Duration;

use thiserror::Error;

use crate::domain::job::JobEnvelope;
use crate::domain::newtypes::JobId;

/// Why an enqueue was refused
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The bounded queue is at capacity; callers surface 503
    #[error("Processing queue is full")]
    Full,
    /// The consumer side has shut down
    #[error("Processing queue is closed")]
    Closed,
}

/// Port trait for the job queue
///
/// `enqueue` never blocks: a full queue is an immediate [`QueueError::Full`].
/// `dequeue` blocks up to `deadline` and returns `None` on timeout or when
/// the queue closed. FIFO per producer; no global ordering across
/// producers.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    /// Offers an envelope to the queue without blocking
    async fn enqueue(&self, envelope: JobEnvelope) -> Result<(), QueueError>;

    /// Takes the next envelope, waiting at most `deadline`
    async fn dequeue(&self, deadline: Duration) -> Option<JobEnvelope>;
}

/// Port trait for the at-most-once dispatch tracker
///
/// A shared set of processed job ids; writes are atomic. A job id present
/// in the set is never dispatched again.
pub trait ProcessedJobTracker: Send + Sync {
    /// Returns true when the job was already dispatched
    fn already_processed(&self, job_id: JobId) -> bool;

    /// Records a dispatched job; idempotent
    fn mark_processed(&self, job_id: JobId);
}
