//! Bounded in-memory job queue
//!
//! A tokio mpsc channel behind the queue port: `enqueue` never blocks (a
//! full channel is an immediate rejection the API surfaces as 503), and
//! `dequeue` waits up to a deadline. FIFO per producer; no ordering
//! guarantee across producers.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use wexhub_core::domain::job::JobEnvelope;
use wexhub_core::ports::{JobQueue, QueueError};

/// In-memory bounded queue
pub struct InMemoryJobQueue {
    tx: mpsc::Sender<JobEnvelope>,
    rx: Mutex<mpsc::Receiver<JobEnvelope>>,
}

impl InMemoryJobQueue {
    /// Creates a queue holding at most `capacity` envelopes
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

#[async_trait::async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, envelope: JobEnvelope) -> Result<(), QueueError> {
        match self.tx.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                debug!(job_id = %envelope.job_id(), "Queue full, rejecting envelope");
                Err(QueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    async fn dequeue(&self, deadline: Duration) -> Option<JobEnvelope> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(deadline, rx.recv()).await.ok().flatten()
    }
}
