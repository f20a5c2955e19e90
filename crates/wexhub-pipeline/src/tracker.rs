//! At-most-once dispatch tracker
//!
//! A process-wide set of dispatched job ids. Membership is checked
//! before dispatch and recorded at dispatch; a job id in the set is
//! never handed to a handler again, whatever its outcome was.

use dashmap::DashSet;

use wexhub_core::domain::newtypes::JobId;
use wexhub_core::ports::ProcessedJobTracker;

/// DashSet-backed tracker; writes are atomic
#[derive(Default)]
pub struct ProcessedJobs {
    seen: DashSet<JobId>,
}

impl ProcessedJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of job ids recorded so far
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl ProcessedJobTracker for ProcessedJobs {
    fn already_processed(&self, job_id: JobId) -> bool {
        self.seen.contains(&job_id)
    }

    fn mark_processed(&self, job_id: JobId) {
        self.seen.insert(job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_check() {
        let tracker = ProcessedJobs::new();
        let id = JobId::new();
        assert!(!tracker.already_processed(id));
        tracker.mark_processed(id);
        assert!(tracker.already_processed(id));
        // Idempotent
        tracker.mark_processed(id);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_concurrent_marks_are_atomic() {
        let tracker = std::sync::Arc::new(ProcessedJobs::new());
        let id = JobId::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || tracker.mark_processed(id))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.len(), 1);
    }
}
