//! Fixed-window rate limiting
//!
//! Three independent policies keyed by caller identity and endpoint:
//! upload reserve, upload content, upload commit. QueueLimit is zero:
//! an over-limit request is rejected immediately with the seconds left
//! in the current window as Retry-After.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use wexhub_core::config::{RateLimitConfig, RateLimitPolicy};
use wexhub_core::domain::errors::DomainError;

/// The three limited endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitedEndpoint {
    UploadReserve,
    UploadContent,
    UploadCommit,
}

impl LimitedEndpoint {
    fn name(&self) -> &'static str {
        match self {
            LimitedEndpoint::UploadReserve => "upload_reserve",
            LimitedEndpoint::UploadContent => "upload_content",
            LimitedEndpoint::UploadCommit => "upload_commit",
        }
    }
}

/// One caller's window state for one endpoint
#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Process-wide fixed-window limiter
pub struct FixedWindowLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<(LimitedEndpoint, String), Window>>,
}

impl FixedWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn policy(&self, endpoint: LimitedEndpoint) -> RateLimitPolicy {
        match endpoint {
            LimitedEndpoint::UploadReserve => self.config.upload_reserve,
            LimitedEndpoint::UploadContent => self.config.upload_content,
            LimitedEndpoint::UploadCommit => self.config.upload_commit,
        }
    }

    /// Admits or rejects a request
    ///
    /// Rejection carries the seconds until the caller's window rolls
    /// over, surfaced as `Retry-After` and in the JSON body.
    pub fn check(&self, endpoint: LimitedEndpoint, caller: &str) -> Result<(), DomainError> {
        let policy = self.policy(endpoint);
        let window_len = Duration::from_secs(policy.window_secs);
        let now = Instant::now();

        let mut windows = self.windows.lock().unwrap();
        // Drop stale windows opportunistically so the map stays bounded
        windows.retain(|_, w| now.duration_since(w.started) < window_len * 2);

        let window = windows
            .entry((endpoint, caller.to_string()))
            .or_insert_with(|| Window {
                started: now,
                count: 0,
            });
        if now.duration_since(window.started) >= window_len {
            window.started = now;
            window.count = 0;
        }

        if window.count >= policy.permit_limit {
            let elapsed = now.duration_since(window.started);
            let retry_after = window_len.saturating_sub(elapsed).as_secs().max(1);
            debug!(
                endpoint = endpoint.name(),
                caller, retry_after, "Rate limit exceeded"
            );
            return Err(DomainError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        window.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(permit_limit: u32, window_secs: u64) -> FixedWindowLimiter {
        let policy = RateLimitPolicy {
            permit_limit,
            window_secs,
        };
        FixedWindowLimiter::new(RateLimitConfig {
            upload_reserve: policy,
            upload_content: policy,
            upload_commit: policy,
        })
    }

    #[test]
    fn test_admits_up_to_limit_then_rejects() {
        let limiter = limiter(3, 60);
        for _ in 0..3 {
            limiter
                .check(LimitedEndpoint::UploadReserve, "alice")
                .unwrap();
        }
        let err = limiter
            .check(LimitedEndpoint::UploadReserve, "alice")
            .unwrap_err();
        match err {
            DomainError::RateLimited { retry_after_secs } => {
                assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_callers_are_independent() {
        let limiter = limiter(1, 60);
        limiter.check(LimitedEndpoint::UploadCommit, "alice").unwrap();
        limiter.check(LimitedEndpoint::UploadCommit, "bob").unwrap();
        assert!(limiter.check(LimitedEndpoint::UploadCommit, "alice").is_err());
    }

    #[test]
    fn test_endpoints_are_independent() {
        let limiter = limiter(1, 60);
        limiter.check(LimitedEndpoint::UploadReserve, "alice").unwrap();
        limiter.check(LimitedEndpoint::UploadContent, "alice").unwrap();
        limiter.check(LimitedEndpoint::UploadCommit, "alice").unwrap();
        assert!(limiter.check(LimitedEndpoint::UploadReserve, "alice").is_err());
    }

    #[test]
    fn test_window_rolls_over() {
        let limiter = limiter(1, 1);
        limiter.check(LimitedEndpoint::UploadReserve, "alice").unwrap();
        assert!(limiter.check(LimitedEndpoint::UploadReserve, "alice").is_err());
        std::thread::sleep(Duration::from_millis(1100));
        limiter.check(LimitedEndpoint::UploadReserve, "alice").unwrap();
    }
}
