//! Bounded poll-until-condition primitive.
//!
//! The probe runs immediately, then once per interval, until it reports the
//! condition met, returns an error, the deadline passes, or the caller's
//! cancellation token fires.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{ReplError, Result};

/// Default delay between probe attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default deadline. Callers are expected to cancel through their own token
/// well before this fires.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Stand-in deadline for timeouts too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Configuration for polling behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between attempts (default: 5 seconds).
    pub interval: Duration,
    /// Overall deadline measured from the first attempt (default: 10 minutes).
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Executor for condition polling.
#[derive(Debug, Clone, Default)]
pub struct Poller {
    config: PollConfig,
}

impl Poller {
    /// Create a new Poller with the given configuration.
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    /// Poll `probe` until it returns `Ok(true)`.
    ///
    /// `Ok(false)` schedules another attempt after the interval. `Err` aborts
    /// immediately and is returned unchanged. A probe still in flight when the
    /// deadline passes or `ctx` is cancelled is dropped.
    ///
    /// `what` names the awaited condition in timeout errors and traces.
    pub async fn poll_until<F, Fut>(
        &self,
        ctx: &CancellationToken,
        what: &str,
        mut probe: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let now = Instant::now();
        let deadline = now
            .checked_add(self.config.timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let met = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(ReplError::Cancelled),
                _ = sleep_until(deadline) => return Err(self.timeout(what)),
                result = probe() => result?,
            };

            trace!(what, attempt, met, "poll attempt");
            if met {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(ReplError::Cancelled),
                _ = sleep_until(deadline) => return Err(self.timeout(what)),
                _ = sleep(self.config.interval) => {}
            }
        }
    }

    fn timeout(&self, what: &str) -> ReplError {
        ReplError::Timeout {
            what: what.to_string(),
            timeout: self.config.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use synciq_transport::ApiError;

    fn poller(interval_secs: u64, timeout_secs: u64) -> Poller {
        Poller::new(PollConfig {
            interval: Duration::from_secs(interval_secs),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    #[test]
    fn test_poll_config_default() {
        let config = PollConfig::default();
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt_has_no_delay() {
        let ctx = CancellationToken::new();
        let start = Instant::now();
        poller(5, 60)
            .poll_until(&ctx, "ready", || async { Ok(true) })
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_false_false_true() {
        let ctx = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let counter_clone = Arc::clone(&counter);
        poller(5, 60)
            .poll_until(&ctx, "ready", move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(count >= 3)
                }
            })
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_false_times_out_not_before_deadline() {
        let ctx = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let counter_clone = Arc::clone(&counter);
        let err = poller(5, 17)
            .poll_until(&ctx, "never", move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(false)
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(start.elapsed() >= Duration::from_secs(17));
        // attempts at t=0, 5, 10, 15
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_short_circuits() {
        let ctx = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));

        let counter_clone = Arc::clone(&counter);
        let err = poller(5, 60)
            .poll_until(&ctx, "ready", move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if count == 2 {
                        Err(ReplError::Api(ApiError::Status {
                            path: "/platform/11/sync/target/policies/p1".to_string(),
                            status: 500,
                            message: "boom".to_string(),
                        }))
                    } else {
                        Ok(false)
                    }
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ReplError::Api(ApiError::Status { status: 500, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_wait() {
        let ctx = CancellationToken::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(7)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = poller(5, 600)
            .poll_until(&ctx, "ready", || async { Ok(false) })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_skips_probe() {
        let ctx = CancellationToken::new();
        ctx.cancel();
        let counter = Arc::new(AtomicU32::new(0));

        let counter_clone = Arc::clone(&counter);
        let err = poller(5, 60)
            .poll_until(&ctx, "ready", move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_does_not_overflow() {
        let ctx = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let poller = Poller::new(PollConfig {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(u64::MAX),
        });

        let counter_clone = Arc::clone(&counter);
        poller
            .poll_until(&ctx, "ready", move || {
                let counter = Arc::clone(&counter_clone);
                async move { Ok(counter.fetch_add(1, Ordering::SeqCst) >= 1) }
            })
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_abandoned_at_deadline() {
        let ctx = CancellationToken::new();
        let start = Instant::now();
        let err = poller(1, 3)
            .poll_until(&ctx, "slow", || async {
                sleep(Duration::from_secs(3600)).await;
                Ok(true)
            })
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }
}
