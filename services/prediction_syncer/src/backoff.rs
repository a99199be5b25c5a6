use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_THROTTLE_DELAY: Duration = Duration::from_secs(60);

/// Suspension point used by the fetcher and the notification dispatcher.
/// Production code sleeps on the tokio timer; tests record the requested
/// waits instead of sleeping.
#[async_trait]
pub trait Delay: Send + Sync {
    /// Waits for `duration`. Returns `false` when shutdown cut the wait
    /// short, in which case the caller should stop its current work.
    async fn sleep(&self, duration: Duration) -> bool;
}

/// Tokio timer sleep, optionally interrupted by a shutdown signal.
#[derive(Debug, Clone, Default)]
pub struct TokioDelay {
    shutdown: Option<watch::Receiver<bool>>,
}

impl TokioDelay {
    pub fn until_shutdown(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            shutdown: Some(shutdown),
        }
    }
}

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) -> bool {
        let Some(shutdown) = &self.shutdown else {
            if !duration.is_zero() {
                tokio::time::sleep(duration).await;
            }
            return true;
        };

        let mut shutdown = shutdown.clone();
        if *shutdown.borrow_and_update() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }

        let timer = tokio::time::sleep(duration);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                _ = &mut timer => return true,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // sender dropped; shutdown can no longer arrive
                        (&mut timer).await;
                        return true;
                    }
                    if *shutdown.borrow_and_update() {
                        return false;
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub default_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            default_delay: DEFAULT_THROTTLE_DELAY,
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, default_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            default_delay,
        }
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Wait before the next attempt: the provider's reset hint when it sent
    /// one, the fixed default otherwise.
    pub fn delay_for(&self, reset_hint: Option<Duration>) -> Duration {
        reset_hint.unwrap_or(self.default_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_is_bounded() {
        let policy = BackoffPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_zero_attempts_still_allows_one_call() {
        let policy = BackoffPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.should_retry(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_delay_sleeps_full_duration() {
        let started = tokio::time::Instant::now();
        assert!(TokioDelay::default().sleep(Duration::from_secs(30)).await);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cuts_wait_short() {
        let (stop, shutdown) = watch::channel(false);
        let delay = TokioDelay::until_shutdown(shutdown);
        let started = tokio::time::Instant::now();

        let stopper = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            stop.send(true).unwrap();
        };
        let (completed, ()) = tokio::join!(delay.sleep(Duration::from_secs(60)), stopper);

        assert!(!completed);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        // already stopped: later waits return at once
        assert!(!delay.sleep(Duration::from_secs(60)).await);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_lets_wait_finish() {
        let (stop, shutdown) = watch::channel(false);
        let delay = TokioDelay::until_shutdown(shutdown);
        drop(stop);

        let started = tokio::time::Instant::now();
        assert!(delay.sleep(Duration::from_secs(10)).await);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn test_delay_prefers_reset_hint() {
        let policy = BackoffPolicy::new(3, Duration::from_secs(60));
        assert_eq!(policy.delay_for(Some(Duration::from_secs(7))), Duration::from_secs(7));
        assert_eq!(policy.delay_for(None), Duration::from_secs(60));
    }
}
