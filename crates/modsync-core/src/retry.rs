use std::future::Future;
use std::io;
use std::time::Duration;

use log::debug;
use modsync_backend::SyncError;

const DEFAULT_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Classifies a failure as worth retrying on its own.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for SyncError {
    fn is_transient(&self) -> bool {
        SyncError::is_transient(self)
    }
}

impl Transient for io::Error {
    fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            io::ErrorKind::TimedOut
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::NotConnected
                | io::ErrorKind::BrokenPipe
        ) || message_indicates_transient(&self.to_string())
    }
}

impl Transient for String {
    fn is_transient(&self) -> bool {
        message_indicates_transient(self)
    }
}

impl Transient for &str {
    fn is_transient(&self) -> bool {
        message_indicates_transient(self)
    }
}

/// Loose match on free-form error text, for failures that only carry a message.
#[must_use]
pub fn message_indicates_transient(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["network", "fetch", "timeout", "timed out", "connection"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Snapshot handed to retry observers before each backoff sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// The attempt that just failed, 1-indexed.
    pub attempt: u32,
    pub remaining: u32,
    pub next_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

impl RetryPolicy {
    /// A policy always makes at least one attempt.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Sleep before `attempt` (1-indexed): nothing for the first attempt,
    /// then `base_delay * 2^(attempt - 1)`.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Sum of every backoff sleep when all attempts fail transiently.
    #[must_use]
    pub fn total_backoff(&self) -> Duration {
        (2..=self.max_attempts)
            .map(|attempt| self.delay_before(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Run `operation` until it succeeds, fails with a non-transient error,
    /// or runs out of attempts. The last error is returned untouched.
    ///
    /// # Errors
    /// Returns the error of the final attempt made.
    pub async fn run<T, E, Op, Fut>(&self, operation_name: &str, operation: Op) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_observed(operation_name, operation, |_| {}).await
    }

    /// Like [`RetryPolicy::run`], calling `on_retry` before each backoff sleep.
    ///
    /// # Errors
    /// Returns the error of the final attempt made.
    pub async fn run_observed<T, E, Op, Fut, Obs>(
        &self,
        operation_name: &str,
        mut operation: Op,
        mut on_retry: Obs,
    ) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Obs: FnMut(RetryState),
    {
        let mut attempt = 1;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_transient() {
                debug!("{operation_name} attempt {attempt} failed permanently: {error}");
                return Err(error);
            }

            if attempt >= self.max_attempts {
                debug!(
                    "{operation_name} attempt {attempt} failed, no attempts left: {error}"
                );
                return Err(error);
            }

            let next_delay = self.delay_before(attempt + 1);
            debug!(
                "{operation_name} attempt {attempt} failed, retrying in {}ms: {error}",
                next_delay.as_millis()
            );
            on_retry(RetryState {
                attempt,
                remaining: self.max_attempts - attempt,
                next_delay,
            });

            tokio::time::sleep(next_delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };
    use std::time::Duration;

    use modsync_backend::SyncError;
    use tokio::time::Instant;

    use super::{RetryPolicy, RetryState, Transient, message_indicates_transient};

    #[test]
    fn delays_double_from_the_second_attempt() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before(3), Duration::from_millis(400));
        assert_eq!(policy.delay_before(4), Duration::from_millis(800));
        assert_eq!(policy.total_backoff(), Duration::from_millis(1400));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn classifies_messages_and_io_errors() {
        assert!(message_indicates_transient("Failed to fetch"));
        assert!(message_indicates_transient("Connection reset by peer"));
        assert!(message_indicates_transient("request Timed Out"));
        assert!(!message_indicates_transient("401 Bad credentials"));

        assert!(io::Error::from(io::ErrorKind::ConnectionReset).is_transient());
        assert!(!io::Error::from(io::ErrorKind::PermissionDenied).is_transient());
        assert!("network unreachable".is_transient());
        assert!(!String::from("invalid manifest").is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_failure_uses_every_attempt_and_full_backoff() {
        let base = Duration::from_millis(1000);
        let policy = RetryPolicy::new(4, base);
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result: Result<(), SyncError> = policy
            .run("fetch manifest", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(SyncError::network("fetch manifest", "connection reset"))
                }
            })
            .await;

        assert_eq!(
            result,
            Err(SyncError::network("fetch manifest", "connection reset"))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), base * (2 + 4 + 8));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_stops_after_one_invocation() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result: Result<(), SyncError> = policy
            .run("fetch manifest", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(SyncError::auth("bad credentials"))
                }
            })
            .await;

        assert_eq!(result, Err(SyncError::auth("bad credentials")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures_and_reports_retries() {
        let policy = RetryPolicy::new(3, Duration::from_millis(50));
        let calls = Arc::new(AtomicU32::new(0));
        let mut observed = Vec::new();

        let result = policy
            .run_observed(
                "download",
                || {
                    let calls = Arc::clone(&calls);
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(String::from("network timeout"))
                        } else {
                            Ok("payload")
                        }
                    }
                },
                |state| observed.push(state),
            )
            .await;

        assert_eq!(result, Ok("payload"));
        assert_eq!(
            observed,
            vec![
                RetryState {
                    attempt: 1,
                    remaining: 2,
                    next_delay: Duration::from_millis(100),
                },
                RetryState {
                    attempt: 2,
                    remaining: 1,
                    next_delay: Duration::from_millis(200),
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_policy_never_sleeps() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), String> = RetryPolicy::no_retry()
            .run("lookup", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(String::from("connection refused"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
