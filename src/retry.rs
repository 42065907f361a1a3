//! Retry with exponential backoff for async operations

use crate::error::{ContestError, ErrorKind, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Attempt budget for a retried operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tries {
    /// Keep trying until success or a non-retryable error
    Unbounded,
    /// At most this many attempts in total
    Limited(u32),
}

impl Tries {
    /// Interpret a raw count: `-1` is unbounded, positive values are a limit
    pub fn from_count(count: i64) -> Result<Self> {
        match count {
            -1 => Ok(Tries::Unbounded),
            n if n > 0 => Ok(Tries::Limited(u32::try_from(n).unwrap_or(u32::MAX))),
            n => Err(ContestError::ConfigError(format!(
                "tries must be -1 (unbounded) or positive, got {}",
                n
            ))),
        }
    }
}

/// Retries an operation while it fails with one of the configured error kinds.
///
/// Delays start at `initial_delay` and are multiplied by `multiplier` after
/// every sleep, capped by `max_delay` when set. Errors of other kinds, and the
/// error of the last permitted attempt, are returned unchanged.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    retry_on: Vec<ErrorKind>,
    tries: Tries,
    initial_delay: Duration,
    max_delay: Option<Duration>,
    multiplier: f64,
}

impl RetryPolicy {
    /// Policy retrying the given kinds forever with no delay
    pub fn new(retry_on: &[ErrorKind]) -> Self {
        Self {
            retry_on: retry_on.to_vec(),
            tries: Tries::Unbounded,
            initial_delay: Duration::ZERO,
            max_delay: None,
            multiplier: 1.0,
        }
    }

    pub fn tries(mut self, tries: Tries) -> Self {
        self.tries = tries;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Negative multipliers are clamped to zero
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(0.0);
        self
    }

    pub fn get_tries(&self) -> Tries {
        self.tries
    }

    pub fn get_initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn retries(&self, kind: ErrorKind) -> bool {
        self.retry_on.contains(&kind)
    }

    /// Run `operation` until it succeeds or the policy gives up
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(operation, None).await
    }

    /// Like [`execute`](Self::execute), but the sleep between attempts ends
    /// early with [`ContestError::Cancelled`] once `cancel` fires
    pub async fn execute_until<T, F, Fut>(&self, operation: F, cancel: &CancellationToken) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(operation, Some(cancel)).await
    }

    async fn run<T, F, Fut>(&self, mut operation: F, cancel: Option<&CancellationToken>) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut remaining = self.tries;
        let mut delay = self.initial_delay;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !self.retries(err.kind()) {
                return Err(err);
            }

            if let Tries::Limited(left) = &mut remaining {
                *left = left.saturating_sub(1);
                if *left == 0 {
                    return Err(err);
                }
            }

            debug!(error = %err, delay = ?delay, "Operation failed, retrying");

            match cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(ContestError::Cancelled),
                        _ = sleep(delay) => {}
                    }
                }
                None => sleep(delay).await,
            }

            delay = self.next_delay(delay);
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let grown = Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(max) => grown.min(max),
            None => grown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn wrong_answer() -> ContestError {
        ContestError::AnswerRejected("wrong".to_string())
    }

    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(10),
            "elapsed {:?}, expected {:?}",
            elapsed,
            expected
        );
    }

    #[test]
    fn tries_from_count() {
        assert_eq!(Tries::from_count(-1).unwrap(), Tries::Unbounded);
        assert_eq!(Tries::from_count(5).unwrap(), Tries::Limited(5));
        assert!(Tries::from_count(0).is_err());
        assert!(Tries::from_count(-3).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn limited_tries_invokes_exactly_n_times_and_keeps_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(&[ErrorKind::AnswerRejected])
            .tries(Tries::Limited(5))
            .initial_delay(Duration::from_secs(1))
            .multiplier(2.0);

        let start = Instant::now();
        let result: Result<()> = policy
            .execute(|| {
                let hits = Arc::clone(&hits);
                async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(ContestError::AnswerRejected(format!("attempt {}", n)))
                }
            })
            .await;

        assert_eq!(hits.load(Ordering::SeqCst), 5);
        match result {
            Err(ContestError::AnswerRejected(msg)) => assert_eq!(msg, "attempt 5"),
            other => panic!("unexpected result: {:?}", other),
        }
        // 1 + 2 + 4 + 8
        assert_elapsed(start, Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_tries_return_kth_success() {
        for target in [1usize, 2, 10, 37] {
            let hits = Arc::new(AtomicUsize::new(0));
            let policy = RetryPolicy::new(&[ErrorKind::AnswerRejected])
                .tries(Tries::from_count(-1).unwrap());

            let value = policy
                .execute(|| {
                    let hits = Arc::clone(&hits);
                    async move {
                        let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
                        if n == target {
                            Ok(n)
                        } else {
                            Err(wrong_answer())
                        }
                    }
                })
                .await
                .unwrap();

            assert_eq!(value, target);
            assert_eq!(hits.load(Ordering::SeqCst), target);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn max_delay_equal_to_initial_caps_every_sleep() {
        let hits = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(&[ErrorKind::AnswerRejected])
            .tries(Tries::Limited(5))
            .initial_delay(Duration::from_secs(1))
            .max_delay(Some(Duration::from_secs(1)))
            .multiplier(2.0);

        let start = Instant::now();
        let result: Result<()> = policy
            .execute(|| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Err(wrong_answer())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert_elapsed(start, Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_propagates_after_one_attempt() {
        let hits = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(&[ErrorKind::AnswerRejected])
            .tries(Tries::Limited(3))
            .initial_delay(Duration::from_secs(1));

        let start = Instant::now();
        let result: Result<()> = policy
            .execute(|| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Err(ContestError::CaptchaNotFound("no form".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(ContestError::CaptchaNotFound(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn constant_delay_with_unit_multiplier() {
        let hits = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(&[ErrorKind::AnswerRejected])
            .initial_delay(Duration::from_secs(1));

        let start = Instant::now();
        let value = policy
            .execute(|| {
                let hits = Arc::clone(&hits);
                async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 6 {
                        Ok(())
                    } else {
                        Err(wrong_answer())
                    }
                }
            })
            .await;

        assert!(value.is_ok());
        assert_elapsed(start, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn zero_delay_retries_without_waiting() {
        let hits = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(&[ErrorKind::Transport]).tries(Tries::Limited(50));

        let result: Result<()> = policy
            .execute(|| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Err(ContestError::HttpStatusError {
                        url: "https://example.com".to_string(),
                        status: 502,
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(ContestError::HttpStatusError { status: 502, .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new(&[ErrorKind::AnswerRejected])
            .initial_delay(Duration::from_secs(3600));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result: Result<()> = policy
            .execute_until(|| async { Err(wrong_answer()) }, &cancel)
            .await;

        assert!(matches!(result, Err(ContestError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(3600));
    }

    #[test]
    fn delay_growth_saturates() {
        let policy = RetryPolicy::new(&[]).multiplier(1e300);
        assert_eq!(policy.next_delay(Duration::from_secs(10)), Duration::MAX);
    }
}
