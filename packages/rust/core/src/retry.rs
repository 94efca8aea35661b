//! Bounded retry with backoff, shared by every external call.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Throttled by the remote side; waits start higher.
    RateLimit,
    /// Any other retryable failure.
    Generic,
    /// Retrying cannot help; stop immediately.
    Fatal,
}

/// Attempt budget and wait schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Added to every server-suggested wait.
    pub margin: Duration,
    /// Wait per attempt number after a rate-limit failure without a hint.
    pub rate_limit_base: Duration,
    /// Wait per attempt number after a generic failure without a hint.
    pub generic_base: Duration,
    /// Upper bound for a server-suggested wait, before the margin.
    pub max_hint: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            margin: Duration::from_secs(2),
            rate_limit_base: Duration::from_secs(20),
            generic_base: Duration::from_secs(3),
            max_hint: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following failed attempt number `attempt` (1-based).
    pub fn wait_for(&self, kind: FailureKind, suggested: Option<Duration>, attempt: u32) -> Duration {
        match (suggested, kind) {
            (Some(wait), _) => wait.min(self.max_hint).saturating_add(self.margin),
            (None, FailureKind::RateLimit) => self.rate_limit_base.saturating_mul(attempt),
            (None, _) => self.generic_base.saturating_mul(attempt),
        }
    }
}

/// A successful call and what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
    pub waited: Duration,
}

/// The last error once retrying stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure<E> {
    pub error: E,
    pub kind: FailureKind,
    pub attempts: u32,
    pub waited: Duration,
}

/// Run `op` until it succeeds, fails fatally, or the attempts run out.
///
/// `op` receives the 1-based attempt number. After a retryable failure the
/// task sleeps for [`RetryPolicy::wait_for`]; no sleep follows the last
/// attempt.
pub async fn with_backoff<T, E, F, Fut, C, W>(
    policy: &RetryPolicy,
    label: &str,
    classify: C,
    suggested_wait: W,
    mut op: F,
) -> Result<Retried<T>, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> FailureKind,
    W: Fn(&E) -> Option<Duration>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut waited = Duration::ZERO;
    let mut attempt = 1;

    loop {
        let error = match op(attempt).await {
            Ok(value) => {
                return Ok(Retried {
                    value,
                    attempts: attempt,
                    waited,
                });
            }
            Err(e) => e,
        };

        let kind = classify(&error);
        if kind == FailureKind::Fatal || attempt >= max_attempts {
            if kind != FailureKind::Fatal {
                error!(call = label, attempts = attempt, error = %error, "giving up after retries");
            }
            return Err(RetryFailure {
                error,
                kind,
                attempts: attempt,
                waited,
            });
        }

        let wait = policy.wait_for(kind, suggested_wait(&error), attempt);
        warn!(
            call = label,
            attempt,
            max_attempts,
            wait_secs = wait.as_secs_f64(),
            rate_limited = kind == FailureKind::RateLimit,
            error = %error,
            "call failed, retrying"
        );
        tokio::time::sleep(wait).await;
        waited += wait;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Throttled(Option<u64>),
        Broken,
        Stop,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    fn classify(e: &TestError) -> FailureKind {
        match e {
            TestError::Throttled(_) => FailureKind::RateLimit,
            TestError::Broken => FailureKind::Generic,
            TestError::Stop => FailureKind::Fatal,
        }
    }

    fn hint(e: &TestError) -> Option<Duration> {
        match e {
            TestError::Throttled(Some(secs)) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    #[test]
    fn wait_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.wait_for(FailureKind::RateLimit, Some(Duration::from_secs(5)), 3),
            Duration::from_secs(7)
        );
        assert_eq!(policy.wait_for(FailureKind::RateLimit, None, 2), Duration::from_secs(40));
        assert_eq!(policy.wait_for(FailureKind::Generic, None, 3), Duration::from_secs(9));
    }

    #[test]
    fn oversized_hint_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.wait_for(FailureKind::RateLimit, Some(Duration::from_secs(u64::MAX)), 1),
            Duration::from_secs(302)
        );
        assert_eq!(
            policy.wait_for(FailureKind::RateLimit, Some(Duration::MAX), 1),
            Duration::from_secs(302)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_hinted_waits() {
        let start = tokio::time::Instant::now();
        let calls = Cell::new(0);

        let result = with_backoff(&RetryPolicy::default(), "test", classify, hint, |attempt| {
            calls.set(calls.get() + 1);
            async move {
                if attempt < 5 {
                    Err(TestError::Throttled(Some(5)))
                } else {
                    Ok("done")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result.value, "done");
        assert_eq!(result.attempts, 5);
        assert_eq!(result.waited, Duration::from_secs(28));
        assert_eq!(start.elapsed(), Duration::from_secs(28));
        assert_eq!(calls.get(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn generic_failures_exhaust_attempts() {
        let start = tokio::time::Instant::now();

        let failure = with_backoff(&RetryPolicy::default(), "test", classify, hint, |_| async {
            Err::<(), _>(TestError::Broken)
        })
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 5);
        assert_eq!(failure.kind, FailureKind::Generic);
        // 3 + 6 + 9 + 12, no wait after the fifth attempt
        assert_eq!(failure.waited, Duration::from_secs(30));
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_stops_immediately() {
        let start = tokio::time::Instant::now();

        let failure = with_backoff(&RetryPolicy::default(), "test", classify, hint, |_| async {
            Err::<(), _>(TestError::Stop)
        })
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.waited, Duration::ZERO);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
