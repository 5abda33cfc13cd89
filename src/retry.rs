//! Bounded retry with increasing backoff.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Retry schedule shared by all store round-trips.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub attempts: u32,
    /// Delay after the first failed attempt; doubles per subsequent failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff to sleep after a failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `operation` up to `policy.attempts` times, sleeping between failures.
///
/// The first success short-circuits; on exhaustion the last error is always
/// surfaced, there is no silent give-up path.
pub(crate) async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    op: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.attempts => {
                let pause = policy.backoff(attempt);
                tracing::warn!(
                    "{} failed on attempt {}: {} (retrying in {:?})",
                    op,
                    attempt,
                    err,
                    pause
                );
                sleep(pause).await;
            }
            Err(err) => {
                tracing::warn!("{} failed on final attempt {}: {}", op, attempt, err);
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn backoff_increases_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert!(policy.backoff(1) < policy.backoff(2));
        assert!(policy.backoff(2) < policy.backoff(3));
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let mut calls = 0;
        let result: Result<i32, String> = with_retry(&fast_policy(), "op", |_| {
            calls += 1;
            async { Ok(7) }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt_with_exactly_three_calls() {
        let mut calls = 0;
        let result: Result<i32, String> = with_retry(&fast_policy(), "op", |attempt| {
            calls += 1;
            async move {
                if attempt < 3 {
                    Err(format!("transient failure on attempt {}", attempt))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error_without_a_fourth_call() {
        let mut calls = 0;
        let result: Result<i32, String> = with_retry(&fast_policy(), "op", |attempt| {
            calls += 1;
            async move { Err(format!("failure {}", attempt)) }
        })
        .await;

        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(calls, 3);
    }
}
