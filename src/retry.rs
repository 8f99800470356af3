//! Bounded retry with exponential backoff and jitter.
//!
//! [`RetryPolicy`] wraps any async operation that reports failures as
//! [`RetryError`]. Transient failures are retried up to `max_retries` times;
//! permanent failures return immediately.
//!
//! The delay before retry `n` (1-based) is `base_delay * 2^(n-1)`, capped at
//! `max_delay`, then scaled by a random factor in `[0.5, 1.0]` when jitter is
//! enabled.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::warn;

/// Classification of a failed attempt.
#[derive(Debug, Error)]
pub enum RetryError {
    /// Rate limit, server error, timeout, connection failure.
    #[error("{0}")]
    Transient(anyhow::Error),
    /// Anything retrying cannot fix, such as a rejected request.
    #[error("{0}")]
    Permanent(anyhow::Error),
}

impl RetryError {
    pub fn into_inner(self) -> anyhow::Error {
        match self {
            RetryError::Transient(e) | RetryError::Permanent(e) => e,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    /// A policy that retries without sleeping. Used by tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Backoff before retry number `retry` (1-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        if self.jitter && !delay.is_zero() {
            delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
        } else {
            delay
        }
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// `op` receives the 0-based attempt number. The error of the last
    /// attempt is returned with `label` attached as context.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RetryError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(RetryError::Permanent(e)) => {
                    return Err(e.context(format!("{} failed", label)));
                }
                Err(RetryError::Transient(e)) => {
                    if attempt >= self.max_retries {
                        return Err(e.context(format!(
                            "{} failed after {} attempts",
                            label,
                            attempt + 1
                        )));
                    }
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    warn!(
                        op = label,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);
        let out = policy
            .run("embed", |_| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    Err(RetryError::Transient(anyhow!("429 Too Many Requests")))
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::immediate(5)
            .run("embed", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(RetryError::Permanent(anyhow!("400 Bad Request")))
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(format!("{:#}", err).contains("400 Bad Request"));
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error() {
        let err = RetryPolicy::immediate(2)
            .run("chat", |attempt| async move {
                Err::<(), _>(RetryError::Transient(anyhow!("503 on attempt {}", attempt)))
            })
            .await
            .unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("chat failed after 3 attempts"), "{}", msg);
        assert!(msg.contains("503 on attempt 2"), "{}", msg);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            jitter: true,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_millis(1_000));
        for retry in 1..6 {
            let d = policy.delay_for(retry);
            let slack = Duration::from_millis(1);
            assert!(d <= policy.backoff(retry) + slack);
            assert!(d + slack >= policy.backoff(retry) / 2);
        }
    }
}
