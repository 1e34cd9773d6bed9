//! Retry with exponential backoff for transient client failures.

use std::future::Future;
use std::time::Duration;

use elv::Categorizable;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::KlientError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Add up to 25% random delay so a whole run does not retry in lockstep.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts. For tests.
    pub fn uten_ventetid(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Backoff before the retry following `attempt` (0-indexed), without jitter.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let backoff_ms = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let backoff_ms = backoff_ms.min(self.max_backoff_ms as f64).max(0.0) as u64;
        Duration::from_millis(backoff_ms)
    }

    fn ventetid(&self, attempt: u32) -> Duration {
        let backoff = self.backoff_for_attempt(attempt);
        if !self.jitter || backoff.is_zero() {
            return backoff;
        }
        let spenn = (backoff.as_millis() / 4) as u64;
        backoff + Duration::from_millis(fastrand::u64(0..=spenn))
    }

    /// Run `operasjon`, retrying transient failures.
    ///
    /// Non-transient errors are returned at once. When the attempts run out
    /// the last transient error is wrapped in [`KlientError::ForsoekOppbrukt`].
    pub async fn utfoer<T, F, Fut>(&self, operasjon: &str, mut kall: F) -> Result<T, KlientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, KlientError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match kall().await {
                Ok(svar) => return Ok(svar),
                Err(feil) if !feil.kind().is_retryable() => return Err(feil),
                Err(feil) if attempt + 1 >= max_attempts => {
                    return Err(KlientError::ForsoekOppbrukt {
                        forsoek: attempt + 1,
                        siste: Box::new(feil),
                    });
                }
                Err(feil) => {
                    let ventetid = self.ventetid(attempt);
                    warn!(
                        operasjon,
                        forsoek = attempt + 1,
                        ventetid_ms = ventetid.as_millis() as u64,
                        error = %feil,
                        "forbigående feil; prøver igjen"
                    );
                    tokio::time::sleep(ventetid).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elv::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn serverfeil() -> KlientError {
        KlientError::Serverfeil {
            url: "http://beregning/api".into(),
            status: 503,
        }
    }

    fn avvist() -> KlientError {
        KlientError::Avvist {
            url: "http://beregning/api".into(),
            status: 400,
            body: "ugyldig".into(),
        }
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy {
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_capped() {
        let policy = RetryPolicy {
            initial_backoff_ms: 10_000,
            max_backoff_ms: 30_000,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let policy = RetryPolicy {
            initial_backoff_ms: 400,
            jitter: true,
            ..RetryPolicy::default()
        };
        for _ in 0..100 {
            let ventetid = policy.ventetid(0);
            assert!(ventetid >= Duration::from_millis(400));
            assert!(ventetid <= Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_until_success() {
        let policy = RetryPolicy::uten_ventetid(3);
        let forsoek = AtomicU32::new(0);
        let teller = &forsoek;

        let svar = policy
            .utfoer("beregn", move || async move {
                if teller.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(serverfeil())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(svar.unwrap(), 42);
        assert_eq!(forsoek.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_fatal() {
        let policy = RetryPolicy::uten_ventetid(3);
        let forsoek = AtomicU32::new(0);
        let teller = &forsoek;

        let feil = policy
            .utfoer("beregn", move || async move {
                teller.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(serverfeil())
            })
            .await
            .unwrap_err();

        assert_eq!(forsoek.load(Ordering::SeqCst), 3);
        assert!(matches!(feil, KlientError::ForsoekOppbrukt { forsoek: 3, .. }));
        assert_eq!(feil.kind(), ErrorKind::RetriesExhausted);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let policy = RetryPolicy::uten_ventetid(5);
        let forsoek = AtomicU32::new(0);
        let teller = &forsoek;

        let feil = policy
            .utfoer("beregn", move || async move {
                teller.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(avvist())
            })
            .await
            .unwrap_err();

        assert_eq!(forsoek.load(Ordering::SeqCst), 1);
        assert_eq!(feil.kind(), ErrorKind::DataIntegrity);
    }
}
