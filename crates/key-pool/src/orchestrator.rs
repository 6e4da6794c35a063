//! Attempt loop tying together pool, invoker, and classification
//!
//! Per logical request, attempts run strictly one after another:
//! - success → return
//! - timeout → rotate silently (no quarantine), short fixed pause, retry
//! - rate limit → quarantine + rotate, jittered pause, retry
//! - anything else → abort, pool untouched
//!
//! The pool lock is taken only for checkout and rotation, never across an
//! upstream call or a pause.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use rand::RngExt;
use tokio::time::Instant;
use tracing::{error, info, warn};
use upstream::{GenerateRequest, Generation, Generator};

use crate::classify::{AttemptOutcome, classify_outcome};
use crate::error::{Error, Result};
use crate::invoker::Invoker;
use crate::pool::{Rotation, SharedPool};

/// Attempt budget for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Retries after the first attempt; `0` means exactly one attempt.
    pub max_retries: u32,
    /// Hard deadline per attempt.
    pub timeout: Duration,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_retries: 2,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Pauses between attempts and the single-credential timeout fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed pause after a timeout rotation.
    pub timeout_pause: Duration,
    /// Bounds of the uniform jitter after a rate-limit rotation.
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    /// When a timeout finds no other credential, retry on the same one instead
    /// of aborting. The credential is not at fault for a slow network.
    pub retry_same_credential_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_pause: Duration::from_millis(500),
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(3),
            retry_same_credential_on_timeout: false,
        }
    }
}

impl RetryPolicy {
    /// Uniform pause in `[jitter_min, jitter_max]`. Desynchronizes competing
    /// retries from independently started sessions.
    pub fn jitter(&self) -> Duration {
        let min = self.jitter_min.as_millis() as u64;
        let max = self.jitter_max.as_millis() as u64;
        if max <= min {
            return self.jitter_min;
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// Successful result with the credential that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion<T> {
    pub value: T,
    pub credential: String,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Drives requests through the pool with rotation and bounded retries.
pub struct Orchestrator {
    pool: SharedPool,
    generator: Arc<dyn Generator>,
    invoker: Invoker,
    policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        pool: SharedPool,
        generator: Arc<dyn Generator>,
        invoker: Invoker,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            pool,
            generator,
            invoker,
            policy,
        }
    }

    pub fn pool(&self) -> &SharedPool {
        &self.pool
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    /// Execute `request` within `budget`.
    ///
    /// Terminal errors: `RateLimitExhausted`, `TimeoutExhausted`,
    /// `Upstream` (never retried), `PoolExhausted` (every credential blocked).
    pub async fn execute(
        &self,
        request: &GenerateRequest,
        budget: Budget,
    ) -> Result<Completion<Generation>> {
        let total = budget.max_retries + 1;
        let mut attempt: u32 = 0;

        loop {
            let (index, label, token) = self.checkout().await?;
            info!(
                attempt = attempt + 1,
                total,
                credential = %label,
                upstream = self.generator.id(),
                model = self.generator.model(),
                "upstream attempt"
            );

            let call = self.generator.generate(token, request.clone());
            let outcome = classify_outcome(self.invoker.invoke(call, budget.timeout).await);
            metrics::counter!("key_pool_attempts_total", "outcome" => outcome.label())
                .increment(1);

            let retries_left = attempt < budget.max_retries;
            match outcome {
                AttemptOutcome::Success(generation) => {
                    info!(credential = %label, attempts = attempt + 1, "generation succeeded");
                    return Ok(Completion {
                        value: generation,
                        credential: label,
                        attempts: attempt + 1,
                    });
                }
                AttemptOutcome::TimedOut => {
                    warn!(
                        credential = %label,
                        timeout_secs = budget.timeout.as_secs_f64(),
                        "attempt timed out"
                    );
                    let exhausted = Error::TimeoutExhausted {
                        attempts: attempt + 1,
                        timeout: budget.timeout,
                    };
                    if !retries_left {
                        error!("final attempt timed out");
                        return Err(exhausted);
                    }
                    match self.rotate(index, false).await {
                        Rotation::Switched { .. } | Rotation::Superseded { .. } => {}
                        Rotation::Unavailable if self.policy.retry_same_credential_on_timeout => {
                            info!(credential = %label, "no alternative credential, retrying same one");
                        }
                        _ => {
                            error!("no credential to rotate to after timeout");
                            return Err(exhausted);
                        }
                    }
                    tokio::time::sleep(self.policy.timeout_pause).await;
                }
                AttemptOutcome::RateLimited(detail) => {
                    warn!(credential = %label, error = %detail, "attempt rate limited");
                    if !retries_left {
                        error!(error = %detail, "retries exhausted on rate limit");
                        return Err(Error::RateLimitExhausted {
                            attempts: attempt + 1,
                            detail,
                        });
                    }
                    match self.rotate(index, true).await {
                        Rotation::Switched { .. } | Rotation::Superseded { .. } => {}
                        Rotation::Unavailable | Rotation::Exhausted => {
                            error!("no credential to rotate to after rate limit");
                            return Err(Error::RateLimitExhausted {
                                attempts: attempt + 1,
                                detail,
                            });
                        }
                    }
                    tokio::time::sleep(self.policy.jitter()).await;
                }
                AttemptOutcome::OtherError(detail) => {
                    error!(credential = %label, error = %detail, "upstream error, not retrying");
                    return Err(Error::Upstream(detail));
                }
            }

            attempt += 1;
        }
    }

    /// Read the active credential, moving off it first if it is blocked
    /// (possible when the pool is shared between handlers).
    async fn checkout(&self) -> Result<(usize, String, Secret<String>)> {
        let mut pool = self.pool.lock().await;
        let now = Instant::now();
        if pool.current().is_blocked_at(now) {
            match pool.find_next_available(now) {
                Some(index) => pool.switch_to(index, now)?,
                None => {
                    let summary = pool.status(now).summary();
                    error!(%summary, "no usable credential");
                    return Err(Error::PoolExhausted(summary));
                }
            }
        }
        let record = pool.current();
        Ok((
            pool.active_index(),
            record.label().to_string(),
            record.token().clone(),
        ))
    }

    /// Rotate off `failed`, the credential the attempt actually used.
    async fn rotate(&self, failed: usize, quarantine: bool) -> Rotation {
        let mut pool = self.pool.lock().await;
        pool.rotate_from(failed, Instant::now(), quarantine)
    }
}
