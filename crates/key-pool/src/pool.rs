//! Fixed-size credential pool and its rotation policy
//!
//! The pool owns every credential for the life of the process and tracks which
//! one is active. Selection is least-recently-used among unblocked records;
//! expired quarantines are lifted lazily on each selection sweep.
//!
//! All operations take `now` explicitly so callers decide the clock and tests
//! can step through cooldowns without sleeping.

use std::sync::Arc;
use std::time::Duration;

use rand::RngExt;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::record::CredentialRecord;

/// Default quarantine after a rate limit. Provider quota windows are hourly.
pub const DEFAULT_QUARANTINE: Duration = Duration::from_secs(60 * 60);

/// Longest accepted quarantine.
pub const MAX_QUARANTINE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Pool shared between concurrent request handlers.
///
/// The mutex guards the read-modify-write of `active`/`blocked`/`block_until`.
/// Holders must not keep it across an upstream call or a sleep.
pub type SharedPool = Arc<tokio::sync::Mutex<KeyPool>>;

/// Result of a rotation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Active credential changed.
    Switched { from: usize, to: usize },
    /// The only usable credential is the active one.
    Unavailable,
    /// Every credential is blocked.
    Exhausted,
    /// The pool already moved off the failed credential, so this failure is
    /// stale and the pool was not rotated again.
    Superseded { active: usize },
}

/// Ordered, load-once set of credentials with one active entry.
#[derive(Debug)]
pub struct KeyPool {
    records: Vec<CredentialRecord>,
    active: usize,
    quarantine: Duration,
}

impl KeyPool {
    /// Build a pool and pick the starting credential uniformly at random.
    ///
    /// Random start spreads load across independently started processes that
    /// share the same credential list. Fails if `records` is empty.
    pub fn new(records: Vec<CredentialRecord>, quarantine: Duration) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::Configuration(
                "credential pool requires at least one credential".into(),
            ));
        }
        let index = rand::rng().random_range(0..records.len());
        Self::with_active(records, quarantine, index)
    }

    /// Build a pool with a fixed starting credential.
    pub fn with_active(
        mut records: Vec<CredentialRecord>,
        quarantine: Duration,
        index: usize,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::Configuration(
                "credential pool requires at least one credential".into(),
            ));
        }
        if index >= records.len() {
            return Err(Error::InvalidIndex {
                index,
                len: records.len(),
            });
        }
        if quarantine.is_zero() || quarantine > MAX_QUARANTINE {
            return Err(Error::Configuration(format!(
                "quarantine duration must be between 1s and {}s, got {}s",
                MAX_QUARANTINE.as_secs(),
                quarantine.as_secs()
            )));
        }
        warn_duplicate_tokens(&records);

        records[index].touch(Instant::now());
        info!(
            credentials = records.len(),
            active = records[index].label(),
            quarantine_secs = quarantine.as_secs(),
            "credential pool initialized"
        );
        Ok(Self {
            records,
            active: index,
            quarantine,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false: construction rejects empty pools.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[CredentialRecord] {
        &self.records
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    /// Quarantine applied by `rotate_after_rate_limit`.
    pub fn quarantine(&self) -> Duration {
        self.quarantine
    }

    /// The active credential.
    pub fn current(&self) -> &CredentialRecord {
        &self.records[self.active]
    }

    /// Lift expired blocks, then return the least-recently-used unblocked
    /// record (ties go to the lowest index). `None` when all are blocked.
    pub fn find_next_available(&mut self, now: Instant) -> Option<usize> {
        for record in &mut self.records {
            if record.try_unblock(now) {
                info!(credential = record.label(), "credential unblocked");
            }
        }

        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| !record.blocked())
            .min_by_key(|(_, record)| record.last_used())
            .map(|(index, _)| index)
    }

    /// Block the active credential until `now + duration`.
    pub fn quarantine_current(&mut self, now: Instant, duration: Duration) {
        let record = &mut self.records[self.active];
        record.block(now, duration);
        metrics::counter!("key_pool_quarantines_total").increment(1);
        warn!(
            credential = record.label(),
            minutes = duration.as_secs() / 60,
            failures = record.failure_count(),
            "credential quarantined after rate limit"
        );
    }

    /// Make `index` the active credential and stamp its `last_used`.
    /// No-op when it is already active.
    pub fn switch_to(&mut self, index: usize, now: Instant) -> Result<()> {
        if index >= self.records.len() {
            return Err(Error::InvalidIndex {
                index,
                len: self.records.len(),
            });
        }
        if index == self.active {
            return Ok(());
        }
        self.active = index;
        self.records[index].touch(now);
        info!(
            credential = self.records[index].label(),
            index, "switched active credential"
        );
        Ok(())
    }

    /// Rotate away from a rate-limited credential, quarantining it first.
    pub fn rotate_after_rate_limit(&mut self, now: Instant) -> Rotation {
        let quarantine = self.quarantine;
        self.rotate(now, Some(quarantine), "rate_limit")
    }

    /// Rotate away from the active credential without penalizing it.
    pub fn rotate_silently(&mut self, now: Instant) -> Rotation {
        self.rotate(now, None, "timeout")
    }

    /// Rotate after an attempt on `failed` hit a rate limit (`quarantine`) or a
    /// timeout.
    ///
    /// Concurrent requests may report failures on a credential the pool has
    /// already left. Such a report never moves the pool or blocks the new
    /// active credential; a stale rate limit still quarantines `failed` if
    /// nothing has yet.
    pub fn rotate_from(&mut self, failed: usize, now: Instant, quarantine: bool) -> Rotation {
        if failed == self.active {
            return if quarantine {
                self.rotate_after_rate_limit(now)
            } else {
                self.rotate_silently(now)
            };
        }

        let duration = self.quarantine;
        if let Some(record) = self.records.get_mut(failed) {
            if quarantine && !record.is_blocked_at(now) {
                record.block(now, duration);
                metrics::counter!("key_pool_quarantines_total").increment(1);
                warn!(
                    credential = record.label(),
                    minutes = duration.as_secs() / 60,
                    failures = record.failure_count(),
                    "credential quarantined after rate limit"
                );
            }
        }
        info!(
            failed,
            active = self.records[self.active].label(),
            "pool already rotated off failed credential"
        );
        Rotation::Superseded {
            active: self.active,
        }
    }

    fn rotate(&mut self, now: Instant, quarantine: Option<Duration>, reason: &'static str) -> Rotation {
        let Some(next) = self.find_next_available(now) else {
            error!(reason, "no credential available, all are blocked");
            return Rotation::Exhausted;
        };
        if next == self.active {
            warn!(
                reason,
                credential = self.current().label(),
                "no alternative credential to rotate to"
            );
            return Rotation::Unavailable;
        }

        let from = self.active;
        if let Some(duration) = quarantine {
            self.quarantine_current(now, duration);
        }
        // `next` was range-checked by find_next_available
        self.active = next;
        self.records[next].touch(now);
        metrics::counter!("key_pool_rotations_total", "reason" => reason).increment(1);
        info!(
            reason,
            from = self.records[from].label(),
            to = self.records[next].label(),
            "rotated credential"
        );
        Rotation::Switched { from, to: next }
    }
}

fn warn_duplicate_tokens(records: &[CredentialRecord]) {
    for (i, record) in records.iter().enumerate() {
        if records[..i].iter().any(|prior| prior.token() == record.token()) {
            warn!(
                credential = record.label(),
                "duplicate credential token in pool"
            );
        }
    }
}
