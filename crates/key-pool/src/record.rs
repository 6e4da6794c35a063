//! Per-credential usage and block state

use std::time::Duration;

use common::Secret;
use tokio::time::Instant;

/// One credential in the pool.
///
/// Block transitions:
/// - unblocked → blocked (rate limit quarantine, `failure_count += 1`)
/// - blocked → unblocked (strictly after `block_until`, `failure_count = 0`)
///
/// Timestamps use `tokio::time::Instant` so paused-clock tests drive cooldowns.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    token: Secret<String>,
    label: String,
    last_used: Option<Instant>,
    failure_count: u32,
    blocked: bool,
    block_until: Option<Instant>,
}

impl CredentialRecord {
    /// A fresh, never-used, unblocked credential.
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            token: Secret::new(token.into()),
            label: label.into(),
            last_used: None,
            failure_count: 0,
            blocked: false,
            block_until: None,
        }
    }

    pub fn token(&self) -> &Secret<String> {
        &self.token
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Last time this credential was made active. `None` sorts as oldest.
    pub fn last_used(&self) -> Option<Instant> {
        self.last_used
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Raw block flag. May still be set after the cooldown passed, until the
    /// next `find_next_available` sweep clears it.
    pub fn blocked(&self) -> bool {
        self.blocked
    }

    pub fn block_until(&self) -> Option<Instant> {
        self.block_until
    }

    /// Whether the record is blocked as of `now`, treating an expired block as
    /// already lifted. Pure: does not clear the flag.
    pub fn is_blocked_at(&self, now: Instant) -> bool {
        match (self.blocked, self.block_until) {
            (true, Some(until)) => now <= until,
            (true, None) => true,
            (false, _) => false,
        }
    }

    /// Whole minutes until the block lifts, rounded down. 0 when not blocked.
    pub fn minutes_until_unblock(&self, now: Instant) -> u64 {
        if !self.blocked {
            return 0;
        }
        self.block_until
            .map(|until| until.saturating_duration_since(now).as_secs() / 60)
            .unwrap_or(0)
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_used = Some(now);
    }

    pub(crate) fn block(&mut self, now: Instant, duration: Duration) {
        self.blocked = true;
        self.block_until = Some(now + duration);
        self.failure_count += 1;
    }

    /// Lift an expired block. Returns true if the record was unblocked.
    pub(crate) fn try_unblock(&mut self, now: Instant) -> bool {
        if self.blocked && !self.is_blocked_at(now) {
            self.blocked = false;
            self.block_until = None;
            self.failure_count = 0;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_unused_and_unblocked() {
        let record = CredentialRecord::new("main", "AIza-key");
        assert_eq!(record.label(), "main");
        assert_eq!(record.token().expose(), "AIza-key");
        assert!(record.last_used().is_none());
        assert!(!record.blocked());
        assert_eq!(record.failure_count(), 0);
    }

    #[test]
    fn block_sets_deadline_and_counts_failure() {
        let now = Instant::now();
        let mut record = CredentialRecord::new("a", "k");
        record.block(now, Duration::from_secs(3600));

        assert!(record.blocked());
        assert_eq!(record.block_until(), Some(now + Duration::from_secs(3600)));
        assert_eq!(record.failure_count(), 1);
        assert!(record.is_blocked_at(now));
    }

    #[test]
    fn block_is_still_active_exactly_at_deadline() {
        let now = Instant::now();
        let mut record = CredentialRecord::new("a", "k");
        record.block(now, Duration::from_secs(60));

        let deadline = now + Duration::from_secs(60);
        assert!(record.is_blocked_at(deadline));
        assert!(!record.try_unblock(deadline));
        assert!(!record.is_blocked_at(deadline + Duration::from_millis(1)));
    }

    #[test]
    fn try_unblock_resets_failure_count() {
        let now = Instant::now();
        let mut record = CredentialRecord::new("a", "k");
        record.block(now, Duration::from_secs(60));

        assert!(record.try_unblock(now + Duration::from_secs(61)));
        assert!(!record.blocked());
        assert!(record.block_until().is_none());
        assert_eq!(record.failure_count(), 0);
    }

    #[test]
    fn minutes_until_unblock_rounds_down() {
        let now = Instant::now();
        let mut record = CredentialRecord::new("a", "k");
        assert_eq!(record.minutes_until_unblock(now), 0);

        record.block(now, Duration::from_secs(60 * 60));
        assert_eq!(record.minutes_until_unblock(now), 60);
        assert_eq!(
            record.minutes_until_unblock(now + Duration::from_secs(90)),
            58
        );
        assert_eq!(
            record.minutes_until_unblock(now + Duration::from_secs(7200)),
            0
        );
    }

    #[test]
    fn debug_output_redacts_token() {
        let record = CredentialRecord::new("a", "AIza-super-secret");
        let debug = format!("{record:?}");
        assert!(!debug.contains("super-secret"), "got: {debug}");
    }
}
