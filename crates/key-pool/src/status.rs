//! Read-only pool health snapshot
//!
//! Status mapping: all credentials available → healthy, some → degraded,
//! none → unhealthy. A block whose cooldown already passed is reported as
//! available even though the pool has not swept it yet; the snapshot never
//! mutates the pool.

use serde::Serialize;
use tokio::time::Instant;

use crate::pool::KeyPool;

/// Point-in-time pool summary for health endpoints and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub status: &'static str,
    pub active: String,
    pub total: usize,
    pub blocked: usize,
    pub available: usize,
    pub records: Vec<RecordStatus>,
}

/// Per-credential view. Never includes the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordStatus {
    pub label: String,
    pub blocked: bool,
    pub failure_count: u32,
    pub minutes_until_unblock: u64,
}

impl PoolStatus {
    /// One-line description used in exhaustion errors.
    pub fn summary(&self) -> String {
        let next_unblock = self
            .records
            .iter()
            .filter(|r| r.blocked)
            .map(|r| r.minutes_until_unblock)
            .min();
        match next_unblock {
            Some(minutes) if self.available == 0 => format!(
                "all {} credentials blocked, next unblock in {minutes} min",
                self.total
            ),
            _ => format!(
                "{}/{} credentials available",
                self.available, self.total
            ),
        }
    }
}

impl KeyPool {
    /// Snapshot the pool as of `now`.
    pub fn status(&self, now: Instant) -> PoolStatus {
        let records: Vec<RecordStatus> = self
            .records()
            .iter()
            .map(|record| {
                let blocked = record.is_blocked_at(now);
                RecordStatus {
                    label: record.label().to_string(),
                    blocked,
                    failure_count: record.failure_count(),
                    minutes_until_unblock: if blocked {
                        record.minutes_until_unblock(now)
                    } else {
                        0
                    },
                }
            })
            .collect();

        let total = records.len();
        let blocked = records.iter().filter(|r| r.blocked).count();
        let available = total - blocked;
        let status = if available == total && total > 0 {
            "healthy"
        } else if available > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        PoolStatus {
            status,
            active: self.current().label().to_string(),
            total,
            blocked,
            available,
            records,
        }
    }
}
