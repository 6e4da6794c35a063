//! Error types for pool and retry operations

use std::time::Duration;

/// Errors from pool construction and request execution.
///
/// `Configuration` is fatal at startup. The remaining variants are terminal
/// for one request only; the pool keeps serving later requests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("credential index {index} out of range (pool size {len})")]
    InvalidIndex { index: usize, len: usize },

    #[error("rate limited after {attempts} attempt(s): {detail}")]
    RateLimitExhausted { attempts: u32, detail: String },

    #[error("upstream timed out after {attempts} attempt(s) of {}s each", .timeout.as_secs())]
    TimeoutExhausted { attempts: u32, timeout: Duration },

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("pool exhausted: {0}")]
    PoolExhausted(String),
}

impl Error {
    /// Short label for metrics and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::InvalidIndex { .. } => "invalid_index",
            Error::RateLimitExhausted { .. } => "rate_limited",
            Error::TimeoutExhausted { .. } => "timeout",
            Error::Upstream(_) => "upstream_error",
            Error::PoolExhausted(_) => "pool_exhausted",
        }
    }
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_reports_attempts_and_seconds() {
        let err = Error::TimeoutExhausted {
            attempts: 2,
            timeout: Duration::from_secs(10),
        };
        assert_eq!(
            err.to_string(),
            "upstream timed out after 2 attempt(s) of 10s each"
        );
    }

    #[test]
    fn rate_limit_display_surfaces_last_detail() {
        let err = Error::RateLimitExhausted {
            attempts: 3,
            detail: "upstream API error 429: quota".into(),
        };
        assert!(err.to_string().contains("429: quota"));
    }

    #[test]
    fn kinds_are_distinct_per_terminal_category() {
        let kinds = [
            Error::RateLimitExhausted {
                attempts: 1,
                detail: String::new(),
            }
            .kind(),
            Error::TimeoutExhausted {
                attempts: 1,
                timeout: Duration::from_secs(1),
            }
            .kind(),
            Error::Upstream(String::new()).kind(),
            Error::PoolExhausted(String::new()).kind(),
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
