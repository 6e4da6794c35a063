//! Attempt outcome classification
//!
//! The upstream exposes no typed error for quota exhaustion, so rate limits are
//! recognized heuristically from the error text. The patterns match the
//! wording Gemini uses today and may need revisiting if that wording changes.

use upstream::{Generation, UpstreamError};

use crate::invoker::Invocation;

/// Lower-case fragments that mark an upstream error as a rate limit.
const RATE_LIMIT_PATTERNS: &[&str] = &["429", "quota", "rate limit"];

/// Outcome of one attempt, as seen by the orchestrator.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    /// Quota or rate limit; detail is the upstream error text.
    RateLimited(String),
    TimedOut,
    /// Anything else; never retried.
    OtherError(String),
}

impl<T> AttemptOutcome<T> {
    /// Label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success(_) => "success",
            AttemptOutcome::RateLimited(_) => "rate_limited",
            AttemptOutcome::TimedOut => "timeout",
            AttemptOutcome::OtherError(_) => "error",
        }
    }
}

/// Heuristic rate-limit detection on error text. Case-insensitive.
pub fn is_rate_limit(detail: &str) -> bool {
    let lower = detail.to_lowercase();
    RATE_LIMIT_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Map an invoker result onto the orchestrator's outcome taxonomy.
pub fn classify_outcome(
    invocation: Invocation<upstream::Result<Generation>>,
) -> AttemptOutcome<Generation> {
    match invocation {
        Invocation::TimedOut => AttemptOutcome::TimedOut,
        Invocation::Completed(Ok(generation)) => AttemptOutcome::Success(generation),
        Invocation::Completed(Err(err)) => classify_error(&err),
    }
}

fn classify_error(err: &UpstreamError) -> AttemptOutcome<Generation> {
    let detail = err.to_string();
    if is_rate_limit(&detail) {
        AttemptOutcome::RateLimited(detail)
    } else {
        AttemptOutcome::OtherError(detail)
    }
}
