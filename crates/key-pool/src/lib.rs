//! Credential pool with rotation, quarantine, and deadline-bounded retries
//!
//! Holds a fixed set of API credentials for one upstream text-generation
//! service and drives each logical request through a bounded attempt loop:
//!
//! 1. The pool picks a random starting credential at construction
//! 2. Each attempt runs under a hard deadline via the `Invoker`
//! 3. Rate-limit failures quarantine the credential and rotate (LRU) to another
//! 4. Timeouts rotate without quarantine: the credential itself is not at fault
//! 5. Any other failure aborts immediately without touching the pool
//! 6. Quarantined credentials return automatically once their cooldown passes

pub mod classify;
pub mod error;
pub mod invoker;
pub mod orchestrator;
pub mod pool;
pub mod record;
pub mod status;

pub use classify::{AttemptOutcome, classify_outcome, is_rate_limit};
pub use error::{Error, Result};
pub use invoker::{Invocation, Invoker, Strategy};
pub use orchestrator::{Budget, Completion, Orchestrator, RetryPolicy};
pub use pool::{DEFAULT_QUARANTINE, KeyPool, MAX_QUARANTINE, Rotation, SharedPool};
pub use record::CredentialRecord;
pub use status::{PoolStatus, RecordStatus};
