//! Shared types for the chat gateway workspace
//!
//! `Secret` wraps API credentials so they never reach logs in full, and
//! `Error` covers configuration loading failures that are fatal at startup.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
