//! Configuration and startup error types

use thiserror::Error;

/// Errors raised while loading configuration or credentials.
///
/// All variants are fatal at startup: the gateway refuses to serve without a
/// valid config and at least one credential.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No credentials configured: {0}")]
    MissingCredentials(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
