//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! API keys never live in the main TOML: they come from the GEMINI_API_KEYS
//! env var or from a separate secrets file named by `pool.credentials_file`.

use common::Secret;
use key_pool::{Budget, CredentialRecord, MAX_QUARANTINE, RetryPolicy};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var holding `name=key` pairs, comma separated.
pub const CREDENTIALS_ENV: &str = "GEMINI_API_KEYS";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Resolved at load time from env or the secrets file.
    #[serde(skip)]
    pub credentials: Vec<Credential>,
}

/// Inbound HTTP settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Upstream model and per-request attempt budget
#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Deadline for a single attempt.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Credential pool settings
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_quarantine_minutes")]
    pub quarantine_minutes: u64,
    /// Secrets file with `[google] api_keys = [{ key, name }]`
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            quarantine_minutes: default_quarantine_minutes(),
            credentials_file: None,
        }
    }
}

/// Pauses between attempts
#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_timeout_pause_ms")]
    pub timeout_pause_ms: u64,
    #[serde(default = "default_jitter_min_ms")]
    pub jitter_min_ms: u64,
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,
    #[serde(default)]
    pub retry_same_credential_on_timeout: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_pause_ms: default_timeout_pause_ms(),
            jitter_min_ms: default_jitter_min_ms(),
            jitter_max_ms: default_jitter_max_ms(),
            retry_same_credential_on_timeout: false,
        }
    }
}

/// One named API key
#[derive(Debug, Clone)]
pub struct Credential {
    pub name: String,
    pub key: Secret<String>,
}

/// Secrets file layout
#[derive(Debug, Deserialize)]
struct SecretsFile {
    google: GoogleSecrets,
}

#[derive(Debug, Deserialize)]
struct GoogleSecrets {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiKeyEntry {
    key: String,
    #[serde(default)]
    name: Option<String>,
}

fn default_max_connections() -> usize {
    256
}

fn default_base_url() -> String {
    upstream::gemini::GEMINI_API_BASE.to_string()
}

fn default_model() -> String {
    upstream::gemini::DEFAULT_MODEL.to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_quarantine_minutes() -> u64 {
    60
}

fn default_timeout_pause_ms() -> u64 {
    500
}

fn default_jitter_min_ms() -> u64 {
    1000
}

fn default_jitter_max_ms() -> u64 {
    3000
}

impl Config {
    /// Load configuration from a TOML file, then resolve credentials.
    ///
    /// Credential resolution order:
    /// 1. GEMINI_API_KEYS env var
    /// 2. credentials_file path from config
    ///
    /// An empty result is not an error here; see `credential_records`.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        match std::env::var(CREDENTIALS_ENV) {
            Ok(value) if !value.trim().is_empty() => {
                config.credentials = parse_env_credentials(&value)?;
            }
            _ => {
                if let Some(ref file) = config.pool.credentials_file {
                    config.credentials = load_credentials_file(file)?;
                }
            }
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.upstream.base_url.starts_with("http://")
            && !self.upstream.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.upstream.base_url
            )));
        }
        if self.upstream.model.trim().is_empty() {
            return Err(common::Error::Config("model must not be empty".into()));
        }
        if self.upstream.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.pool.quarantine_minutes == 0 {
            return Err(common::Error::Config(
                "quarantine_minutes must be greater than 0".into(),
            ));
        }
        let max_quarantine_minutes = MAX_QUARANTINE.as_secs() / 60;
        if self.pool.quarantine_minutes > max_quarantine_minutes {
            return Err(common::Error::Config(format!(
                "quarantine_minutes must be at most {max_quarantine_minutes}, got {}",
                self.pool.quarantine_minutes
            )));
        }
        if self.retry.jitter_min_ms > self.retry.jitter_max_ms {
            return Err(common::Error::Config(format!(
                "jitter_min_ms ({}) must not exceed jitter_max_ms ({})",
                self.retry.jitter_min_ms, self.retry.jitter_max_ms
            )));
        }
        Ok(())
    }

    /// Build pool records from the resolved credentials. Fails when none were
    /// configured: the gateway cannot serve without at least one key.
    pub fn credential_records(&self) -> common::Result<Vec<CredentialRecord>> {
        if self.credentials.is_empty() {
            return Err(common::Error::MissingCredentials(format!(
                "set {CREDENTIALS_ENV} or pool.credentials_file"
            )));
        }
        Ok(self
            .credentials
            .iter()
            .map(|c| CredentialRecord::new(c.name.clone(), c.key.expose().clone()))
            .collect())
    }

    /// Default attempt budget for requests that do not override it.
    pub fn budget(&self) -> Budget {
        Budget {
            max_retries: self.upstream.max_retries,
            timeout: Duration::from_secs(self.upstream.timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout_pause: Duration::from_millis(self.retry.timeout_pause_ms),
            jitter_min: Duration::from_millis(self.retry.jitter_min_ms),
            jitter_max: Duration::from_millis(self.retry.jitter_max_ms),
            retry_same_credential_on_timeout: self.retry.retry_same_credential_on_timeout,
        }
    }

    pub fn quarantine(&self) -> Duration {
        Duration::from_secs(self.pool.quarantine_minutes * 60)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("chat-gateway.toml")
    }
}

/// Parse `name=key,name=key`. A bare key is named by its 1-based position.
fn parse_env_credentials(value: &str) -> common::Result<Vec<Credential>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .enumerate()
        .map(|(i, entry)| {
            let (name, key) = match entry.split_once('=') {
                Some((name, key)) => (name.trim().to_string(), key.trim()),
                None => (String::new(), entry),
            };
            build_credential(i, name, key, CREDENTIALS_ENV)
        })
        .collect()
}

fn load_credentials_file(path: &Path) -> common::Result<Vec<Credential>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        common::Error::Config(format!(
            "failed to read credentials_file {}: {e}",
            path.display()
        ))
    })?;
    let secrets: SecretsFile = toml::from_str(&contents)?;
    secrets
        .google
        .api_keys
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            build_credential(
                i,
                entry.name.unwrap_or_default(),
                entry.key.trim(),
                &path.display().to_string(),
            )
        })
        .collect()
}

fn build_credential(
    index: usize,
    name: String,
    key: &str,
    source: &str,
) -> common::Result<Credential> {
    if key.is_empty() {
        return Err(common::Error::Config(format!(
            "credential #{} in {source} has an empty key",
            index + 1
        )));
    }
    let name = if name.trim().is_empty() {
        format!("key-{}", index + 1)
    } else {
        name.trim().to_string()
    };
    Ok(Credential {
        name,
        key: Secret::new(key.to_string()),
    })
}
