//! Upstream text-generation abstraction
//!
//! Defines the `Generator` trait that decouples the retry/rotation core from
//! the concrete generative-text API. `GeminiGenerator` talks to the Gemini
//! `generateContent` REST endpoint; tests substitute scripted generators.
//!
//! The credential is handed to every call rather than configured globally, so
//! a rotation between attempts can never leak into a call already in flight.

pub mod gemini;

pub use gemini::GeminiGenerator;

use common::Secret;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Sampling parameters forwarded to the upstream model.
///
/// Opaque to the rotation core: it is carried through unchanged on every attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// One logical generation request: the prompt text plus its generation config.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub config: GenerationConfig,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, config: GenerationConfig) -> Self {
        Self {
            prompt: prompt.into(),
            config,
        }
    }
}

/// Text produced by the upstream model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
}

/// Raw upstream failures. No interpretation happens here: deciding whether a
/// failure is a rate limit is the orchestrator's job.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("upstream API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse upstream response: {0}")]
    Parse(String),

    #[error("internal upstream error: {0}")]
    Internal(String),
}

/// Result alias for upstream operations.
pub type Result<T> = std::result::Result<T, UpstreamError>;

/// Boxed, `'static` future returned by `Generator::generate`.
///
/// `'static` + `Send` so the invoker can move the call onto a task or thread
/// it does not own and abandon it on timeout.
pub type GenerateFuture = Pin<Box<dyn Future<Output = Result<Generation>> + Send + 'static>>;

/// Abstraction over a generative-text backend.
pub trait Generator: Send + Sync {
    /// Identifier for logging (e.g. "gemini")
    fn id(&self) -> &str;

    /// Model identifier sent with each request
    fn model(&self) -> &str;

    /// Build one upstream call authorized by `api_key`.
    ///
    /// The returned future owns everything it needs; dropping it mid-flight
    /// must be safe.
    fn generate(&self, api_key: Secret<String>, request: GenerateRequest) -> GenerateFuture;
}
