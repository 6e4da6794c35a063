//! Gemini `generateContent` client
//!
//! Thin REST binding: one POST per call, the API key in the `x-goog-api-key`
//! header, the response text taken from the first candidate. Non-2xx responses
//! become `UpstreamError::Api` with the HTTP status and the upstream message,
//! so quota errors keep their "429" / "quota" wording for classification.

use crate::{GenerateFuture, GenerateRequest, Generation, Generator, UpstreamError};
use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Public Gemini REST base URL.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when the config does not name one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini-backed `Generator`.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

impl Generator for GeminiGenerator {
    fn id(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, api_key: Secret<String>, request: GenerateRequest) -> GenerateFuture {
        let client = self.client.clone();
        let url = self.endpoint();
        let body = WireRequest::from(&request);

        Box::pin(async move {
            debug!(url = %url, key = %api_key.masked(), "calling generateContent");
            let response = client
                .post(&url)
                .header(API_KEY_HEADER, api_key.expose().as_str())
                .json(&body)
                .send()
                .await
                .map_err(|e| UpstreamError::Http(e.to_string()))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| UpstreamError::Http(e.to_string()))?;

            if !status.is_success() {
                return Err(UpstreamError::Api {
                    status: status.as_u16(),
                    message: error_message(&text),
                });
            }

            parse_generation(&text)
        })
    }
}

/// Extract the human-readable message from a Gemini error body.
///
/// Gemini errors look like `{"error":{"code":429,"message":"...","status":"RESOURCE_EXHAUSTED"}}`.
/// The status string is kept alongside the message; bodies that are not JSON
/// are returned verbatim.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<WireErrorBody>(body) {
        Ok(parsed) => match parsed.error.status {
            Some(status) => format!("{} ({status})", parsed.error.message),
            None => parsed.error.message,
        },
        Err(_) => body.trim().to_string(),
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_generation(body: &str) -> crate::Result<Generation> {
    let parsed: WireResponse =
        serde_json::from_str(body).map_err(|e| UpstreamError::Parse(e.to_string()))?;

    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| UpstreamError::Parse("response contained no candidates".into()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(UpstreamError::Parse(format!(
            "candidate has no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(Generation { text })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

impl From<&GenerateRequest> for WireRequest {
    fn from(request: &GenerateRequest) -> Self {
        let config = &request.config;
        let generation_config =
            if config.temperature.is_none() && config.max_output_tokens.is_none() {
                None
            } else {
                Some(WireGenerationConfig {
                    temperature: config.temperature,
                    max_output_tokens: config.max_output_tokens,
                })
            };
        Self {
            contents: vec![WireContent {
                role: Some("user".into()),
                parts: vec![WirePart {
                    text: Some(request.prompt.clone()),
                }],
            }],
            generation_config,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
    #[serde(default)]
    status: Option<String>,
}
