//! `/v1/generate` request handling
//!
//! Parses the inbound JSON, applies per-request budget overrides, and runs the
//! request through the orchestrator. Every terminal outcome is rendered with
//! the shared error body and counted under its outcome label.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use key_pool::{Budget, Orchestrator};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use upstream::{GenerateRequest, GenerationConfig};

use crate::error::ApiError;
use crate::metrics;

/// Cap on client-requested retries.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Cap on client-requested per-attempt deadline.
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared state for the generate handler
#[derive(Clone)]
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
    pub defaults: Budget,
}

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub prompt: String,
    #[serde(default)]
    pub generation_config: GenerationConfig,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub text: String,
    pub credential: String,
    pub attempts: u32,
    pub request_id: String,
}

impl GenerateBody {
    /// Validate and split into the upstream request and its budget.
    fn into_parts(self, defaults: Budget) -> Result<(GenerateRequest, Budget), ApiError> {
        if self.prompt.trim().is_empty() {
            return Err(ApiError::InvalidRequest("prompt must not be empty".into()));
        }
        let max_retries = self.max_retries.unwrap_or(defaults.max_retries);
        if max_retries > MAX_RETRIES_LIMIT {
            return Err(ApiError::InvalidRequest(format!(
                "max_retries must be at most {MAX_RETRIES_LIMIT}"
            )));
        }
        let timeout = match self.timeout_secs {
            None => defaults.timeout,
            Some(0) => {
                return Err(ApiError::InvalidRequest(
                    "timeout_secs must be greater than 0".into(),
                ));
            }
            Some(secs) if secs > MAX_TIMEOUT_SECS => {
                return Err(ApiError::InvalidRequest(format!(
                    "timeout_secs must be at most {MAX_TIMEOUT_SECS}"
                )));
            }
            Some(secs) => Duration::from_secs(secs),
        };

        Ok((
            GenerateRequest::new(self.prompt, self.generation_config),
            Budget {
                max_retries,
                timeout,
            },
        ))
    }
}

/// Run one generation request end to end.
#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn generate(state: &GatewayState, body: &[u8], request_id: String) -> Response {
    let started = std::time::Instant::now();

    let result = run(state, body).await;
    let outcome = match &result {
        Ok(_) => "success",
        Err(err) => err.error_type(),
    };
    metrics::record_request(outcome, started.elapsed().as_secs_f64());

    match result {
        Ok(completion) => {
            info!(
                credential = %completion.credential,
                attempts = completion.attempts,
                duration_ms = started.elapsed().as_millis() as u64,
                "request completed"
            );
            let response = GenerateResponse {
                text: completion.value.text,
                credential: completion.credential,
                attempts: completion.attempts,
                request_id,
            };
            (StatusCode::OK, axum::Json(response)).into_response()
        }
        Err(err) => {
            warn!(error_type = err.error_type(), error = %err, "request failed");
            err.into_response_with_id(&request_id)
        }
    }
}

async fn run(
    state: &GatewayState,
    body: &[u8],
) -> Result<key_pool::Completion<upstream::Generation>, ApiError> {
    let body: GenerateBody = serde_json::from_slice(body)
        .map_err(|e| ApiError::InvalidRequest(format!("malformed JSON body: {e}")))?;
    let (request, budget) = body.into_parts(state.defaults)?;
    Ok(state.orchestrator.execute(&request, budget).await?)
}
