//! Request-level errors and their HTTP mapping
//!
//! Each terminal pool outcome gets its own status and `type` so operators can
//! tell a self-healing quota condition from a dead upstream.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Pool(#[from] key_pool::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Pool(err) => match err {
                key_pool::Error::RateLimitExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
                key_pool::Error::TimeoutExhausted { .. } => StatusCode::GATEWAY_TIMEOUT,
                key_pool::Error::PoolExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
                key_pool::Error::Upstream(_) => StatusCode::BAD_GATEWAY,
                key_pool::Error::Configuration(_) | key_pool::Error::InvalidIndex { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Value of the `type` field, also used as the metrics outcome label.
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Pool(key_pool::Error::Configuration(_))
            | ApiError::Pool(key_pool::Error::InvalidIndex { .. }) => "internal_error",
            ApiError::Pool(err) => err.kind(),
        }
    }

    /// Operator-facing message.
    pub fn message(&self) -> String {
        match self {
            ApiError::Pool(key_pool::Error::RateLimitExhausted { attempts, detail }) => format!(
                "rate limited on every attempt ({attempts}); quotas recover automatically, retry later. last error: {detail}"
            ),
            ApiError::Pool(key_pool::Error::TimeoutExhausted { attempts, timeout }) => format!(
                "upstream did not answer within {}s on {attempts} attempt(s)",
                timeout.as_secs()
            ),
            ApiError::Pool(key_pool::Error::PoolExhausted(summary)) => {
                format!("all credentials are blocked: {summary}")
            }
            ApiError::Pool(key_pool::Error::Upstream(detail)) => {
                format!("upstream rejected the request: {detail}")
            }
            other => other.to_string(),
        }
    }

    /// JSON body: {"error":{"type":"...","message":"...","request_id":"req_..."}}
    pub fn into_response_with_id(self, request_id: &str) -> Response {
        let body = serde_json::json!({
            "error": {
                "type": self.error_type(),
                "message": self.message(),
                "request_id": request_id,
            }
        });
        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pool(err: key_pool::Error) -> ApiError {
        ApiError::Pool(err)
    }

    #[test]
    fn terminal_pool_errors_map_to_distinct_statuses() {
        let cases = [
            (
                pool(key_pool::Error::RateLimitExhausted {
                    attempts: 3,
                    detail: "429".into(),
                }),
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
            ),
            (
                pool(key_pool::Error::TimeoutExhausted {
                    attempts: 2,
                    timeout: Duration::from_secs(10),
                }),
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
            ),
            (
                pool(key_pool::Error::PoolExhausted("all 2 credentials blocked".into())),
                StatusCode::SERVICE_UNAVAILABLE,
                "pool_exhausted",
            ),
            (
                pool(key_pool::Error::Upstream("API key not valid".into())),
                StatusCode::BAD_GATEWAY,
                "upstream_error",
            ),
            (
                ApiError::InvalidRequest("prompt must not be empty".into()),
                StatusCode::BAD_REQUEST,
                "invalid_request",
            ),
            (
                pool(key_pool::Error::Configuration("empty".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
            ),
        ];

        for (err, status, error_type) in cases {
            assert_eq!(err.status(), status, "{err:?}");
            assert_eq!(err.error_type(), error_type, "{err:?}");
        }
    }

    #[test]
    fn rate_limit_message_says_it_self_heals_and_keeps_detail() {
        let message = pool(key_pool::Error::RateLimitExhausted {
            attempts: 3,
            detail: "upstream API error 429: quota".into(),
        })
        .message();
        assert!(message.contains("recover automatically"));
        assert!(message.contains("upstream API error 429: quota"));
    }

    #[test]
    fn timeout_message_names_deadline() {
        let message = pool(key_pool::Error::TimeoutExhausted {
            attempts: 2,
            timeout: Duration::from_secs(10),
        })
        .message();
        assert_eq!(message, "upstream did not answer within 10s on 2 attempt(s)");
    }

    #[tokio::test]
    async fn response_body_has_type_message_and_request_id() {
        let response = pool(key_pool::Error::PoolExhausted("none left".into()))
            .into_response_with_id("req_abc");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/json"
        );

        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "pool_exhausted");
        assert_eq!(json["error"]["request_id"], "req_abc");
        assert!(
            json["error"]["message"]
                .as_str()
                .unwrap()
                .contains("none left")
        );
    }
}
