//! Shared HTTP response handling for the vendor adapters.

use reqwest::Response;
use serde::Deserialize;

use crate::provider::AdapterError;

/// The error envelope all three vendors use, modulo field spelling.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map a non-success HTTP response to an [`AdapterError`].
///
/// Consumes the response body to extract the vendor's error message.
pub(crate) async fn error_from_response(response: Response) -> AdapterError {
    let status = response.status();
    let retry_after_ms = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs * 1_000);

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map_or_else(|_| body.trim().to_string(), |e| e.error.message);
    let message = if message.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        message
    };

    match status.as_u16() {
        401 | 403 => AdapterError::Auth { message },
        429 => AdapterError::RateLimited {
            retry_after_ms,
            message,
        },
        status_code => AdapterError::Api {
            status: status_code,
            message,
            retryable: status.is_server_error(),
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn respond(template: ResponseTemplate) -> AdapterError {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(template)
            .mount(&server)
            .await;
        let response = reqwest::get(server.uri()).await.unwrap();
        error_from_response(response).await
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth() {
        let err = respond(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({"error": {"message": "bad key"}})),
        )
        .await;
        match err {
            AdapterError::Auth { message } => assert_eq!(message, "bad key"),
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let err = respond(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "3")
                .set_body_string("too many requests"),
        )
        .await;
        match err {
            AdapterError::RateLimited { retry_after_ms, .. } => {
                assert_eq!(retry_after_ms, Some(3_000));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let err = respond(ResponseTemplate::new(503)).await;
        match err {
            AdapterError::Api {
                status, retryable, ..
            } => {
                assert_eq!(status, 503);
                assert!(retryable);
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_errors_are_not_retryable() {
        let err = respond(ResponseTemplate::new(400).set_body_string("bad request")).await;
        assert!(!err.is_retryable());
    }
}
