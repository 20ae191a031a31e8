//! Anthropic messages-API adapter.

use async_stream::stream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use prism_core::events::StreamEvent;
use prism_core::kind::ProviderKind;
use prism_core::role::Role;
use prism_core::text::truncate_str;

use crate::http::error_from_response;
use crate::provider::{
    AdapterError, ChunkStream, CompletionRequest, ProviderAdapter, ProviderConfig, Result,
};
use crate::sse::data_lines;

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The messages API requires `max_tokens`; used when the request omits it.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Adapter for the Anthropic messages API.
pub struct AnthropicAdapter {
    client: reqwest::Client,
    config: ProviderConfig,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

/// The subset of wire events the adapter reacts to; everything else
/// (`message_start`, `ping`, usage frames) falls into `Other`.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    ContentBlockDelta { delta: WireDelta },
    MessageStop,
    Error { error: WireError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct WireError {
    message: String,
}

impl AnthropicAdapter {
    /// Create an adapter from a resolved configuration.
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        let Some(api_key) = &self.config.api_key else {
            return Err(AdapterError::Auth {
                message: "no API key configured".into(),
            });
        };

        let messages = request
            .messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::Assistant => "assistant",
                    // The messages API has no system role; system text
                    // travels in the top-level `system` field.
                    Role::User | Role::System => "user",
                },
                content: &m.content,
            })
            .collect();
        let body = RequestBody {
            model: &self.config.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            stream: true,
            system: request.system_prompt.as_deref(),
            temperature: request.temperature,
        };

        debug!(model = %self.config.model, "anthropic stream request");
        let response = self
            .client
            .post(format!("{}/messages", self.config.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(AdapterError::Http)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let lines = data_lines(response.bytes_stream());
        let events = stream! {
            let mut lines = std::pin::pin!(lines);
            while let Some(line) = lines.next().await {
                let data = match line {
                    Ok(data) => data,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                match serde_json::from_str::<WireEvent>(&data) {
                    Ok(WireEvent::ContentBlockDelta { delta }) => {
                        if let Some(text) = delta.text {
                            if !text.is_empty() {
                                yield Ok(StreamEvent::Delta { text });
                            }
                        }
                    }
                    Ok(WireEvent::MessageStop) => break,
                    Ok(WireEvent::Error { error }) => {
                        yield Err(AdapterError::Api {
                            status: 200,
                            message: error.message,
                            retryable: false,
                        });
                        return;
                    }
                    Ok(WireEvent::Other) => {}
                    Err(e) => {
                        warn!(error = %e, preview = truncate_str(&data, 100), "unparseable anthropic event");
                    }
                }
            }
            yield Ok(StreamEvent::Done);
        };
        Ok(Box::pin(events))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base_url: String) -> AnthropicAdapter {
        AnthropicAdapter::new(ProviderConfig {
            kind: ProviderKind::Anthropic,
            base_url,
            model: "claude-3-5-sonnet-latest".into(),
            api_key: Some("sk-ant-test".into()),
        })
    }

    #[tokio::test]
    async fn streams_text_deltas_until_message_stop() {
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi \"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"there\"}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let adapter = adapter(server.uri());
        let text = adapter
            .complete(&CompletionRequest::user("hi"))
            .await
            .unwrap();
        assert_eq!(text, "Hi there");
    }

    #[tokio::test]
    async fn in_stream_error_event_surfaces() {
        let body = concat!(
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"par\"}}\n\n",
            "data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        );
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let adapter = adapter(server.uri());
        let mut stream = adapter.stream(&CompletionRequest::user("hi")).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, StreamEvent::Delta { text: "par".into() });
        let second = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(second, AdapterError::Api { .. }));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_io() {
        let adapter = AnthropicAdapter::new(ProviderConfig {
            kind: ProviderKind::Anthropic,
            base_url: "http://127.0.0.1:1".into(),
            model: "claude-3-5-sonnet-latest".into(),
            api_key: None,
        });
        let err = adapter
            .stream(&CompletionRequest::user("hi"))
            .await
            .err().unwrap();
        assert!(matches!(err, AdapterError::Auth { .. }));
    }
}
