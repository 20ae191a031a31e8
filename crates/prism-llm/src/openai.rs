//! `OpenAI` chat-completions adapter.
//!
//! Also serves `Custom` providers: any `OpenAI`-compatible endpoint is a
//! base-URL swap away, which is how local runtimes (Ollama, llama.cpp,
//! vLLM) expose themselves.

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

/// Adapter for the `OpenAI` chat completions API and compatible endpoints.
pub struct OpenAiAdapter {
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
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

impl OpenAiAdapter {
    /// Create an adapter from a resolved configuration.
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn wire_messages<'a>(request: &'a CompletionRequest) -> Vec<WireMessage<'a>> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_prompt {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        for message in &request.messages {
            messages.push(WireMessage {
                role: match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                },
                content: &message.content,
            });
        }
        messages
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        self.config.kind
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        // Custom endpoints (local runtimes) may legitimately run keyless;
        // the hosted API never does.
        if self.config.api_key.is_none() && self.config.kind == ProviderKind::OpenAi {
            return Err(AdapterError::Auth {
                message: "no API key configured".into(),
            });
        }

        let url = format!("{}/chat/completions", self.config.base_url);
        let body = RequestBody {
            model: &self.config.model,
            messages: Self::wire_messages(request),
            stream: true,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        debug!(model = %self.config.model, "openai stream request");
        let response = builder.send().await.map_err(AdapterError::Http)?;
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
                let chunk: StreamChunk = match serde_json::from_str(&data) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(error = %e, preview = truncate_str(&data, 100), "unparseable openai chunk");
                        continue;
                    }
                };
                if let Some(text) = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                {
                    if !text.is_empty() {
                        yield Ok(StreamEvent::Delta { text });
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
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base_url: String, api_key: Option<&str>) -> OpenAiAdapter {
        OpenAiAdapter::new(ProviderConfig {
            kind: ProviderKind::OpenAi,
            base_url,
            model: "gpt-4o-mini".into(),
            api_key: api_key.map(String::from),
        })
    }

    fn sse_body(chunks: &[&str]) -> String {
        let mut body = String::new();
        for chunk in chunks {
            body.push_str("data: ");
            body.push_str(chunk);
            body.push_str("\n\n");
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[tokio::test]
    async fn streams_deltas_then_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "stream": true,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse_body(&[
                r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
                r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
                r#"{"choices":[{"delta":{"content":"lo"}}]}"#,
            ])))
            .mount(&server)
            .await;

        let adapter = adapter(server.uri(), Some("sk-test"));
        let text = adapter
            .complete(&CompletionRequest::user("hi"))
            .await
            .unwrap();
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn invalid_key_maps_to_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                serde_json::json!({"error": {"message": "Incorrect API key provided"}}),
            ))
            .mount(&server)
            .await;

        let adapter = adapter(server.uri(), Some("sk-bad"));
        let err = adapter
            .stream(&CompletionRequest::user("hi"))
            .await
            .err().unwrap();
        assert!(matches!(err, AdapterError::Auth { .. }));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_io() {
        let adapter = adapter("http://127.0.0.1:1".into(), None);
        let err = adapter
            .stream(&CompletionRequest::user("hi"))
            .await
            .err().unwrap();
        assert!(matches!(err, AdapterError::Auth { .. }));
    }

    #[tokio::test]
    async fn custom_kind_allows_keyless_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse_body(&[
                r#"{"choices":[{"delta":{"content":"ok"}}]}"#,
            ])))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new(ProviderConfig {
            kind: ProviderKind::Custom,
            base_url: server.uri(),
            model: "llama3".into(),
            api_key: None,
        });
        let text = adapter
            .complete(&CompletionRequest::user("hi"))
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn unparseable_chunks_are_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse_body(&[
                "not json at all",
                r#"{"choices":[{"delta":{"content":"fine"}}]}"#,
            ])))
            .mount(&server)
            .await;

        let adapter = adapter(server.uri(), Some("sk-test"));
        let text = adapter
            .complete(&CompletionRequest::user("hi"))
            .await
            .unwrap();
        assert_eq!(text, "fine");
    }
}
