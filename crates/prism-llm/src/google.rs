//! Google Gemini adapter (`streamGenerateContent` over SSE).

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

/// Adapter for the Gemini `generateContent` API.
pub struct GoogleAdapter {
    client: reqwest::Client,
    config: ProviderConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GoogleAdapter {
    /// Create an adapter from a resolved configuration.
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn build_body<'a>(request: &'a CompletionRequest) -> RequestBody<'a> {
        let contents = request
            .messages
            .iter()
            .map(|m| Content {
                role: Some(match m.role {
                    Role::Assistant => "model",
                    Role::User | Role::System => "user",
                }),
                parts: vec![Part { text: &m.content }],
            })
            .collect();
        let generation_config =
            if request.max_tokens.is_some() || request.temperature.is_some() {
                Some(GenerationConfig {
                    max_output_tokens: request.max_tokens,
                    temperature: request.temperature,
                })
            } else {
                None
            };
        RequestBody {
            contents,
            system_instruction: request.system_prompt.as_deref().map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            generation_config,
        }
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
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

        // The key goes in a header, not the query string, so it can never
        // leak through request logging.
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url, self.config.model
        );
        debug!(model = %self.config.model, "google stream request");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&Self::build_body(request))
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
                let chunk: StreamChunk = match serde_json::from_str(&data) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(error = %e, preview = truncate_str(&data, 100), "unparseable gemini chunk");
                        continue;
                    }
                };
                for candidate in chunk.candidates {
                    let Some(content) = candidate.content else { continue };
                    for part in content.parts {
                        if let Some(text) = part.text {
                            if !text.is_empty() {
                                yield Ok(StreamEvent::Delta { text });
                            }
                        }
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
