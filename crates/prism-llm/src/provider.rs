//! The provider adapter abstraction.
//!
//! Every vendor API (Anthropic, `OpenAI`, Google) is wrapped by an adapter
//! implementing [`ProviderAdapter`]. Adapters normalize the vendor's wire
//! format into a stream of [`StreamEvent`]s, so everything above this crate
//! sees one shape: zero or more `Delta` chunks, then exactly one `Done`.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use prism_core::events::StreamEvent;
use prism_core::kind::ProviderKind;
use prism_core::role::Role;

use crate::anthropic::AnthropicAdapter;
use crate::google::GoogleAdapter;
use crate::openai::OpenAiAdapter;

/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Boxed stream of normalized events returned by [`ProviderAdapter::stream`].
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Connection test budget.
const TEST_CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors that can occur during adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SSE stream parsing failed.
    #[error("SSE parse error: {message}")]
    SseParse {
        /// Error description.
        message: String,
    },

    /// Authentication failed (missing or invalid key).
    #[error("auth error: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// Rate limited by the provider.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Suggested retry delay in milliseconds, if the provider sent one.
        retry_after_ms: Option<u64>,
        /// Error description.
        message: String,
    },

    /// Provider returned an API error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Whether this error can be retried.
        retryable: bool,
    },

    /// Operation exceeded its time budget.
    #[error("timed out")]
    Timeout,

    /// Stream was cancelled.
    #[error("stream cancelled")]
    Cancelled,

    /// Secret store failure.
    #[error("secret store error: {0}")]
    Secret(String),

    /// Anything else.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl AdapterError {
    /// Whether retrying the same request could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
                    })
            }
            Self::RateLimited { .. } | Self::Timeout => true,
            Self::Api { retryable, .. } => *retryable,
            Self::SseParse { .. }
            | Self::Auth { .. }
            | Self::Cancelled
            | Self::Json(_)
            | Self::Secret(_)
            | Self::Other { .. } => false,
        }
    }

    /// Error category string for logs and events.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(_) => "network",
            Self::Json(_) | Self::SseParse { .. } => "parse",
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limit",
            Self::Api { .. } => "api",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Secret(_) => "secret",
            Self::Other { .. } => "unknown",
        }
    }
}

/// Fully resolved configuration for one adapter instance.
///
/// Defaults have already been applied: `base_url` and `model` are concrete,
/// and `api_key` is the raw key pulled from the secret store (never a
/// reference).
#[derive(Clone)]
pub struct ProviderConfig {
    /// Vendor family.
    pub kind: ProviderKind,
    /// API base URL, without a trailing slash.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Raw API key, if one is configured.
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    // Keys never reach logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One message in a completion request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

/// A normalized completion request, vendor-agnostic.
#[derive(Clone, Debug, Default)]
pub struct CompletionRequest {
    /// System prompt, mapped to the vendor's native mechanism.
    pub system_prompt: Option<String>,
    /// Conversation so far, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
}

impl CompletionRequest {
    /// A single-user-message request.
    #[must_use]
    pub fn user(prompt: &str) -> Self {
        Self {
            messages: vec![ChatMessage {
                role: Role::User,
                content: prompt.to_string(),
            }],
            ..Self::default()
        }
    }
}

/// A vendor API wrapped behind the normalized streaming interface.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Vendor family this adapter talks to.
    fn kind(&self) -> ProviderKind;

    /// Model the adapter is configured for.
    fn model(&self) -> &str;

    /// Stream a response. The returned stream yields zero or more
    /// [`StreamEvent::Delta`]s and terminates with exactly one
    /// [`StreamEvent::Done`]; failures surface as `Err` items.
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream>;

    /// Run a request to completion and return the concatenated text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut stream = self.stream(request).await?;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Delta { text: chunk } => text.push_str(&chunk),
                StreamEvent::Done => break,
            }
        }
        Ok(text)
    }
}

/// Build the adapter for a resolved provider configuration.
///
/// A closed-set factory: `Custom` providers speak the `OpenAI`-compatible
/// protocol against their configured base URL.
pub fn adapter_for(config: &ProviderConfig) -> Result<Box<dyn ProviderAdapter>> {
    if config.base_url.is_empty() {
        return Err(AdapterError::Other {
            message: "provider has no base URL".into(),
        });
    }
    Ok(match config.kind {
        ProviderKind::OpenAi | ProviderKind::Custom => {
            Box::new(OpenAiAdapter::new(config.clone()))
        }
        ProviderKind::Anthropic => Box::new(AnthropicAdapter::new(config.clone())),
        ProviderKind::Google => Box::new(GoogleAdapter::new(config.clone())),
    })
}

/// Check that an adapter can reach its backend and authenticate.
///
/// Sends a one-token request and waits for the first event, bounded at
/// 15 seconds; the deadline maps to [`AdapterError::Timeout`].
pub async fn test_connection(adapter: &dyn ProviderAdapter) -> Result<()> {
    let request = CompletionRequest {
        max_tokens: Some(1),
        ..CompletionRequest::user("ping")
    };
    let attempt = async {
        let mut stream = adapter.stream(&request).await?;
        match stream.next().await {
            Some(event) => event.map(|_| ()),
            None => Err(AdapterError::SseParse {
                message: "stream ended without a terminal event".into(),
            }),
        }
    };
    match tokio::time::timeout(TEST_CONNECTION_TIMEOUT, attempt).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
