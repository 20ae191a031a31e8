//! # prism-llm
//!
//! Provider adapters for the Prism launcher. Each vendor API (Anthropic,
//! `OpenAI`, Google Gemini, and any `OpenAI`-compatible endpoint) is wrapped
//! behind [`provider::ProviderAdapter`], which normalizes the vendor's wire
//! format into one stream shape: zero or more text deltas, then a single
//! terminal event.
//!
//! API keys never touch this crate's configuration types by reference; the
//! [`secrets::SecretStore`] boundary resolves them at dispatch time.

#![deny(unsafe_code)]

pub mod anthropic;
pub mod google;
mod http;
pub mod openai;
pub mod provider;
pub mod secrets;
pub mod sse;

pub use provider::{
    AdapterError, ChatMessage, ChunkStream, CompletionRequest, ProviderAdapter, ProviderConfig,
    Result, adapter_for, test_connection,
};
pub use secrets::{MemorySecretStore, SecretStore};
