//! Provider families.
//!
//! A closed set: new vendors are added here and in the adapter factory,
//! never by branching on raw kind strings at call sites. Unknown kinds are
//! rejected at parse time, before any I/O happens.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported provider families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// `OpenAI` chat completions API.
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
    /// Google Gemini `generateContent` API.
    Google,
    /// Any `OpenAI`-compatible endpoint (requires an explicit base URL).
    Custom,
}

impl ProviderKind {
    /// Default base URL for known provider kinds.
    #[must_use]
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Anthropic => Some("https://api.anthropic.com/v1"),
            Self::Google => Some("https://generativelanguage.googleapis.com/v1beta"),
            Self::Custom => None,
        }
    }

    /// Default model for known provider kinds.
    #[must_use]
    pub fn default_model(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("gpt-4o-mini"),
            Self::Anthropic => Some("claude-3-5-sonnet-latest"),
            Self::Google => Some("gemini-1.5-pro"),
            Self::Custom => None,
        }
    }

    /// Stable string form used in storage and configuration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse failure for [`ProviderKind`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownProviderKind(pub String);

impl fmt::Display for UnknownProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown provider kind: {}", self.0)
    }
}

impl std::error::Error for UnknownProviderKind {}

impl FromStr for ProviderKind {
    type Err = UnknownProviderKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "google" | "gemini" => Ok(Self::Google),
            "custom" => Ok(Self::Custom),
            other => Err(UnknownProviderKind(other.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        for kind in [
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
            ProviderKind::Google,
            ProviderKind::Custom,
        ] {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn gemini_aliases_to_google() {
        assert_eq!(
            "gemini".parse::<ProviderKind>().unwrap(),
            ProviderKind::Google
        );
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = "llama".parse::<ProviderKind>().unwrap_err();
        assert_eq!(err, UnknownProviderKind("llama".into()));
    }

    #[test]
    fn custom_kind_has_no_defaults() {
        assert!(ProviderKind::Custom.default_base_url().is_none());
        assert!(ProviderKind::Custom.default_model().is_none());
    }
}
