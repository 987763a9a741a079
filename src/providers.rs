//! Provider kinds and their built-in presets.
//!
//! The set of provider kinds is closed. Any `type` string the gateway does not
//! know deserializes to [`ProviderKind::Others`], which every adapter factory
//! routes to its generic OpenAI-compatible variant.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Fireworks,
    Anthropic,
    Google,
    #[serde(other)]
    Others,
}

/// Defaults for a provider kind, used when the config omits them.
#[derive(Debug, Clone)]
pub struct ProviderPreset {
    pub kind: ProviderKind,
    pub base_url: &'static str,
    pub default_api_key_env: &'static str,
}

const PRESETS: &[ProviderPreset] = &[
    ProviderPreset {
        kind: ProviderKind::OpenAi,
        base_url: "https://api.openai.com/v1",
        default_api_key_env: "OPENAI_API_KEY",
    },
    ProviderPreset {
        kind: ProviderKind::Fireworks,
        base_url: "https://api.fireworks.ai/inference/v1",
        default_api_key_env: "FIREWORKS_API_KEY",
    },
    ProviderPreset {
        kind: ProviderKind::Anthropic,
        base_url: "https://api.anthropic.com",
        default_api_key_env: "ANTHROPIC_API_KEY",
    },
    ProviderPreset {
        kind: ProviderKind::Google,
        base_url: "https://generativelanguage.googleapis.com/v1beta",
        default_api_key_env: "GEMINI_API_KEY",
    },
];

impl ProviderPreset {
    /// `Others` has no preset: such providers must configure a base URL.
    #[must_use]
    pub fn for_kind(kind: ProviderKind) -> Option<&'static ProviderPreset> {
        PRESETS.iter().find(|p| p.kind == kind)
    }
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Fireworks => "fireworks",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
            ProviderKind::Others => "others",
        }
    }
}

/// A provider as seen by adapters for one attempt: resolved base URL and
/// credential, plus capability flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: String,
    /// Provider implements the multi-turn `/responses` endpoint natively.
    pub responses: bool,
    /// Provider accepts streaming requests.
    pub streaming: bool,
}

impl Provider {
    /// Join a path onto the base URL without doubling slashes.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Copy of this provider with the credential replaced, for bring-your-own-key calls.
    #[must_use]
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..self.clone()
        }
    }
}
