use crate::auth::AuthContext;
use crate::billing::Pricing;
use crate::error::{GatewayError, Result};
use crate::providers::{Provider, ProviderKind, ProviderPreset};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Model name that catches every otherwise unknown model for authenticated callers.
pub const WILDCARD_MODEL: &str = "*";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub responses_store: ResponsesStoreConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub logging: LoggingMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingMode {
    /// Full error detail in logs and response bodies.
    Dev,
    #[default]
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub access_keys: Vec<String>,
    #[serde(default = "default_true")]
    pub byok: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsesStoreConfig {
    #[serde(rename = "type", default)]
    pub kind: ResponsesStoreKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsesStoreKind {
    #[default]
    InMemory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_true")]
    pub responses: bool,
    #[serde(default = "default_true")]
    pub streaming: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Failover order.
    pub providers: Vec<ProviderBinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBinding {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            logging: LoggingMode::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            access_keys: Vec::new(),
            byok: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4222
}

fn default_true() -> bool {
    true
}

impl GatewayConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        let candidates = config_search_paths();
        for candidate in &candidates {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        Err(GatewayError::config(format!(
            "No config file found. Searched: {}",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Providers of kind `others` have no preset and must name their base URL.
    fn validate(&self) -> Result<()> {
        for (name, provider) in &self.providers {
            if provider.base_url.is_none() && ProviderPreset::for_kind(provider.kind).is_none() {
                return Err(GatewayError::config(format!(
                    "Provider '{name}' has type '{}' and no base_url",
                    provider.kind.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Resolve a configured provider into its per-attempt form. Returns `None`
    /// when the name is not in the registry.
    pub fn provider(&self, name: &str) -> Option<Provider> {
        let cfg = self.providers.get(name)?;
        let preset = ProviderPreset::for_kind(cfg.kind);

        let base_url = cfg
            .base_url
            .clone()
            .or_else(|| preset.map(|p| p.base_url.to_string()))?;

        let api_key = cfg
            .api_key
            .clone()
            .or_else(|| {
                cfg.api_key_env
                    .as_deref()
                    .or(preset.map(|p| p.default_api_key_env))
                    .and_then(|var| std::env::var(var).ok())
            })
            .unwrap_or_default();

        Some(Provider {
            name: name.to_string(),
            kind: cfg.kind,
            base_url,
            api_key,
            responses: cfg.responses,
            streaming: cfg.streaming,
        })
    }

    /// Resolve a requested model name to its ordered binding list.
    ///
    /// Authenticated callers may address a provider directly with
    /// `provider:model`, and fall back to the `*` wildcard entry.
    pub fn resolve_model(&self, model_name: &str, auth: &AuthContext) -> Option<ModelConfig> {
        let authenticated = auth.is_authenticated();

        if authenticated {
            if let Some((provider, model)) = model_name.split_once(':') {
                if self.providers.contains_key(provider) {
                    return Some(ModelConfig {
                        providers: vec![ProviderBinding {
                            provider: provider.to_string(),
                            model: model.to_string(),
                            pricing: None,
                            max_tokens: None,
                        }],
                    });
                }
            }
        }

        if let Some(model) = self.models.get(model_name) {
            return Some(model.clone());
        }

        if authenticated {
            if let Some(wildcard) = self.models.get(WILDCARD_MODEL) {
                return Some(ModelConfig {
                    providers: wildcard
                        .providers
                        .iter()
                        .map(|binding| ProviderBinding {
                            provider: binding.provider.clone(),
                            model: model_name.to_string(),
                            pricing: None,
                            max_tokens: None,
                        })
                        .collect(),
                });
            }
        }

        None
    }
}

/// Candidate config locations, in search order.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("llm-router.toml")];

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("llm-router").join("config.toml"));
    }
    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("llm-router").join("config.toml"));
        paths.push(home.join(".llm-router.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
