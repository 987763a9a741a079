//! Read-only catalog of configured models and providers.
//!
//! Provider entries never carry credentials; only the name of the environment
//! variable a key is read from is shown.

use crate::config::{GatewayConfig, ModelConfig, ProviderConfig};
use crate::providers::{ProviderKind, ProviderPreset};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry<'a> {
    pub id: &'a str,
    #[serde(flatten)]
    pub model: &'a ModelConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderEntry<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    /// Configured URL, or the preset default for the provider type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<&'a str>,
    pub responses: bool,
    pub streaming: bool,
}

impl<'a> ProviderEntry<'a> {
    fn new(id: &'a str, cfg: &'a ProviderConfig) -> Self {
        let preset = ProviderPreset::for_kind(cfg.kind);
        Self {
            id,
            kind: cfg.kind,
            base_url: cfg.base_url.as_deref().or(preset.map(|p| p.base_url)),
            api_key_env: cfg
                .api_key_env
                .as_deref()
                .or(preset.map(|p| p.default_api_key_env)),
            responses: cfg.responses,
            streaming: cfg.streaming,
        }
    }
}

/// All models, sorted by name.
pub fn list_models(config: &GatewayConfig) -> Vec<ModelEntry<'_>> {
    let mut models: Vec<_> = config
        .models
        .iter()
        .map(|(id, model)| ModelEntry { id, model })
        .collect();
    models.sort_by(|a, b| a.id.cmp(b.id));
    models
}

pub fn get_model<'a>(config: &'a GatewayConfig, id: &str) -> Option<ModelEntry<'a>> {
    config
        .models
        .get_key_value(id)
        .map(|(id, model)| ModelEntry { id, model })
}

/// All providers, sorted by name.
pub fn list_providers(config: &GatewayConfig) -> Vec<ProviderEntry<'_>> {
    let mut providers: Vec<_> = config
        .providers
        .iter()
        .map(|(id, cfg)| ProviderEntry::new(id, cfg))
        .collect();
    providers.sort_by(|a, b| a.id.cmp(b.id));
    providers
}

pub fn get_provider<'a>(config: &'a GatewayConfig, id: &str) -> Option<ProviderEntry<'a>> {
    config
        .providers
        .get_key_value(id)
        .map(|(id, cfg)| ProviderEntry::new(id, cfg))
}
