//! Error types for the gateway.

use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Upstream returned status {status}: {message}")]
    Upstream {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error("Provider '{provider}' does not support {capability}")]
    Unsupported {
        provider: String,
        capability: &'static str,
    },

    #[error("Translation error: {message}")]
    Translation { message: String },

    #[error("Responses store error: {message}")]
    Store { message: String },

    #[error("All providers failed to complete the request")]
    Exhausted,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl GatewayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest {
            message: msg.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: msg.into(),
        }
    }

    pub fn translation(msg: impl Into<String>) -> Self {
        Self::Translation {
            message: msg.into(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store {
            message: msg.into(),
        }
    }

    pub fn unsupported(provider: impl Into<String>, capability: &'static str) -> Self {
        Self::Unsupported {
            provider: provider.into(),
            capability,
        }
    }

    /// Build an upstream error from a non-success status and the raw body.
    /// JSON bodies are kept so the caller can surface the provider's own error object.
    pub fn upstream(status: u16, raw_body: &str) -> Self {
        let body = serde_json::from_str::<Value>(raw_body).ok();
        let message = body
            .as_ref()
            .and_then(upstream_message)
            .unwrap_or_else(|| {
                if raw_body.trim().is_empty() {
                    format!("Provider returned status {status}")
                } else {
                    truncate(raw_body.trim(), 500).to_string()
                }
            });
        Self::Upstream {
            status,
            message,
            body,
        }
    }

    /// HTTP status this error maps to when surfaced to the caller.
    pub fn status(&self) -> u16 {
        match self {
            Self::ModelNotFound { .. } => 404,
            Self::Unauthorized { .. } => 401,
            Self::BadRequest { .. } | Self::Json(_) => 400,
            Self::Upstream { status, .. } => *status,
            Self::Http(e) => e.status().map_or(502, |s| s.as_u16()),
            _ => 500,
        }
    }

    /// Normalized `(status, message)`, most upstream-specific message first.
    pub fn normalized(&self) -> (u16, String) {
        let message = match self {
            Self::Upstream { body, message, .. } => body
                .as_ref()
                .and_then(upstream_message)
                .unwrap_or_else(|| message.clone()),
            other => other.to_string(),
        };
        (self.status(), message)
    }

    /// The `error` object returned to clients: the upstream's own error object when
    /// it sent one, otherwise `{"message": ...}`.
    pub fn error_object(&self) -> Value {
        if let Self::Upstream {
            body: Some(body), ..
        } = self
        {
            if let Some(err) = body.get("error").filter(|e| e.is_object()) {
                return err.clone();
            }
            if body.get("message").is_some() {
                return body.clone();
            }
        }
        json!({ "message": self.normalized().1 })
    }
}

/// Priority-ordered message extraction from an upstream error payload.
fn upstream_message(body: &Value) -> Option<String> {
    body.pointer("/error/message")
        .or_else(|| body.get("message"))
        .or_else(|| body.get("error").filter(|e| e.is_string()))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_prefers_nested_error_message() {
        let err = GatewayError::upstream(
            429,
            r#"{"error":{"message":"slow down","type":"rate_limit_error"},"message":"outer"}"#,
        );
        assert_eq!(err.normalized(), (429, "slow down".to_string()));
        assert_eq!(err.error_object()["type"], "rate_limit_error");
    }

    #[test]
    fn upstream_falls_back_to_top_level_message_then_text() {
        let err = GatewayError::upstream(400, r#"{"message":"bad field"}"#);
        assert_eq!(err.normalized().1, "bad field");

        let err = GatewayError::upstream(502, "gateway timeout");
        assert_eq!(err.normalized(), (502, "gateway timeout".to_string()));
        assert_eq!(err.error_object(), json!({"message": "gateway timeout"}));
    }

    #[test]
    fn exhausted_is_generic_500() {
        let (status, message) = GatewayError::Exhausted.normalized();
        assert_eq!(status, 500);
        assert_eq!(message, "All providers failed to complete the request");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
