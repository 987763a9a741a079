//! Caller identity as far as the gateway core needs it.
//!
//! Session management lives elsewhere; here we only distinguish anonymous
//! callers, holders of a configured access key, and bring-your-own-key callers
//! whose credential replaces the provider's for every attempt.

use crate::config::AuthConfig;
use crate::error::{GatewayError, Result};
use axum::http::HeaderMap;

/// Token prefix that marks an inline upstream credential.
pub const BYOK_PREFIX: &str = "BYOK:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthContext {
    Anonymous,
    AccessKey(String),
    Byok(String),
}

impl AuthContext {
    /// Read the caller's token from `Authorization: Bearer` or `x-api-key`.
    pub fn from_headers(headers: &HeaderMap, config: &AuthConfig) -> Result<Self> {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        if let Some(key) = token.and_then(|t| t.strip_prefix(BYOK_PREFIX)) {
            if !config.byok {
                return Err(GatewayError::unauthorized("Bring-your-own-key is disabled"));
            }
            return Ok(Self::Byok(key.to_string()));
        }

        if !config.enabled {
            return Ok(Self::Anonymous);
        }

        match token {
            Some(t) if config.access_keys.iter().any(|k| k == t) => Ok(Self::AccessKey(t.to_string())),
            Some(_) => Err(GatewayError::unauthorized("Invalid API key")),
            None => Err(GatewayError::unauthorized("Missing API key")),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::Anonymous)
    }

    /// Inline upstream credential, if the caller supplied one.
    pub fn byok(&self) -> Option<&str> {
        match self {
            Self::Byok(key) => Some(key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, v.parse().unwrap());
        }
        map
    }

    #[test]
    fn anonymous_when_auth_disabled() {
        let ctx = AuthContext::from_headers(&headers(&[]), &AuthConfig::default()).unwrap();
        assert_eq!(ctx, AuthContext::Anonymous);
    }

    #[test]
    fn byok_from_bearer_or_x_api_key() {
        let cfg = AuthConfig::default();
        let ctx =
            AuthContext::from_headers(&headers(&[("authorization", "Bearer BYOK:sk-1")]), &cfg).unwrap();
        assert_eq!(ctx.byok(), Some("sk-1"));

        let ctx = AuthContext::from_headers(&headers(&[("x-api-key", "BYOK:sk-2")]), &cfg).unwrap();
        assert_eq!(ctx, AuthContext::Byok("sk-2".to_string()));
    }

    #[test]
    fn access_keys_enforced_when_enabled() {
        let cfg = AuthConfig {
            enabled: true,
            access_keys: vec!["lmr-123".to_string()],
            byok: false,
        };
        let ok = AuthContext::from_headers(&headers(&[("authorization", "Bearer lmr-123")]), &cfg);
        assert_eq!(ok.unwrap(), AuthContext::AccessKey("lmr-123".to_string()));

        let bad = AuthContext::from_headers(&headers(&[("authorization", "Bearer nope")]), &cfg);
        assert!(matches!(bad, Err(GatewayError::Unauthorized { .. })));

        let byok = AuthContext::from_headers(&headers(&[("x-api-key", "BYOK:k")]), &cfg);
        assert!(byok.is_err());
    }
}
