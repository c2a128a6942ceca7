//! The model-calling collaborator.
//!
//! The engine is provider-agnostic: it only needs something that turns a
//! [`ModelRequest`] into a JSON-shaped reply. [`ModelCaller`] returns a
//! boxed future so it stays dyn-compatible and the runner can hold
//! `&dyn ModelCaller`. [`OpenRouterCaller`] is the bundled HTTP
//! implementation; tests script their own.

mod openrouter;

pub use openrouter::{ChatRequest, Message, MessageRole, OPENROUTER_URL, OpenRouterCaller};

use crate::error::ProviderError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Key in an API-key map used when no provider-specific key exists.
pub const DEFAULT_KEY: &str = "default";

/// Future returned by [`ModelCaller::call`].
pub type ModelFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ProviderError>> + Send + 'a>>;

/// One request to a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub user_prompt: String,
    pub system_prompt: String,
    pub model_id: String,
    pub api_key: Option<String>,
    /// Ask the provider for a JSON object reply.
    pub expect_json: bool,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ModelRequest {
    pub fn new(
        model_id: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            system_prompt: system_prompt.into(),
            model_id: model_id.into(),
            api_key: None,
            expect_json: false,
            max_tokens: 0,
            temperature: 0.0,
        }
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn with_json(mut self, expect_json: bool) -> Self {
        self.expect_json = expect_json;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Something that can answer a [`ModelRequest`].
///
/// Implementations must return [`ProviderError::Cancelled`] promptly once
/// `cancel` fires.
pub trait ModelCaller: Send + Sync {
    fn call<'a>(&'a self, request: ModelRequest, cancel: &'a CancellationToken) -> ModelFuture<'a>;
}

/// Provider prefix of a model id: `openai/gpt-4o` -> `openai`.
pub fn provider_of(model_id: &str) -> Option<&str> {
    model_id.split_once('/').map(|(p, _)| p).filter(|p| !p.is_empty())
}

/// Pick the key for `model_id`: provider-specific first, then `default`.
pub fn resolve_api_key(keys: &BTreeMap<String, String>, model_id: &str) -> Option<String> {
    provider_of(model_id)
        .and_then(|p| keys.get(p))
        .or_else(|| keys.get(DEFAULT_KEY))
        .filter(|k| !k.trim().is_empty())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("openai".to_string(), "sk-openai".to_string()),
            ("default".to_string(), "sk-default".to_string()),
        ])
    }

    #[test]
    fn provider_prefix() {
        assert_eq!(provider_of("openai/gpt-4o"), Some("openai"));
        assert_eq!(provider_of("gpt-4o"), None);
        assert_eq!(provider_of("/gpt"), None);
    }

    #[test]
    fn key_resolution_order() {
        assert_eq!(resolve_api_key(&keys(), "openai/gpt-4o").as_deref(), Some("sk-openai"));
        assert_eq!(
            resolve_api_key(&keys(), "anthropic/claude-sonnet-4").as_deref(),
            Some("sk-default")
        );
        assert_eq!(resolve_api_key(&BTreeMap::new(), "openai/gpt-4o"), None);
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let keys = BTreeMap::from([("default".to_string(), " ".to_string())]);
        assert_eq!(resolve_api_key(&keys, "x/y"), None);
    }
}
