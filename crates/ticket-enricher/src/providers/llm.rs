//! LLM provider trait for text generation

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// A model served by the inference service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

impl ModelInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            modified_at: None,
        }
    }
}

/// Trait for text-generation backends
///
/// Implementations:
/// - `OllamaLlm`: Local Ollama server (gemma, llama3, phi3, etc.)
///
/// `generate` issues exactly one request; retrying is the caller's concern.
/// Unreachable-service failures must be reported as `Error::Http` or
/// `Error::Transport` so callers can tell them apart from service-side errors.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for `prompt` with `model`
    async fn generate(&self, model: &str, prompt: &str) -> Result<String>;

    /// List the models the service can run
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Check whether `model` is available; an untagged name means `:latest`
    async fn model_exists(&self, model: &str) -> Result<bool> {
        let wanted = with_default_tag(model);
        Ok(self
            .list_models()
            .await?
            .iter()
            .any(|m| with_default_tag(&m.name) == wanted))
    }

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

fn with_default_tag(model: &str) -> String {
    let model = model.trim();
    if model.contains(':') {
        model.to_string()
    } else {
        format!("{}:latest", model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedModels(Vec<&'static str>);

    #[async_trait]
    impl LlmProvider for FixedModels {
        async fn generate(&self, _model: &str, _prompt: &str) -> Result<String> {
            Ok(String::new())
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            Ok(self.0.iter().map(|n| ModelInfo::named(*n)).collect())
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_model_exists_treats_untagged_as_latest() {
        let provider = FixedModels(vec!["gemma:2b", "llama3:latest"]);

        assert!(provider.model_exists("gemma:2b").await.unwrap());
        assert!(provider.model_exists("llama3").await.unwrap());
        assert!(!provider.model_exists("gemma").await.unwrap());
        assert!(!provider.model_exists("phi3:mini").await.unwrap());
    }
}
