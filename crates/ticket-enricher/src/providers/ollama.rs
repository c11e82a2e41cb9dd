//! Ollama-based LLM provider
//!
//! Wraps the OllamaClient to implement the provider trait.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::Result;
use crate::generation::OllamaClient;

use super::llm::{LlmProvider, ModelInfo};

/// Ollama LLM provider for summaries and classifications
pub struct OllamaLlm {
    client: Arc<OllamaClient>,
}

impl OllamaLlm {
    /// Create a new Ollama LLM provider
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: Arc::new(OllamaClient::new(config)?),
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        self.client.generate(model, prompt).await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.client.list_models().await
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
