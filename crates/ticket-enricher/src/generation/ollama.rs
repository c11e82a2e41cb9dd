//! Ollama HTTP client: single-shot generation and model listing

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::providers::llm::ModelInfo;

/// Longest slice of an error body kept in messages
const ERROR_BODY_LIMIT: usize = 200;

/// Ollama API client.
///
/// Every call is a single HTTP request; retry policy lives in
/// [`InferenceClient`](super::InferenceClient).
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: LlmConfig,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Shapes seen from `/api/tags` across Ollama versions and proxies
#[derive(Deserialize)]
#[serde(untagged)]
enum TagsResponse {
    Wrapped { models: Vec<TagEntry> },
    Bare(Vec<TagEntry>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagEntry {
    Name(String),
    Detailed {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        size: Option<u64>,
        #[serde(default)]
        modified_at: Option<String>,
    },
}

impl TagEntry {
    fn into_model_info(self) -> Option<ModelInfo> {
        match self {
            TagEntry::Name(name) => Some(ModelInfo::named(name)),
            TagEntry::Detailed {
                name,
                model,
                size,
                modified_at,
            } => name.or(model).map(|name| ModelInfo {
                name,
                size,
                modified_at,
            }),
        }
    }
}

/// Normalize a `/api/tags` body into model records, sorted by name
pub fn parse_model_list(body: &str) -> Result<Vec<ModelInfo>> {
    let parsed: TagsResponse = serde_json::from_str(body)
        .map_err(|e| Error::llm(format!("Unrecognized model list response: {}", e)))?;

    let entries = match parsed {
        TagsResponse::Wrapped { models } => models,
        TagsResponse::Bare(models) => models,
    };

    let mut models: Vec<ModelInfo> = entries
        .into_iter()
        .filter_map(TagEntry::into_model_info)
        .filter(|m| !m.name.trim().is_empty())
        .collect();
    models.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(models)
}

impl OllamaClient {
    /// Create a new Ollama client with the configured per-request timeout
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// One non-streaming generation request
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url);
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::llm(format!(
                "Generation failed: HTTP {} - {}",
                status,
                truncate(&body, ERROR_BODY_LIMIT)
            )));
        }

        let body = response.text().await?;
        let generated: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
            Error::llm(format!(
                "Failed to parse generation response: {} - {}",
                e,
                truncate(&body, ERROR_BODY_LIMIT)
            ))
        })?;

        Ok(generated.response)
    }

    /// List locally available models
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.config.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Error::llm(format!(
                "Model listing failed: HTTP {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        parse_model_list(&body)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard_tags_response() {
        let body = r#"{"models":[
            {"name":"llama3:latest","model":"llama3:latest","size":4661224676,"modified_at":"2024-05-01T10:00:00Z"},
            {"name":"gemma:2b","model":"gemma:2b","size":1678456656}
        ]}"#;

        let models = parse_model_list(body).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "gemma:2b");
        assert_eq!(models[1].size, Some(4661224676));
    }

    #[test]
    fn test_parse_variant_shapes() {
        let bare = r#"[{"model":"phi3:mini"},{"name":"gemma:2b"}]"#;
        let names: Vec<_> = parse_model_list(bare)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["gemma:2b", "phi3:mini"]);

        let strings = r#"{"models":["mistral","gemma:7b"]}"#;
        let names: Vec<_> = parse_model_list(strings)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["gemma:7b", "mistral"]);
    }

    #[test]
    fn test_entries_without_name_are_dropped() {
        let body = r#"{"models":[{"size":12},{"name":"gemma:2b"}]}"#;
        assert_eq!(parse_model_list(body).unwrap().len(), 1);
    }

    #[test]
    fn test_unrecognized_shape_is_error() {
        assert!(parse_model_list(r#"{"unexpected":true}"#).is_err());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("añadir", 2), "añ");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
