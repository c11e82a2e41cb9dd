//! Configuration for the enrichment service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnricherConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Batch processing configuration
    pub processing: ProcessingConfig,
    /// Input column mapping
    pub columns: ColumnConfig,
    /// Text cleanup configuration
    pub sanitizer: SanitizerConfig,
    /// Upload/output directories and retention
    pub storage: StorageConfig,
}

impl EnricherConfig {
    /// Load configuration from a TOML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 50MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            enable_cors: true,
            max_upload_size: 50 * 1024 * 1024,
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Model used when a submission does not name one
    pub default_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Attempt budget per inference call
    pub max_retries: u32,
    /// Fixed delay between attempts in seconds
    pub retry_delay_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            default_model: "gemma:2b".to_string(),
            temperature: 0.3,
            timeout_secs: 180,
            max_retries: 3,
            retry_delay_secs: 5,
        }
    }
}

impl LlmConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Batch processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Worker pool size per batch (default: CPU count, max 8)
    pub workers: Option<usize>,
    /// Write progress to the task status every N completed rows
    pub progress_every: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workers: None,
            progress_every: 5,
        }
    }
}

impl ProcessingConfig {
    /// Effective worker count, never zero
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| num_cpus::get().min(8))
            .max(1)
    }
}

/// Names of the input columns the enrichment reads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    /// Short title of the ticket
    pub title: String,
    /// Full ticket description
    pub body: String,
    /// Work notes written by support staff
    pub notes: String,
    /// Extra columns that must exist even though they are not read
    pub required: Vec<String>,
    /// Prefix of the generated summary column
    pub summary_prefix: String,
    /// Prefix of the generated classification column
    pub classification_prefix: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            title: "Short description".to_string(),
            body: "Description".to_string(),
            notes: "Work notes".to_string(),
            required: vec!["State".to_string()],
            summary_prefix: "Resumen".to_string(),
            classification_prefix: "Clasificacion".to_string(),
        }
    }
}

impl ColumnConfig {
    /// Every column that has to be present, in reporting order
    pub fn required_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.title.as_str(), self.body.as_str(), self.notes.as_str()];
        for extra in &self.required {
            if !columns.contains(&extra.as_str()) {
                columns.push(extra.as_str());
            }
        }
        columns
    }
}

/// Text cleanup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Case-insensitive regex patterns of system-generated tags to drop
    pub identifier_patterns: Vec<String>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            identifier_patterns: vec![
                r"\[ARGONAUTA.*?\]".to_string(),
                r"\[INC\d+\]".to_string(),
                r"CRQ\d+".to_string(),
            ],
        }
    }
}

/// Upload/output storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory receiving uploaded tables
    pub upload_dir: PathBuf,
    /// Directory receiving enriched tables
    pub output_dir: PathBuf,
    /// Files older than this are deleted by the sweeper (default: 1 day)
    pub max_file_age_secs: u64,
    /// Interval between sweeps (default: 1 hour)
    pub sweep_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("processed"),
            max_file_age_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_without_path_uses_defaults() {
        let config = EnricherConfig::load(None).unwrap();
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.llm.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.processing.progress_every, 5);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[llm]\ndefault_model = \"llama3.2:3b\"\n\n[columns]\nrequired = [\"State\", \"Number\"]"
        )
        .unwrap();

        let config = EnricherConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.llm.default_model, "llama3.2:3b");
        assert_eq!(config.llm.base_url, "http://localhost:11434");
        assert_eq!(config.columns.title, "Short description");
        assert_eq!(
            config.columns.required_columns(),
            vec!["Short description", "Description", "Work notes", "State", "Number"]
        );
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[llm\nbroken").unwrap();

        let err = EnricherConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_worker_count_never_zero() {
        let config = ProcessingConfig {
            workers: Some(0),
            progress_every: 5,
        };
        assert_eq!(config.worker_count(), 1);
    }
}
