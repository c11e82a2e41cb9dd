//! Application state for the enrichment server

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::EnricherConfig;
use crate::error::{Error, Result};
use crate::processing::{BatchOrchestrator, BatchRequest, TaskRegistry, TaskStatus};
use crate::providers::{LlmProvider, OllamaLlm};
use crate::types::TableFormat;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: EnricherConfig,
    /// Text-generation backend
    llm: Arc<dyn LlmProvider>,
    orchestrator: Arc<BatchOrchestrator>,
    /// Status of every task submitted since startup
    registry: TaskRegistry,
    /// Canonical upload directory
    upload_dir: PathBuf,
    /// Canonical output directory; downloads never leave it
    output_dir: PathBuf,
}

/// A file received by the submission endpoint
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub data: Vec<u8>,
    pub model: Option<String>,
    pub context: Option<String>,
}

impl AppState {
    /// Create state backed by the Ollama server from `config`
    pub fn new(config: EnricherConfig) -> Result<Self> {
        let llm = Arc::new(OllamaLlm::new(&config.llm)?);
        tracing::info!("Ollama client initialized ({})", config.llm.base_url);
        Self::with_provider(config, llm)
    }

    /// Create state around an arbitrary provider
    pub fn with_provider(config: EnricherConfig, llm: Arc<dyn LlmProvider>) -> Result<Self> {
        let upload_dir = prepare_dir(&config.storage.upload_dir)?;
        let output_dir = prepare_dir(&config.storage.output_dir)?;
        let orchestrator = Arc::new(BatchOrchestrator::from_config(&config, llm.clone())?);

        tracing::info!(
            "Storage ready: uploads in {}, outputs in {}",
            upload_dir.display(),
            output_dir.display()
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                llm,
                orchestrator,
                registry: TaskRegistry::new(),
                upload_dir,
                output_dir,
            }),
        })
    }

    pub fn config(&self) -> &EnricherConfig {
        &self.inner.config
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.inner.llm
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    pub fn upload_dir(&self) -> &Path {
        &self.inner.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.inner.output_dir
    }

    /// Store an upload, register its task and start the batch in the background.
    ///
    /// The model is checked before anything is stored; an unknown model
    /// creates no task.
    pub async fn submit(&self, upload: Upload) -> Result<TaskStatus> {
        let format = TableFormat::from_path(Path::new(&upload.filename))
            .ok_or_else(|| Error::UnsupportedFileType(upload.filename.clone()))?;

        let model = upload
            .model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.inner.config.llm.default_model.clone());

        if !self.inner.llm.model_exists(&model).await? {
            tracing::warn!("Rejected submission of {}: model {} is not available", upload.filename, model);
            return Err(Error::ModelUnavailable(model));
        }

        let task_id = Uuid::new_v4();
        let input_path = self
            .inner
            .upload_dir
            .join(format!("{}.{}", task_id, format.extension()));
        let output_path = self.inner.output_dir.join(format!(
            "{}_enriched.{}",
            task_id,
            format.output_format().extension()
        ));

        tokio::fs::write(&input_path, &upload.data).await?;
        tracing::info!(
            "[{}] Stored upload {} ({} bytes)",
            task_id,
            upload.filename,
            upload.data.len()
        );

        let (writer, cancel) =
            self.inner
                .registry
                .register(task_id, &model, Some(upload.filename.clone()))?;

        let request = BatchRequest {
            task_id,
            input_path,
            output_path,
            model,
            context: upload.context.filter(|c| !c.trim().is_empty()),
        };

        let orchestrator = self.inner.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.run(request, writer, cancel).await;
        });

        self.inner
            .registry
            .snapshot(task_id)
            .ok_or_else(|| Error::internal(format!("Task {} vanished after registration", task_id)))
    }

    /// Path of a completed task's artifact, confined to the output directory
    pub fn output_path(&self, status: &TaskStatus) -> Result<PathBuf> {
        let name = status
            .output
            .as_deref()
            .ok_or_else(|| Error::BadRequest(format!("Task {} has no output yet", status.task_id)))?;

        let candidate = self.inner.output_dir.join(name);
        let resolved = candidate.canonicalize().map_err(|_| {
            Error::TaskNotFound(format!("Output of task {} is no longer available", status.task_id))
        })?;

        if !resolved.starts_with(&self.inner.output_dir) {
            tracing::warn!(
                "[{}] Refusing to serve {} outside the output directory",
                status.task_id,
                resolved.display()
            );
            return Err(Error::BadRequest("Invalid output path".to_string()));
        }

        Ok(resolved)
    }
}

fn prepare_dir(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| {
        Error::Config(format!("Cannot create directory {}: {}", dir.display(), e))
    })?;
    dir.canonicalize().map_err(|e| {
        Error::Config(format!("Cannot resolve directory {}: {}", dir.display(), e))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::processing::TaskState;
    use crate::testing::{ScriptedProvider, Step};
    use std::time::Duration;
    use tempfile::TempDir;

    pub(crate) fn test_state(dir: &TempDir, provider: ScriptedProvider) -> AppState {
        let mut config = EnricherConfig::default();
        config.storage.upload_dir = dir.path().join("uploads");
        config.storage.output_dir = dir.path().join("processed");
        config.llm.retry_delay_secs = 0;
        config.processing.workers = Some(2);
        AppState::with_provider(config, Arc::new(provider)).unwrap()
    }

    pub(crate) fn csv_upload(model: Option<&str>) -> Upload {
        Upload {
            filename: "tickets.csv".to_string(),
            data: b"Short description,Description,Work notes,State\nVPN caida,,,New\n".to_vec(),
            model: model.map(String::from),
            context: None,
        }
    }

    pub(crate) async fn wait_terminal(state: &AppState, task_id: Uuid) -> TaskStatus {
        for _ in 0..200 {
            let status = state.registry().snapshot(task_id).unwrap();
            if status.state.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} did not finish", task_id);
    }

    #[tokio::test]
    async fn test_submit_runs_batch_to_completion() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, ScriptedProvider::repeating(Step::Reply("Red")));

        let queued = state.submit(csv_upload(None)).await.unwrap();
        assert_eq!(queued.model, "gemma:2b");
        assert_eq!(queued.filename.as_deref(), Some("tickets.csv"));

        let done = wait_terminal(&state, queued.task_id).await;
        assert_eq!(done.state, TaskState::Completed);
        assert_eq!(
            done.output,
            Some(format!("{}_enriched.csv", queued.task_id))
        );

        let path = state.output_path(&done).unwrap();
        assert!(path.starts_with(state.output_dir()));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_unknown_model_creates_no_task() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, ScriptedProvider::repeating(Step::Reply("Red")));

        let err = state.submit(csv_upload(Some("phi3:mini"))).await.unwrap_err();

        assert!(matches!(err, Error::ModelUnavailable(ref m) if m == "phi3:mini"));
        assert!(state.registry().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_upload_is_rejected() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, ScriptedProvider::repeating(Step::Reply("Red")));
        let mut upload = csv_upload(None);
        upload.filename = "tickets.pdf".to_string();

        let err = state.submit(upload).await.unwrap_err();

        assert!(matches!(err, Error::UnsupportedFileType(_)));
        assert!(state.registry().is_empty());
    }

    #[tokio::test]
    async fn test_output_path_rejects_escapes() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, ScriptedProvider::repeating(Step::Reply("Red")));
        fs::write(dir.path().join("secret.csv"), b"x").unwrap();

        let (writer, _) = state
            .registry()
            .register(Uuid::new_v4(), "gemma:2b", None)
            .unwrap();
        let mut status = writer.snapshot().unwrap();
        status.output = Some("../secret.csv".to_string());

        assert!(matches!(
            state.output_path(&status),
            Err(Error::BadRequest(_))
        ));
    }
}
