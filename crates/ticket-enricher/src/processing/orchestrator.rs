//! Batch orchestration: read, fan out rows, reconcile, write
//!
//! A run walks `reading -> processing -> saving -> completed` and reports
//! every step through its task's `StatusWriter`. Rows are processed on a
//! bounded pool and collected in completion order; reconciliation restores
//! input order before the table is written.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{ColumnConfig, EnricherConfig};
use crate::error::{Error, Result};
use crate::generation::{InferenceClient, RetryPolicy};
use crate::ingestion::{Sanitizer, Table};
use crate::providers::LlmProvider;
use crate::types::marker::is_error_value;
use crate::types::{Cell, Marker, Record};

use super::registry::{CategoryCount, StatusWriter, TaskState};
use super::row_task::{panic_message, RowResult, RowTask};

/// Share of rows above which a category is flagged as frequent
const FREQUENT_SHARE: f64 = 0.10;

/// Everything a run needs to know about one submitted file
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub task_id: Uuid,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub model: String,
    pub context: Option<String>,
}

enum RunOutcome {
    Completed {
        output: String,
        categories: Vec<CategoryCount>,
    },
    Cancelled,
}

#[derive(Default)]
struct Collected {
    summaries: HashMap<usize, String>,
    classifications: HashMap<usize, String>,
    processed: usize,
    summary_errors: usize,
    classification_errors: usize,
}

impl Collected {
    fn record(&mut self, row: RowResult) {
        if is_error_value(&row.summary) {
            self.summary_errors += 1;
        }
        if is_error_value(&row.classification) {
            self.classification_errors += 1;
        }
        self.summaries.insert(row.index, row.summary);
        self.classifications.insert(row.index, row.classification);
        self.processed += 1;
    }
}

/// Runs enrichment batches
pub struct BatchOrchestrator {
    row_task: RowTask,
    columns: ColumnConfig,
    workers: usize,
    progress_every: usize,
}

impl BatchOrchestrator {
    pub fn new(
        inference: Arc<InferenceClient>,
        sanitizer: Arc<Sanitizer>,
        columns: ColumnConfig,
        workers: usize,
        progress_every: usize,
    ) -> Self {
        Self {
            row_task: RowTask::new(inference, sanitizer),
            columns,
            workers: workers.max(1),
            progress_every: progress_every.max(1),
        }
    }

    /// Wire an orchestrator from configuration around `provider`
    pub fn from_config(config: &EnricherConfig, provider: Arc<dyn LlmProvider>) -> Result<Self> {
        let inference = InferenceClient::new(provider, RetryPolicy::from_config(&config.llm));
        let sanitizer = Sanitizer::new(&config.sanitizer)?;

        tracing::info!(
            "Batch orchestrator configured: {} workers, {} attempts per call, {}s between attempts",
            config.processing.worker_count(),
            config.llm.max_retries,
            config.llm.retry_delay_secs
        );

        Ok(Self::new(
            Arc::new(inference),
            Arc::new(sanitizer),
            config.columns.clone(),
            config.processing.worker_count(),
            config.processing.progress_every,
        ))
    }

    /// Run one batch to a terminal state.
    ///
    /// Never fails: every error ends up in the task status.
    pub async fn run(
        &self,
        request: BatchRequest,
        status: StatusWriter,
        cancel: CancellationToken,
    ) -> TaskState {
        let task_id = request.task_id;
        tracing::info!(
            "[{}] Starting batch for {} with model {}",
            task_id,
            request.input_path.display(),
            request.model
        );

        let outcome = AssertUnwindSafe(self.execute(&request, &status, &cancel))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(RunOutcome::Completed { output, categories })) => {
                status.complete(output.clone(), categories);
                tracing::info!("[{}] Batch completed, wrote {}", task_id, output);
                TaskState::Completed
            }
            Ok(Ok(RunOutcome::Cancelled)) => {
                status.cancelled();
                tracing::info!("[{}] Batch cancelled, no output written", task_id);
                TaskState::Cancelled
            }
            Ok(Err(e)) if e.is_operational() => {
                tracing::error!("[{}] Batch failed: {}", task_id, e);
                status.fail(e.to_string());
                TaskState::Error
            }
            Ok(Err(e)) => {
                tracing::error!("[{}] Batch failed unexpectedly: {:?}", task_id, e);
                status.fail(unexpected_message(task_id));
                TaskState::Error
            }
            Err(panic) => {
                tracing::error!(
                    "[{}] Batch panicked: {}",
                    task_id,
                    panic_message(&panic)
                );
                status.fail(unexpected_message(task_id));
                TaskState::Error
            }
        }
    }

    async fn execute(
        &self,
        request: &BatchRequest,
        status: &StatusWriter,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let task_id = request.task_id;

        status.set_state(TaskState::Reading, "Reading input file");
        let input = request.input_path.clone();
        let mut table = tokio::task::spawn_blocking(move || Table::read(&input))
            .await
            .map_err(|e| Error::internal(format!("Reader task failed: {}", e)))??;

        let missing = table.missing_columns(&self.columns.required_columns());
        if !missing.is_empty() {
            return Err(Error::MissingColumns(missing));
        }
        if table.is_empty() {
            return Err(Error::EmptyTable);
        }

        let records = self.records(&table)?;
        let total = records.len();
        status.set_total(total);
        status.set_state(
            TaskState::Processing,
            format!("Processing {} tickets", total),
        );
        tracing::info!(
            "[{}] Read {} rows, processing with {} workers",
            task_id,
            total,
            self.workers
        );

        let Some(collected) = self
            .process_rows(request, records, status, cancel)
            .await
        else {
            return Ok(RunOutcome::Cancelled);
        };

        status.set_state(TaskState::Saving, "Saving enriched file");

        let (summaries, classifications) = reconcile(task_id, total, collected);
        let categories = tally_categories(&classifications, total);

        let short_name = model_short_name(&request.model);
        let summary_column = unique_column_name(
            &table,
            &format!("{}_{}", self.columns.summary_prefix, short_name),
        );
        table.push_column(summary_column, summaries)?;
        let classification_column = unique_column_name(
            &table,
            &format!("{}_{}", self.columns.classification_prefix, short_name),
        );
        table.push_column(classification_column, classifications)?;

        let output_path = request.output_path.clone();
        tokio::task::spawn_blocking(move || table.write(&output_path))
            .await
            .map_err(|e| Error::internal(format!("Writer task failed: {}", e)))??;

        let output = request
            .output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::internal("Output path has no file name"))?;

        Ok(RunOutcome::Completed { output, categories })
    }

    fn records(&self, table: &Table) -> Result<Vec<Record>> {
        let column = |name: &str| {
            table
                .column_index(name)
                .ok_or_else(|| Error::MissingColumns(vec![name.to_string()]))
        };
        let title = column(&self.columns.title)?;
        let body = column(&self.columns.body)?;
        let notes = column(&self.columns.notes)?;

        Ok((0..table.len())
            .map(|row| {
                Record::new(
                    row,
                    table.cell(row, title).clone(),
                    table.cell(row, body).clone(),
                    table.cell(row, notes).clone(),
                )
            })
            .collect())
    }

    /// Fan rows out to the pool and collect results as they complete.
    ///
    /// Returns `None` when the run was cancelled.
    async fn process_rows(
        &self,
        request: &BatchRequest,
        records: Vec<Record>,
        status: &StatusWriter,
        cancel: &CancellationToken,
    ) -> Option<Collected> {
        let task_id = request.task_id;
        let total = records.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let model: Arc<str> = Arc::from(request.model.as_str());
        let context: Option<Arc<str>> = request.context.as_deref().map(Arc::from);

        let mut tasks = JoinSet::new();
        for record in records {
            let row_task = self.row_task.clone();
            let semaphore = semaphore.clone();
            let model = model.clone();
            let context = context.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let index = record.index;
                let work = async {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return RowResult::uniform(index, Marker::Cancelled);
                    };
                    row_task
                        .process(&record, &model, context.as_deref(), &cancel)
                        .await
                };

                match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => {
                        tracing::error!(row = index, "Row task panicked: {}", panic_message(&panic));
                        RowResult::uniform(index, Marker::ProcessingError)
                    }
                }
            });
        }

        let mut collected = Collected::default();
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        "[{}] Cancellation observed after {}/{} rows",
                        task_id,
                        collected.processed,
                        total
                    );
                    tasks.detach_all();
                    status.set_progress(
                        collected.processed,
                        collected.summary_errors,
                        collected.classification_errors,
                    );
                    return None;
                }
                joined = tasks.join_next() => joined,
            };

            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok(row) => {
                    tracing::debug!(row = row.index, "[{}] Row collected", task_id);
                    collected.record(row);
                }
                Err(e) => {
                    tracing::error!("[{}] Row task was lost: {}", task_id, e);
                    collected.processed += 1;
                }
            }

            if collected.processed % self.progress_every == 0 || collected.processed == total {
                status.set_progress(
                    collected.processed,
                    collected.summary_errors,
                    collected.classification_errors,
                );
            }
        }

        if cancel.is_cancelled() {
            tracing::info!("[{}] Cancellation observed after the last row", task_id);
            return None;
        }

        tracing::info!(
            "[{}] All {} rows processed ({} summary errors, {} classification errors)",
            task_id,
            total,
            collected.summary_errors,
            collected.classification_errors
        );
        Some(collected)
    }
}

/// Restore input order, filling gaps with `LENGTH_MISMATCH`
fn reconcile(task_id: Uuid, total: usize, mut collected: Collected) -> (Vec<Cell>, Vec<Cell>) {
    let mut gaps = 0;
    let mut take = |map: &mut HashMap<usize, String>, index: usize| {
        map.remove(&index).unwrap_or_else(|| {
            gaps += 1;
            Marker::LengthMismatch.to_string()
        })
    };

    let mut summaries = Vec::with_capacity(total);
    let mut classifications = Vec::with_capacity(total);
    for index in 0..total {
        summaries.push(Cell::Text(take(&mut collected.summaries, index)));
        classifications.push(Cell::Text(take(&mut collected.classifications, index)));
    }

    if gaps > 0 {
        tracing::warn!("[{}] {} result slots were missing after processing", task_id, gaps);
    }

    (summaries, classifications)
}

/// Count generated labels, most frequent first; markers are not categories
fn tally_categories(classifications: &[Cell], total: usize) -> Vec<CategoryCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in classifications.iter().filter_map(Cell::as_text) {
        if Marker::parse(label).is_none() {
            *counts.entry(label).or_insert(0) += 1;
        }
    }

    let mut categories: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(label, count)| {
            let share = if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            };
            CategoryCount {
                label: label.to_string(),
                count,
                share,
                frequent: share > FREQUENT_SHARE,
            }
        })
        .collect();

    categories.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    categories
}

/// Column-safe short form of a model id: `library/llama3.1:8b` -> `llama3.1`
pub fn model_short_name(model: &str) -> String {
    let name = model.trim().rsplit('/').next().unwrap_or_default();
    let name = name.split(':').next().unwrap_or_default();
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '.' { c } else { '_' })
        .collect()
}

/// `base`, or `base_2`, `base_3`, ... if the table already has that column
fn unique_column_name(table: &Table, base: &str) -> String {
    if table.column_index(base).is_none() {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|name| table.column_index(name).is_none())
        .unwrap_or_else(|| base.to_string())
}

fn unexpected_message(task_id: Uuid) -> String {
    format!("Unexpected error while processing task {}", task_id)
}
