//! In-memory task registry with a single status writer per task
//!
//! Status is ephemeral: entries live for the lifetime of the process.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Lifecycle state of an enrichment task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Reading,
    Processing,
    Saving,
    Completed,
    Cancelled,
    Error,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Error
        )
    }

    /// Transitions only move forward; terminal states are final
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Queued, Reading) => true,
            (Reading, Processing) => true,
            (Processing, Saving | Cancelled) => true,
            (Saving, Completed) => true,
            (from, Error) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// How often a label was suggested across a finished run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryCount {
    pub label: String,
    pub count: usize,
    /// Fraction of all rows carrying this label
    pub share: f64,
    /// More than a tenth of the rows fall in this category
    pub frequent: bool,
}

/// Externally visible status of a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: Uuid,
    pub state: TaskState,
    pub processed: usize,
    pub total: usize,
    pub error: Option<String>,
    /// File name of the artifact inside the output directory
    pub output: Option<String>,
    pub summary_errors: usize,
    pub classification_errors: usize,
    pub elapsed_secs: f64,
    pub model: String,
    pub filename: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryCount>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskStatus {
    pub fn new(task_id: Uuid, model: impl Into<String>, filename: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            state: TaskState::Queued,
            processed: 0,
            total: 0,
            error: None,
            output: None,
            summary_errors: 0,
            classification_errors: 0,
            elapsed_secs: 0.0,
            model: model.into(),
            filename,
            message: "Task queued".to_string(),
            categories: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn percent_complete(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.processed as f32 / self.total as f32 * 100.0
    }

    fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = now;
        self.elapsed_secs = (now - self.created_at).num_milliseconds().max(0) as f64 / 1000.0;
    }
}

struct TaskEntry {
    status: TaskStatus,
    cancel: CancellationToken,
}

/// Process-wide map of task id to status and cancellation token
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<Uuid, TaskEntry>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task and hand out its only status writer
    pub fn register(
        &self,
        task_id: Uuid,
        model: &str,
        filename: Option<String>,
    ) -> Result<(StatusWriter, CancellationToken)> {
        let cancel = CancellationToken::new();

        match self.tasks.entry(task_id) {
            Entry::Occupied(_) => {
                return Err(Error::internal(format!(
                    "Task {} is already registered",
                    task_id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(TaskEntry {
                    status: TaskStatus::new(task_id, model, filename),
                    cancel: cancel.clone(),
                });
            }
        }

        let writer = StatusWriter {
            task_id,
            tasks: self.tasks.clone(),
        };

        Ok((writer, cancel))
    }

    /// Copy of the current status
    pub fn snapshot(&self, task_id: Uuid) -> Option<TaskStatus> {
        self.tasks.get(&task_id).map(|e| e.status.clone())
    }

    /// All known tasks, oldest first
    pub fn list(&self) -> Vec<TaskStatus> {
        let mut tasks: Vec<TaskStatus> = self.tasks.iter().map(|e| e.status.clone()).collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Request cancellation; the run observes it at its next checkpoint
    pub fn cancel(&self, task_id: Uuid) -> Option<TaskStatus> {
        let entry = self.tasks.get(&task_id)?;
        if !entry.status.state.is_terminal() {
            tracing::info!("[{}] Cancellation requested", task_id);
            entry.cancel.cancel();
        }
        Some(entry.status.clone())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Sole mutator of one task's status
///
/// Not `Clone`: whoever owns it is the only writer of that task.
pub struct StatusWriter {
    task_id: Uuid,
    tasks: Arc<DashMap<Uuid, TaskEntry>>,
}

impl StatusWriter {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn snapshot(&self) -> Option<TaskStatus> {
        self.tasks.get(&self.task_id).map(|e| e.status.clone())
    }

    /// Move to `state` with a human readable message
    pub fn set_state(&self, state: TaskState, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update(|status| {
            if !status.state.can_transition_to(state) {
                tracing::warn!(
                    "[{}] Ignoring transition {:?} -> {:?}",
                    status.task_id,
                    status.state,
                    state
                );
                return false;
            }
            status.state = state;
            status.message = message;
            true
        })
    }

    pub fn set_total(&self, total: usize) {
        self.update(|status| {
            status.total = total;
            status.processed = status.processed.min(total);
            true
        });
    }

    /// Record progress; the processed count never goes backwards or past the total
    pub fn set_progress(&self, processed: usize, summary_errors: usize, classification_errors: usize) {
        self.update(|status| {
            status.processed = processed.max(status.processed).min(status.total);
            status.summary_errors = summary_errors;
            status.classification_errors = classification_errors;
            status.message = format!("Processing ticket {}/{}", status.processed, status.total);
            true
        });
    }

    pub fn complete(&self, output: impl Into<String>, categories: Vec<CategoryCount>) -> bool {
        let output = output.into();
        self.update(|status| {
            if !status.state.can_transition_to(TaskState::Completed) {
                tracing::warn!(
                    "[{}] Cannot complete task in state {:?}",
                    status.task_id,
                    status.state
                );
                return false;
            }
            status.state = TaskState::Completed;
            status.output = Some(output);
            status.categories = categories;
            status.message = "Enrichment completed, the file is ready for download".to_string();
            true
        })
    }

    pub fn cancelled(&self) -> bool {
        self.set_state(TaskState::Cancelled, "Task cancelled by request")
    }

    pub fn fail(&self, error: impl Into<String>) -> bool {
        let error = error.into();
        self.update(|status| {
            if !status.state.can_transition_to(TaskState::Error) {
                return false;
            }
            status.state = TaskState::Error;
            status.message = error.clone();
            status.error = Some(error);
            true
        })
    }

    /// Apply `f` unless the task already reached a terminal state
    fn update(&self, f: impl FnOnce(&mut TaskStatus) -> bool) -> bool {
        let Some(mut entry) = self.tasks.get_mut(&self.task_id) else {
            tracing::warn!("[{}] Status update for unknown task", self.task_id);
            return false;
        };

        if entry.status.state.is_terminal() {
            tracing::warn!(
                "[{}] Ignoring update, task already {:?}",
                self.task_id,
                entry.status.state
            );
            return false;
        }

        let applied = f(&mut entry.status);
        if applied {
            entry.status.touch();
        }
        applied
    }
}
