//! Enrichment of a single ticket: summary, then classification

use futures::FutureExt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::generation::{InferenceClient, InferenceResult, PromptBuilder};
use crate::ingestion::Sanitizer;
use crate::types::{Cell, Marker, Record};

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]+|\d+[.)])\s*").expect("list marker pattern is valid"));

const TITLE_LABEL: &str = "Descripción breve";
const BODY_LABEL: &str = "Descripción completa";
const NOTES_LABEL: &str = "Notas de trabajo";

/// Outcome of one row: generated text or a marker in each slot
#[derive(Debug, Clone, PartialEq)]
pub struct RowResult {
    pub index: usize,
    pub summary: String,
    pub classification: String,
}

impl RowResult {
    pub(crate) fn uniform(index: usize, marker: Marker) -> Self {
        let text = marker.to_string();
        Self {
            index,
            summary: text.clone(),
            classification: text,
        }
    }
}

/// Runs the two inference calls for a record
#[derive(Clone)]
pub struct RowTask {
    inference: Arc<InferenceClient>,
    sanitizer: Arc<Sanitizer>,
}

impl RowTask {
    pub fn new(inference: Arc<InferenceClient>, sanitizer: Arc<Sanitizer>) -> Self {
        Self {
            inference,
            sanitizer,
        }
    }

    /// Labelled sections for every non-empty field, one per line
    pub fn compose_text(&self, record: &Record) -> String {
        [
            (TITLE_LABEL, &record.title),
            (BODY_LABEL, &record.body),
            (NOTES_LABEL, &record.notes),
        ]
        .into_iter()
        .filter_map(|(label, cell)| {
            let text = self.field_text(cell);
            (!text.is_empty()).then(|| format!("{}: {}", label, text))
        })
        .collect::<Vec<_>>()
        .join("\n")
    }

    /// Numbers, flags and dates typed into a text column count as text
    fn field_text(&self, cell: &Cell) -> String {
        match cell {
            Cell::Int(_) | Cell::Float(_) | Cell::Bool(_) | Cell::DateTime(_) => {
                self.sanitizer.sanitize_text(&cell.to_string())
            }
            _ => self.sanitizer.sanitize(cell),
        }
    }

    /// Always returns a well-formed result, even if the work panics
    pub async fn process(
        &self,
        record: &Record,
        model: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> RowResult {
        let index = record.index;
        match AssertUnwindSafe(self.enrich(record, model, context, cancel))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                tracing::error!(row = index, "Row processing failed: {}", panic_message(&panic));
                RowResult::uniform(index, Marker::ProcessingError)
            }
        }
    }

    async fn enrich(
        &self,
        record: &Record,
        model: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> RowResult {
        let index = record.index;

        if cancel.is_cancelled() {
            return RowResult::uniform(index, Marker::Cancelled);
        }

        let text = self.compose_text(record);
        if text.is_empty() {
            tracing::debug!(row = index, "Row has no text, skipping inference");
            return RowResult::uniform(index, Marker::EmptyText);
        }

        let summary = self
            .inference
            .infer(model, &PromptBuilder::build_summary_prompt(&text), cancel)
            .await
            .into_text();

        if cancel.is_cancelled() {
            return RowResult {
                index,
                summary,
                classification: Marker::Cancelled.to_string(),
            };
        }

        let prompt = PromptBuilder::build_classification_prompt(&text, context);
        let classification = match self.inference.infer(model, &prompt, cancel).await {
            InferenceResult::Success(label) => clean_label(&label),
            other => other.into_text(),
        };

        tracing::debug!(row = index, "Row enriched");

        RowResult {
            index,
            summary,
            classification,
        }
    }
}

/// Strip a leading bullet or enumeration from a generated label
pub fn clean_label(label: &str) -> String {
    let trimmed = label.trim();
    let cleaned = LIST_MARKER.replace(trimmed, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        trimmed.to_string()
    } else {
        cleaned.to_string()
    }
}

pub(crate) fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
