//! ticket-enricher: batch enrichment of support-ticket tables
//!
//! Reads a CSV or spreadsheet of tickets, asks an Ollama-served model for a
//! summary and a classification of every row on a bounded worker pool, and
//! writes the table back with two generated columns. Runs are tracked in an
//! in-memory task registry and can be cancelled at any time.

pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod server;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EnricherConfig;
pub use error::{Error, Result};
pub use processing::{BatchOrchestrator, BatchRequest, TaskRegistry, TaskState, TaskStatus};
pub use types::{Cell, Marker, Record};
