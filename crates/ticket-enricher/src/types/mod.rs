//! Core types for the enrichment pipeline

pub mod marker;
pub mod record;

pub use marker::{FailureClass, Marker};
pub use record::{Cell, Record, TableFormat};
