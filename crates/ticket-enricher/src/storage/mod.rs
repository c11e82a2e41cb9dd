//! On-disk storage housekeeping for uploads and enriched outputs

pub mod retention;

pub use retention::{spawn_sweeper, sweep};
