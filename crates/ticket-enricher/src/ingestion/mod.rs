//! Table ingestion and text cleanup

mod sanitizer;
mod table;

pub use sanitizer::Sanitizer;
pub use table::Table;
