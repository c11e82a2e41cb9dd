//! Background batch processing with a task registry and progress tracking

mod orchestrator;
mod registry;
mod row_task;

pub use orchestrator::{model_short_name, BatchOrchestrator, BatchRequest};
pub use registry::{CategoryCount, StatusWriter, TaskRegistry, TaskState, TaskStatus};
pub use row_task::{clean_label, RowResult, RowTask};
