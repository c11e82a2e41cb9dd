//! Text generation: Ollama client, prompts and retrying inference

pub mod inference;
pub mod ollama;
pub mod prompt;

pub use inference::{AttemptOutcome, InferenceClient, InferenceResult, RetryPolicy};
pub use ollama::OllamaClient;
pub use prompt::PromptBuilder;
