//! Provider abstraction for the text-generation backend
//!
//! The batch engine only sees `LlmProvider`, so tests and alternative
//! backends can stand in for Ollama.

pub mod llm;
pub mod ollama;

pub use llm::{LlmProvider, ModelInfo};
pub use ollama::OllamaLlm;
