//! In-process provider stub shared by unit tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::providers::{LlmProvider, ModelInfo};

/// Scripted answer for one `generate` call
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Reply(&'static str),
    Transport,
    Service,
    Panic,
}

type Handler = dyn Fn(usize, &str) -> Step + Send + Sync;

/// `LlmProvider` that answers from a script and counts calls
pub struct ScriptedProvider {
    handler: Box<Handler>,
    calls: AtomicUsize,
    cancel_on: Option<(usize, CancellationToken)>,
    delay: Duration,
    models: Vec<&'static str>,
}

impl ScriptedProvider {
    /// Answer call `n` with `steps[n]`; the last step repeats afterwards
    pub fn new(steps: Vec<Step>) -> Self {
        Self::with_handler(move |call, _| {
            steps
                .get(call)
                .or_else(|| steps.last())
                .copied()
                .unwrap_or(Step::Service)
        })
    }

    pub fn repeating(step: Step) -> Self {
        Self::new(vec![step])
    }

    /// Answer with `handler(call_index, prompt)`
    pub fn with_handler(handler: impl Fn(usize, &str) -> Step + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            cancel_on: None,
            delay: Duration::ZERO,
            models: vec!["gemma:2b"],
        }
    }

    /// Cancel `token` while serving the `n`-th call (1-based)
    pub fn cancel_on_call(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_on = Some((n, token));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(&self, _model: &str, prompt: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = (self.handler)(call, prompt);

        if let Some((n, token)) = &self.cancel_on {
            if call + 1 == *n {
                token.cancel();
            }
        }

        match step {
            Step::Reply(text) => Ok(text.to_string()),
            Step::Transport => Err(Error::Transport("connection refused".to_string())),
            Step::Service => Err(Error::llm("Ollama returned 500 Internal Server Error")),
            Step::Panic => panic!("scripted provider panic"),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(self.models.iter().map(|m| ModelInfo::named(*m)).collect())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
