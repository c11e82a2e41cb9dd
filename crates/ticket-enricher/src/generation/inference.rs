//! Inference calls with bounded retry and cooperative cancellation

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::LlmConfig;
use crate::providers::LlmProvider;
use crate::types::{FailureClass, Marker};

/// Result of a single request to the provider
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Non-empty, trimmed generated text
    Success(String),
    /// The service could not be reached
    TransportError(String),
    /// The service failed or answered with something unusable
    ServiceError(String),
    /// Cancellation was observed at a checkpoint
    Cancelled,
}

/// Final result of an inference call, after retries
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceResult {
    Success(String),
    Exhausted {
        class: FailureClass,
        model: String,
        attempts: u32,
    },
    Cancelled,
}

impl InferenceResult {
    /// Generated text, or the marker standing in for it
    pub fn into_text(self) -> String {
        match self {
            InferenceResult::Success(text) => text,
            InferenceResult::Exhausted { class, model, .. } => {
                Marker::exhausted(class, model).to_string()
            }
            InferenceResult::Cancelled => Marker::Cancelled.to_string(),
        }
    }
}

/// What to do after an attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Finish(InferenceResult),
    RetryAfter(Duration),
}

/// Fixed-delay retry policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub max_attempts: u32,
    /// Pause between two attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            delay: config.retry_delay(),
        }
    }

    /// Decide the next step after attempt number `attempt` (1-based).
    ///
    /// `cancelled` is the state of the cancellation signal right after the
    /// attempt returned.
    pub fn decide(
        &self,
        attempt: u32,
        outcome: AttemptOutcome,
        cancelled: bool,
        model: &str,
    ) -> RetryDecision {
        let class = match outcome {
            AttemptOutcome::Success(text) => {
                return RetryDecision::Finish(InferenceResult::Success(text))
            }
            AttemptOutcome::Cancelled => return RetryDecision::Finish(InferenceResult::Cancelled),
            AttemptOutcome::TransportError(_) => FailureClass::Transport,
            AttemptOutcome::ServiceError(_) => FailureClass::Unexpected,
        };

        if cancelled {
            return RetryDecision::Finish(InferenceResult::Cancelled);
        }

        if attempt >= self.max_attempts.max(1) {
            return RetryDecision::Finish(InferenceResult::Exhausted {
                class,
                model: model.to_string(),
                attempts: attempt,
            });
        }

        RetryDecision::RetryAfter(self.delay)
    }
}

/// Retrying front-end to an [`LlmProvider`]
pub struct InferenceClient {
    provider: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
}

impl InferenceClient {
    pub fn new(provider: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    /// Generate text for `prompt`, retrying failed attempts.
    ///
    /// Cancellation is checked before every attempt and right after every
    /// failed one. Failures never escape: an exhausted budget is reported as
    /// [`InferenceResult::Exhausted`].
    pub async fn infer(
        &self,
        model: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> InferenceResult {
        if model.trim().is_empty() || prompt.trim().is_empty() {
            tracing::warn!("Inference requested with empty model or prompt, skipping call");
            return InferenceResult::Exhausted {
                class: FailureClass::Unexpected,
                model: model.to_string(),
                attempts: 0,
            };
        }

        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return InferenceResult::Cancelled;
            }

            attempt += 1;
            let outcome = self.attempt(model, prompt).await;

            match &outcome {
                AttemptOutcome::TransportError(msg) | AttemptOutcome::ServiceError(msg) => {
                    tracing::warn!(
                        model,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "Inference attempt failed: {}",
                        msg
                    );
                }
                _ => {}
            }

            match self
                .policy
                .decide(attempt, outcome, cancel.is_cancelled(), model)
            {
                RetryDecision::Finish(result) => {
                    if let InferenceResult::Exhausted { class, .. } = &result {
                        tracing::error!(
                            model,
                            attempts = attempt,
                            "Inference gave up after {} attempts ({:?})",
                            attempt,
                            class
                        );
                    }
                    return result;
                }
                RetryDecision::RetryAfter(delay) => {
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn attempt(&self, model: &str, prompt: &str) -> AttemptOutcome {
        match self.provider.generate(model, prompt).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    AttemptOutcome::ServiceError("empty response".to_string())
                } else {
                    AttemptOutcome::Success(text.to_string())
                }
            }
            Err(e) if e.is_transport() => AttemptOutcome::TransportError(e.to_string()),
            Err(e) => AttemptOutcome::ServiceError(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedProvider, Step};

    fn client(provider: Arc<ScriptedProvider>, max_attempts: u32) -> InferenceClient {
        InferenceClient::new(
            provider,
            RetryPolicy {
                max_attempts,
                delay: Duration::ZERO,
            },
        )
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Step::Transport,
            Step::Service,
            Step::Reply("  Problema de Red \n"),
        ]));
        let client = client(provider.clone(), 3);

        let result = client
            .infer("gemma:2b", "prompt", &CancellationToken::new())
            .await;

        assert_eq!(result, InferenceResult::Success("Problema de Red".to_string()));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_always_failing_exhausts_budget() {
        let provider = Arc::new(ScriptedProvider::repeating(Step::Transport));
        let client = client(provider.clone(), 3);

        let result = client
            .infer("gemma:2b", "prompt", &CancellationToken::new())
            .await;

        assert_eq!(provider.calls(), 3);
        assert_eq!(result.clone().into_text(), "ERROR_TRANSPORT[gemma:2b]");
        assert!(matches!(result, InferenceResult::Exhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_last_failure_class_is_reported() {
        let provider = Arc::new(ScriptedProvider::new(vec![Step::Transport, Step::Service]));
        let client = client(provider, 2);

        let result = client
            .infer("phi3", "prompt", &CancellationToken::new())
            .await;

        assert_eq!(result.into_text(), "ERROR_UNEXPECTED[phi3]");
    }

    #[tokio::test]
    async fn test_empty_reply_is_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![Step::Reply("   "), Step::Reply("ok")]));
        let client = client(provider.clone(), 3);

        let result = client
            .infer("gemma:2b", "prompt", &CancellationToken::new())
            .await;

        assert_eq!(result, InferenceResult::Success("ok".to_string()));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt_makes_no_calls() {
        let provider = Arc::new(ScriptedProvider::repeating(Step::Reply("never")));
        let client = client(provider.clone(), 3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = client.infer("gemma:2b", "prompt", &cancel).await;

        assert_eq!(result, InferenceResult::Cancelled);
        assert_eq!(result.into_text(), "CANCELLED");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_after_failed_attempt_stops_retries() {
        let cancel = CancellationToken::new();
        let provider = Arc::new(
            ScriptedProvider::repeating(Step::Transport).cancel_on_call(1, cancel.clone()),
        );
        let client = client(provider.clone(), 5);

        let result = client.infer("gemma:2b", "prompt", &cancel).await;

        assert_eq!(result, InferenceResult::Cancelled);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected_without_calls() {
        let provider = Arc::new(ScriptedProvider::repeating(Step::Reply("x")));
        let client = client(provider.clone(), 3);

        let result = client.infer("gemma:2b", "  ", &CancellationToken::new()).await;

        assert!(matches!(result, InferenceResult::Exhausted { attempts: 0, .. }));
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn test_policy_waits_only_between_attempts() {
        let policy = RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_secs(5),
        };

        assert_eq!(
            policy.decide(1, AttemptOutcome::ServiceError("x".into()), false, "m"),
            RetryDecision::RetryAfter(Duration::from_secs(5))
        );
        assert!(matches!(
            policy.decide(2, AttemptOutcome::ServiceError("x".into()), false, "m"),
            RetryDecision::Finish(InferenceResult::Exhausted { attempts: 2, .. })
        ));
        assert_eq!(
            policy.decide(1, AttemptOutcome::TransportError("x".into()), true, "m"),
            RetryDecision::Finish(InferenceResult::Cancelled)
        );
    }
}
