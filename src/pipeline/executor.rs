//! Backend invocation

use crate::backend::InferenceBackend;
use crate::error::GovernanceError;
use crate::models::{ChatMessage, MessageRole, RequestConfig};
use crate::registry::{ModelProfile, ModelRegistry, UseCase};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Rough token count: total characters of input and output over four
pub fn estimate_tokens(messages: &[ChatMessage], response: &str) -> u64 {
    let input_chars: usize = messages.iter().map(|m| m.content.chars().count()).sum();
    let separators = messages.len().saturating_sub(1);
    let total = input_chars + separators + response.chars().count();
    total.div_ceil(4) as u64
}

pub fn estimate_cost(model: &ModelProfile, tokens: u64) -> f64 {
    tokens as f64 * model.cost_per_token
}

/// Prepend the use-case prompt unless the caller supplied a system message
pub fn with_system_prompt(registry: &ModelRegistry, use_case: UseCase, messages: &[ChatMessage]) -> Vec<ChatMessage> {
    if messages.iter().any(|m| m.role == MessageRole::System) {
        return messages.to_vec();
    }
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(ChatMessage::system(registry.system_prompt(use_case)));
    out.extend_from_slice(messages);
    out
}

#[derive(Debug, Clone)]
pub struct Execution {
    pub content: String,
    pub tokens_used: u64,
    pub cost: f64,
}

pub struct Executor {
    backend: Arc<dyn InferenceBackend>,
}

/// Cancels the backend task when the call is abandoned
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Executor {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }

    pub async fn execute(
        &self,
        registry: &ModelRegistry,
        model: &ModelProfile,
        use_case: UseCase,
        messages: &[ChatMessage],
        config: Option<&RequestConfig>,
        timeout: Duration,
    ) -> Result<Execution, GovernanceError> {
        let messages = with_system_prompt(registry, use_case, messages);

        // Run on its own task so a panicking provider surfaces as a JoinError
        let backend = self.backend.clone();
        let model_id = model.id;
        let call_messages = messages.clone();
        let call_config = config.cloned();
        let handle = tokio::spawn(async move {
            backend
                .invoke(model_id, &call_messages, call_config.as_ref())
                .await
        });
        let _abort = AbortOnDrop(handle.abort_handle());

        let content = match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(content))) => content,
            Ok(Err(join_err)) => {
                warn!("Backend call for {} did not complete: {}", model.id, join_err);
                return Err(GovernanceError::Unknown(format!(
                    "backend call for {} aborted unexpectedly",
                    model.id
                )));
            }
            Ok(Ok(Err(e))) => {
                warn!("Backend call for {} failed: {}", model.id, e);
                return Err(GovernanceError::ModelUnavailable {
                    model: model.id,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!("Backend call for {} timed out after {:?}", model.id, timeout);
                return Err(GovernanceError::ModelUnavailable {
                    model: model.id,
                    reason: format!("timed out after {}ms", timeout.as_millis()),
                });
            }
        };

        let tokens_used = estimate_tokens(&messages, &content);
        let cost = estimate_cost(model, tokens_used);
        debug!("{} produced ~{} tokens (${:.6})", model.id, tokens_used, cost);

        Ok(Execution {
            content,
            tokens_used,
            cost,
        })
    }
}
