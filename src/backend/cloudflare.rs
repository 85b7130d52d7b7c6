//! Cloudflare Workers AI adapter

use super::{BackendError, InferenceBackend};
use crate::models::{ChatMessage, RequestConfig};
use crate::registry::ModelId;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Workers AI model path serving each catalog model
pub fn workers_model(model: ModelId) -> &'static str {
    match model {
        ModelId::Llama4Scout => "@cf/meta/llama-3.1-8b-instruct",
        ModelId::Llama33_70bFast => "@cf/meta/llama-3.1-8b-instruct-fast",
        ModelId::LlamaGuard3 => "@cf/meta/llama-guard-3-11b-vision-preview",
        ModelId::Qwq32b => "@cf/qwen/qwen1.5-14b-chat-awq",
        ModelId::Llama32Vision => "@cf/meta/llama-3.2-11b-vision-instruct",
        ModelId::Llama32_3b => "@cf/meta/llama-3.2-3b-instruct",
        ModelId::Llama32_1b => "@cf/meta/llama-3.2-1b-instruct",
        ModelId::WhisperLargeV3Turbo => "@cf/openai/whisper",
        ModelId::MeloTts => "@cf/bytedance/stable-diffusion-xl-lightning",
        ModelId::BgeM3 => "@cf/baai/bge-base-en-v1.5",
        ModelId::BgeRerankerBase => "@cf/baai/bge-reranker-base",
    }
}

#[derive(Serialize)]
struct RunMessage<'a> {
    role: crate::models::MessageRole,
    content: &'a str,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    messages: Vec<RunMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Clone)]
pub struct CloudflareBackend {
    client: Client,
    api_base: String,
    account_id: String,
    api_token: String,
}

impl CloudflareBackend {
    pub fn new(api_base: impl Into<String>, account_id: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            account_id: account_id.into(),
            api_token: api_token.into(),
        }
    }

    fn run_url(&self, model: ModelId) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.api_base,
            self.account_id,
            workers_model(model)
        )
    }
}

/// Pull the completion text out of the provider's response variants
pub fn extract_text(body: &Value) -> Result<String, BackendError> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message = body
            .pointer("/errors/0/message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return Err(BackendError::Model(message.to_string()));
    }

    let result = body.get("result").ok_or(BackendError::UnexpectedFormat)?;
    if let Some(text) = result.get("response").and_then(Value::as_str) {
        return Ok(text.to_string());
    }
    if let Some(text) = result.get("text").and_then(Value::as_str) {
        return Ok(text.to_string());
    }
    if let Some(text) = result.as_str() {
        return Ok(text.to_string());
    }
    if let Some(text) = result.pointer("/0/response").and_then(Value::as_str) {
        return Ok(text.to_string());
    }
    Err(BackendError::UnexpectedFormat)
}

#[async_trait]
impl InferenceBackend for CloudflareBackend {
    async fn invoke(
        &self,
        model: ModelId,
        messages: &[ChatMessage],
        config: Option<&RequestConfig>,
    ) -> Result<String, BackendError> {
        let body = RunRequest {
            messages: messages
                .iter()
                .map(|m| RunMessage {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
            max_tokens: config.and_then(|c| c.max_tokens),
            temperature: config.and_then(|c| c.temperature),
        };

        let url = self.run_url(model);
        debug!("Invoking {} via {}", model, workers_model(model));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Workers AI request failed - status: {}, body: {}", status, text);
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: Value = response.json().await?;
        extract_text(&payload).inspect_err(|e| {
            if matches!(e, BackendError::UnexpectedFormat) {
                error!("Unexpected AI response format: {}", payload);
            }
        })
    }
}
