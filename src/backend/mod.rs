//! Inference backends

pub mod cloudflare;

pub use cloudflare::CloudflareBackend;

use crate::models::{ChatMessage, RequestConfig};
use crate::registry::ModelId;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Unexpected response format from AI model")]
    UnexpectedFormat,
}

/// Runs one completion against a concrete provider
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn invoke(
        &self,
        model: ModelId,
        messages: &[ChatMessage],
        config: Option<&RequestConfig>,
    ) -> Result<String, BackendError>;
}
