//! Uniform response envelope returned for every governed call

use crate::error::{ErrorCode, GovernanceError};
use crate::registry::ModelId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Attribution and accounting attached to every envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub model: ModelId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Wall-clock duration of the call, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_score: Option<f64>,
    /// Set when the content came from the response cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
}

impl ResponseMeta {
    pub fn new(request_id: Uuid, model: ModelId) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
            model,
            tokens_used: None,
            cost: None,
            response_time: None,
            safety_score: None,
            cached: None,
        }
    }
}

/// Failure description carried inside an unsuccessful envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&GovernanceError> for ErrorBody {
    fn from(err: &GovernanceError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

/// The only shape a caller ever receives, success or failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub meta: ResponseMeta,
}

impl<T> AiResponse<T> {
    pub fn ok(data: T, meta: ResponseMeta) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta,
        }
    }

    pub fn failure(err: &GovernanceError, meta: ResponseMeta) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody::from(err)),
            meta,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}
