//! Error handling module
//!
//! Two layers: `GovernanceError` is the closed taxonomy every pipeline stage
//! raises and the orchestrator folds into a response envelope; `AppError`
//! covers HTTP-level failures outside the pipeline (unknown tenant, bad token).

use crate::registry::ModelId;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

// =============================================================================
// GOVERNANCE TAXONOMY
// =============================================================================

/// Wire code for each governance failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidConfig,
    InvalidRequest,
    EmergencyStop,
    RateLimitExceeded,
    BudgetExceeded,
    AuthenticationRequired,
    SafetyViolation,
    SafetyCheckFailed,
    ModelUnavailable,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::EmergencyStop => "EMERGENCY_STOP",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::BudgetExceeded => "BUDGET_EXCEEDED",
            ErrorCode::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            ErrorCode::SafetyViolation => "SAFETY_VIOLATION",
            ErrorCode::SafetyCheckFailed => "SAFETY_CHECK_FAILED",
            ErrorCode::ModelUnavailable => "MODEL_UNAVAILABLE",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Whether the same call may succeed later without the caller changing it
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimitExceeded | ErrorCode::SafetyCheckFailed | ErrorCode::ModelUnavailable
        )
    }

    /// Transport status used when the envelope is served over HTTP
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ErrorCode::BudgetExceeded => StatusCode::PAYMENT_REQUIRED,
            ErrorCode::SafetyViolation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::ModelUnavailable => StatusCode::BAD_GATEWAY,
            ErrorCode::EmergencyStop | ErrorCode::SafetyCheckFailed => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InvalidConfig | ErrorCode::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Every way a governed call can fail
#[derive(Error, Debug, Clone)]
pub enum GovernanceError {
    #[error("AI service is misconfigured: {0}")]
    InvalidConfig(String),

    #[error("Invalid request format or parameters: {message}")]
    InvalidRequest { message: String },

    #[error("Emergency stop activated due to unusual activity.")]
    EmergencyStop,

    #[error("Request rate limit exceeded. Please try again in {wait_ms}ms.")]
    RateLimitExceeded { wait_ms: u64 },

    #[error("Daily budget limit reached for this application.")]
    BudgetExceeded { current_usage: f64, limit: f64 },

    #[error("Authentication required to use AI features.")]
    AuthenticationRequired,

    #[error("Content failed safety check: {}", reasons.join(", "))]
    SafetyViolation { score: f64, reasons: Vec<String> },

    #[error("Safety check failed: {0}")]
    SafetyCheckFailed(String),

    #[error("Model {model} is currently unavailable: {reason}")]
    ModelUnavailable { model: ModelId, reason: String },

    #[error("{0}")]
    Unknown(String),
}

impl GovernanceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GovernanceError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            GovernanceError::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            GovernanceError::EmergencyStop => ErrorCode::EmergencyStop,
            GovernanceError::RateLimitExceeded { .. } => ErrorCode::RateLimitExceeded,
            GovernanceError::BudgetExceeded { .. } => ErrorCode::BudgetExceeded,
            GovernanceError::AuthenticationRequired => ErrorCode::AuthenticationRequired,
            GovernanceError::SafetyViolation { .. } => ErrorCode::SafetyViolation,
            GovernanceError::SafetyCheckFailed(_) => ErrorCode::SafetyCheckFailed,
            GovernanceError::ModelUnavailable { .. } => ErrorCode::ModelUnavailable,
            GovernanceError::Unknown(_) => ErrorCode::UnknownError,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Structured payload callers need to act on the failure
    pub fn details(&self) -> Option<Value> {
        match self {
            GovernanceError::InvalidRequest { message } => Some(json!({ "validation": message })),
            GovernanceError::RateLimitExceeded { wait_ms } => Some(json!({ "waitTimeMs": wait_ms })),
            GovernanceError::BudgetExceeded { current_usage, limit } => Some(json!({
                "currentUsage": current_usage,
                "limit": limit
            })),
            GovernanceError::SafetyViolation { score, reasons } => Some(json!({
                "score": score,
                "reasons": reasons
            })),
            GovernanceError::ModelUnavailable { model, .. } => Some(json!({ "model": model })),
            _ => None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        GovernanceError::InvalidRequest {
            message: message.into(),
        }
    }
}

impl From<validator::ValidationErrors> for GovernanceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        GovernanceError::invalid_request(errors.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for GovernanceError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        GovernanceError::Unknown("governance state lock poisoned".to_string())
    }
}

// =============================================================================
// HTTP ERRORS
// =============================================================================

/// Service-level error type for non-pipeline routes
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                None,
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                None,
            ),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                msg.clone(),
                None,
            ),
            AppError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                msg.clone(),
                None,
            ),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
        });

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;
