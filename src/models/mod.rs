//! Data models and DTOs (Data Transfer Objects)
//!
//! Contains the governed request types and the response envelope.

pub mod chat;
pub mod envelope;

// Re-export commonly used types
pub use chat::*;
pub use envelope::*;

use serde::Serialize;

/// Generic success response for the non-chat endpoints
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}
