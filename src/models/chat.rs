//! Chat request models and DTOs

use crate::registry::UseCase;
use crate::safety::ComplianceLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Speaker of one conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Optional per-message bookkeeping supplied by the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    pub timestamp: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

/// One turn in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: MessageRole,
    #[validate(length(min = 1, max = 10000, message = "Message content must be between 1 and 10000 characters"))]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Per-call overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    /// Preferred model id; ignored unless it names a registered model
    pub model: Option<String>,
    #[validate(range(min = 1, message = "maxTokens must be positive"))]
    pub max_tokens: Option<u32>,
    #[validate(range(min = 0.0, max = 2.0, message = "temperature must be between 0 and 2"))]
    pub temperature: Option<f64>,
    #[validate(range(min = 1, message = "timeoutMs must be positive"))]
    pub timeout_ms: Option<u64>,
    pub use_case: Option<UseCase>,
    pub compliance_level: Option<ComplianceLevel>,
}

/// One governed call
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AiRequest {
    #[validate(length(min = 1, message = "At least one message is required"))]
    #[validate(nested)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub config: Option<RequestConfig>,
}

impl AiRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            config: None,
        }
    }

    pub fn with_config(mut self, config: RequestConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// All user-authored text, space separated
    pub fn user_content(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Body of the standalone safety endpoint
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SafetyCheckRequest {
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
    pub context: Option<UseCase>,
    pub compliance_level: Option<ComplianceLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case_request() {
        let request: AiRequest = serde_json::from_value(serde_json::json!({
            "messages": [{ "role": "user", "content": "hello" }],
            "config": { "maxTokens": 256, "timeoutMs": 5000, "useCase": "clinical_documentation" }
        }))
        .unwrap();

        let config = request.config.unwrap();
        assert_eq!(config.max_tokens, Some(256));
        assert_eq!(config.use_case, Some(UseCase::ClinicalDocumentation));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let result: Result<AiRequest, _> = serde_json::from_value(serde_json::json!({
            "messages": [{ "role": "tool", "content": "hello" }]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_user_content_skips_other_roles() {
        let request = AiRequest::new(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("second"),
        ]);
        assert_eq!(request.user_content(), "first second");
    }
}
