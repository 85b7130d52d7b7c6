//! Request shape validation

use crate::error::GovernanceError;
use crate::models::AiRequest;
use serde_json::Value;
use validator::Validate;

/// Check bounds on an already-typed request
pub fn validate_request(request: &AiRequest) -> Result<(), GovernanceError> {
    request.validate()?;
    Ok(())
}

/// Deserialize and validate an untyped payload
pub fn parse_request(payload: Value) -> Result<AiRequest, GovernanceError> {
    let request: AiRequest =
        serde_json::from_value(payload).map_err(|e| GovernanceError::invalid_request(e.to_string()))?;
    validate_request(&request)?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::models::{ChatMessage, RequestConfig};
    use serde_json::json;

    #[test]
    fn test_empty_messages_rejected() {
        let err = validate_request(&AiRequest::new(vec![])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_content_bounds() {
        assert!(validate_request(&AiRequest::new(vec![ChatMessage::user("")])).is_err());
        assert!(validate_request(&AiRequest::new(vec![ChatMessage::user("x".repeat(10_000))])).is_ok());
        assert!(validate_request(&AiRequest::new(vec![ChatMessage::user("x".repeat(10_001))])).is_err());
    }

    #[test]
    fn test_temperature_bounds() {
        let request = AiRequest::new(vec![ChatMessage::user("hi")]).with_config(RequestConfig {
            temperature: Some(2.5),
            ..Default::default()
        });
        let err = validate_request(&request).unwrap_err();
        assert!(err.details().is_some());
    }

    #[test]
    fn test_parse_rejects_bad_shape() {
        let err = parse_request(json!({ "messages": "hello" })).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);

        let ok = parse_request(json!({ "messages": [{ "role": "user", "content": "hello" }] }));
        assert!(ok.is_ok());
    }
}
