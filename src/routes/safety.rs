//! Standalone content safety check

use crate::error::ApiResult;
use crate::models::SafetyCheckRequest;
use crate::safety::QuickSafetyResult;
use crate::state::SharedState;
use axum::{extract::State, Json};
use tracing::debug;
use validator::Validate;

/// Responds with the bare `{safe, score, containsPHI}` verdict
pub async fn check_content(
    State(state): State<SharedState>,
    Json(payload): Json<SafetyCheckRequest>,
) -> ApiResult<Json<QuickSafetyResult>> {
    payload.validate()?;

    if let Some(context) = payload.context {
        debug!("Safety check requested for {}", context.as_str());
    }
    let result = state.safety.quick_check(&payload.content, payload.compliance_level);
    debug!("Standalone safety check: safe={} score={:.2}", result.safe, result.score);

    Ok(Json(result))
}
