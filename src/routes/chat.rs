//! Governed chat endpoint

use crate::auth::{bearer_claims, require_role, Role};
use crate::error::{ApiResult, AppError};
use crate::models::AiResponse;
use crate::pipeline::CallerContext;
use crate::registry::AppContext;
use crate::state::SharedState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde_json::Value;
use tracing::debug;

pub(super) fn parse_app(app: &str) -> Result<AppContext, AppError> {
    app.parse::<AppContext>()
        .map_err(|_| AppError::NotFound(format!("Unknown application '{}'", app)))
}

/// Run one chat request through the application's pipeline.
///
/// Malformed bodies still produce an envelope (`INVALID_REQUEST`).
pub async fn chat(
    State(state): State<SharedState>,
    Path(app): Path<String>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<AiResponse<String>>)> {
    let app = parse_app(&app)?;
    let pipeline = state
        .pipeline(app)
        .ok_or_else(|| AppError::NotFound(format!("No pipeline for {}", app)))?;

    let caller = match bearer_claims(&state.jwt_secret, bearer)? {
        Some(claims) => {
            require_role(&claims, Role::Clinician)?;
            CallerContext::user(claims.sub)
        }
        None => CallerContext::anonymous(),
    };

    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    debug!("Chat request for {} (authenticated: {})", app, caller.user_id.is_some());

    let response = pipeline.chat_json(payload, &caller).await;
    let status = response
        .error_code()
        .map(|code| code.http_status())
        .unwrap_or(StatusCode::OK);

    Ok((status, Json(response)))
}
