//! Operator control of the emergency breaker

use crate::auth::{require_role, Claims, Role};
use crate::emergency::{EmergencyMonitor, EmergencyState};
use crate::error::ApiResult;
use crate::models::SuccessResponse;
use crate::state::SharedState;
use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct SetEmergencyRequest {
    pub state: EmergencyState,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyStatus {
    pub state: EmergencyState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<EmergencyState>,
}

pub async fn get_emergency(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<SuccessResponse<EmergencyStatus>>> {
    require_role(&claims, Role::Admin)?;

    Ok(Json(SuccessResponse::with_data(
        "Emergency state retrieved.",
        EmergencyStatus {
            state: state.emergency.state(),
            previous: None,
        },
    )))
}

pub async fn set_emergency(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SetEmergencyRequest>,
) -> ApiResult<Json<SuccessResponse<EmergencyStatus>>> {
    require_role(&claims, Role::Admin)?;

    let previous = state.emergency.set(payload.state);
    let reason = payload.reason.as_deref().unwrap_or("no reason given");
    if payload.state == EmergencyState::EmergencyStop {
        warn!("Emergency stop set by {}: {}", claims.sub, reason);
    } else {
        info!("Emergency state {:?} -> {:?} by {}: {}", previous, payload.state, claims.sub, reason);
    }

    Ok(Json(SuccessResponse::with_data(
        "Emergency state updated.",
        EmergencyStatus {
            state: payload.state,
            previous: Some(previous),
        },
    )))
}
