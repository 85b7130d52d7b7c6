//! Usage statistics and budget status per application

use super::chat::parse_app;
use crate::error::{ApiResult, AppError};
use crate::models::SuccessResponse;
use crate::pipeline::cache::CacheStats;
use crate::pipeline::preflight::start_of_day;
use crate::registry::{AppContext, ModelId};
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Hour,
    #[default]
    Day,
    Week,
}

impl Timeframe {
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Timeframe::Hour => now - Duration::hours(1),
            Timeframe::Day => start_of_day(now),
            Timeframe::Week => now - Duration::days(7),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    Healthy,
    Warning,
    Critical,
    Exceeded,
}

impl BudgetStatus {
    pub fn from_spend(spent: f64, daily_budget: f64) -> Self {
        if daily_budget <= 0.0 {
            return BudgetStatus::Exceeded;
        }
        let percent = spent / daily_budget * 100.0;
        if percent >= 100.0 {
            BudgetStatus::Exceeded
        } else if percent >= 90.0 {
            BudgetStatus::Critical
        } else if percent >= 75.0 {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Healthy
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    #[serde(default)]
    pub timeframe: Timeframe,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    pub model: ModelId,
    pub requests: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub app: AppContext,
    pub timeframe: Timeframe,
    pub since: DateTime<Utc>,
    pub total_requests: u64,
    pub total_cost: f64,
    pub average_response_time_ms: f64,
    pub success_rate: f64,
    pub top_models: Vec<ModelUsage>,
    pub daily_budget: f64,
    pub spent_today: f64,
    pub remaining_budget: f64,
    pub budget_status: BudgetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
}

pub async fn usage_stats(
    State(state): State<SharedState>,
    Path(app): Path<String>,
    Query(query): Query<UsageQuery>,
) -> ApiResult<Json<SuccessResponse<UsageReport>>> {
    let app = parse_app(&app)?;
    let profile = state
        .registry
        .app(app)
        .ok_or_else(|| AppError::NotFound(format!("No limits configured for {}", app)))?;

    let now = Utc::now();
    let since = query.timeframe.since(now);
    let window = state
        .usage
        .aggregate(app, since)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read usage: {}", e)))?;
    let today = if query.timeframe == Timeframe::Day {
        window.clone()
    } else {
        state
            .usage
            .aggregate(app, start_of_day(now))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read usage: {}", e)))?
    };

    debug!("{} usage since {}: {} requests", app, since, window.total_requests);

    let report = UsageReport {
        app,
        timeframe: query.timeframe,
        since,
        total_requests: window.total_requests,
        total_cost: window.total_cost,
        average_response_time_ms: window.avg_response_time_ms,
        success_rate: window.success_rate,
        top_models: window
            .top_models(5)
            .into_iter()
            .map(|(model, requests)| ModelUsage { model, requests })
            .collect(),
        daily_budget: profile.daily_budget,
        spent_today: today.total_cost,
        remaining_budget: (profile.daily_budget - today.total_cost).max(0.0),
        budget_status: BudgetStatus::from_spend(today.total_cost, profile.daily_budget),
        cache: state.pipeline(app).and_then(|p| p.cache_stats()),
    };

    Ok(Json(SuccessResponse::with_data("Usage statistics retrieved.", report)))
}
