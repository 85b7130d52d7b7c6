//! Usage events and audit records
//!
//! The pipeline writes through these traits; `memory` backs tests and
//! database-less deployments, `postgres` backs production.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryAuditSink, MemoryUsageStore};
pub use postgres::{PgAuditSink, PgUsageStore};

use crate::error::ErrorCode;
use crate::registry::{AppContext, ModelId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Database error: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// One metered call, successful or not
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub app: AppContext,
    pub model: ModelId,
    pub user_id: Option<String>,
    pub request_id: Uuid,
    pub tokens_used: u64,
    pub cost: f64,
    pub response_time_ms: u64,
    pub success: bool,
    pub error_code: Option<ErrorCode>,
    pub safety_score: Option<f64>,
    #[serde(rename = "containsPHI")]
    pub contains_phi: bool,
}

/// Totals over a time window for one application
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAggregate {
    pub total_requests: u64,
    pub total_cost: f64,
    pub per_model: HashMap<ModelId, u64>,
    pub avg_response_time_ms: f64,
    pub success_rate: f64,
}

impl UsageAggregate {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a UsageEvent>) -> Self {
        let mut agg = UsageAggregate::default();
        let mut response_total = 0u64;
        let mut successes = 0u64;

        for event in events {
            agg.total_requests += 1;
            agg.total_cost += event.cost;
            *agg.per_model.entry(event.model).or_default() += 1;
            response_total += event.response_time_ms;
            if event.success {
                successes += 1;
            }
        }

        if agg.total_requests > 0 {
            agg.avg_response_time_ms = response_total as f64 / agg.total_requests as f64;
            agg.success_rate = successes as f64 / agg.total_requests as f64;
        }
        agg
    }

    /// Models by request count, busiest first
    pub fn top_models(&self, limit: usize) -> Vec<(ModelId, u64)> {
        let mut models: Vec<_> = self.per_model.iter().map(|(m, c)| (*m, *c)).collect();
        models.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        models.truncate(limit);
        models
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AiInteraction,
    SafetyCheck,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AiInteraction => "ai_interaction",
            AuditAction::SafetyCheck => "safety_check",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Success,
    Failure,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AuditResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_score: Option<f64>,
    #[serde(rename = "containsPHI")]
    pub contains_phi: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

/// Compliance trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub app: AppContext,
    pub request_id: Uuid,
    pub action: AuditAction,
    pub user_id: Option<String>,
    pub details: AuditDetails,
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn record(&self, event: &UsageEvent) -> Result<(), StoreError>;

    async fn aggregate(&self, app: AppContext, since: DateTime<Utc>) -> Result<UsageAggregate, StoreError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError>;
}

#[cfg(test)]
pub(crate) fn sample_event(app: AppContext, model: ModelId, cost: f64, success: bool) -> UsageEvent {
    UsageEvent {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        app,
        model,
        user_id: None,
        request_id: Uuid::new_v4(),
        tokens_used: 10,
        cost,
        response_time_ms: 100,
        success,
        error_code: None,
        safety_score: None,
        contains_phi: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_aggregate_from_events() {
        let events = vec![
            sample_event(AppContext::Inventory, ModelId::Llama33_70bFast, 0.5, true),
            sample_event(AppContext::Inventory, ModelId::Llama33_70bFast, 0.25, false),
            sample_event(AppContext::Inventory, ModelId::Llama4Scout, 0.25, true),
        ];
        let agg = UsageAggregate::from_events(&events);
        assert_eq!(agg.total_requests, 3);
        assert!((agg.total_cost - 1.0).abs() < 1e-9);
        assert!((agg.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(agg.top_models(1), vec![(ModelId::Llama33_70bFast, 2)]);
    }

    #[test]
    fn test_empty_aggregate() {
        let agg = UsageAggregate::from_events(&[]);
        assert_eq!(agg, UsageAggregate::default());
    }
}
