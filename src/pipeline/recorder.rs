//! Post-call usage and audit recording. Nothing here fails the call.

use super::alerts::{BudgetAlert, CostMonitor};
use crate::error::ErrorCode;
use crate::registry::{AppContext, ModelId};
use crate::store::{AuditAction, AuditDetails, AuditRecord, AuditResult, AuditSink, UsageEvent, UsageStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// What happened on one call, as far as accounting is concerned
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub request_id: Uuid,
    pub model: ModelId,
    pub user_id: Option<String>,
    pub tokens_used: u64,
    pub cost: f64,
    pub response_time_ms: u64,
    pub error_code: Option<ErrorCode>,
    pub safety_score: Option<f64>,
    pub contains_phi: bool,
}

impl CallOutcome {
    pub fn success(&self) -> bool {
        self.error_code.is_none()
    }
}

pub struct Recorder {
    app: AppContext,
    usage: Arc<dyn UsageStore>,
    audit: Arc<dyn AuditSink>,
    record_usage: bool,
    audit_interactions: bool,
    audit_safety_checks: bool,
    cost_monitor: Option<CostMonitor>,
}

impl Recorder {
    pub fn new(
        app: AppContext,
        usage: Arc<dyn UsageStore>,
        audit: Arc<dyn AuditSink>,
        record_usage: bool,
        audit_interactions: bool,
        audit_safety_checks: bool,
    ) -> Self {
        Self {
            app,
            usage,
            audit,
            record_usage,
            audit_interactions,
            audit_safety_checks,
            cost_monitor: None,
        }
    }

    /// Check spend against budget alert thresholds after each metered call
    pub fn with_cost_monitor(mut self, monitor: CostMonitor) -> Self {
        self.cost_monitor = Some(monitor);
        self
    }

    /// Writes the usage event and interaction trail, then returns any budget
    /// alerts the new spend raised.
    pub async fn record_call(&self, outcome: &CallOutcome) -> Vec<BudgetAlert> {
        let mut alerts = Vec::new();
        if self.record_usage {
            let event = UsageEvent {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                app: self.app,
                model: outcome.model,
                user_id: outcome.user_id.clone(),
                request_id: outcome.request_id,
                tokens_used: outcome.tokens_used,
                cost: outcome.cost,
                response_time_ms: outcome.response_time_ms,
                success: outcome.success(),
                error_code: outcome.error_code,
                safety_score: outcome.safety_score,
                contains_phi: outcome.contains_phi,
            };
            match self.usage.record(&event).await {
                Ok(()) => {
                    if let Some(monitor) = &self.cost_monitor {
                        alerts = monitor.check().await;
                    }
                }
                Err(e) => warn!("Failed to record usage event for {}: {}", outcome.request_id, e),
            }
        }

        if self.audit_interactions {
            let result = if outcome.success() {
                AuditResult::Success
            } else {
                AuditResult::Failure
            };
            self.append(AuditRecord {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                app: self.app,
                request_id: outcome.request_id,
                action: AuditAction::AiInteraction,
                user_id: outcome.user_id.clone(),
                details: AuditDetails {
                    result: Some(result),
                    model: Some(outcome.model),
                    cost: Some(outcome.cost),
                    response_time_ms: Some(outcome.response_time_ms),
                    safety_score: outcome.safety_score,
                    contains_phi: outcome.contains_phi,
                    error_code: outcome.error_code,
                },
            })
            .await;
        }
        alerts
    }

    /// Trail entry for a safety check that passed
    pub async fn record_safety_pass(
        &self,
        request_id: Uuid,
        user_id: Option<&str>,
        score: f64,
        contains_phi: bool,
    ) {
        if !self.audit_safety_checks {
            return;
        }
        self.append(AuditRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            app: self.app,
            request_id,
            action: AuditAction::SafetyCheck,
            user_id: user_id.map(str::to_string),
            details: AuditDetails {
                result: Some(AuditResult::Success),
                safety_score: Some(score),
                contains_phi,
                ..Default::default()
            },
        })
        .await;
    }

    async fn append(&self, record: AuditRecord) {
        if let Err(e) = self.audit.append(&record).await {
            warn!(
                "Failed to write {} audit record for {}: {}",
                record.action.as_str(),
                record.request_id,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::alerts::BudgetWindow;
    use crate::store::{sample_event, MemoryAuditSink, MemoryUsageStore, StoreError, UsageAggregate};
    use async_trait::async_trait;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;

    struct Refusing;

    #[async_trait]
    impl UsageStore for Refusing {
        async fn record(&self, _event: &UsageEvent) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read-only".into()))
        }

        async fn aggregate(&self, _app: AppContext, _since: DateTime<Utc>) -> Result<UsageAggregate, StoreError> {
            Ok(UsageAggregate::default())
        }
    }

    #[async_trait]
    impl AuditSink for Refusing {
        async fn append(&self, _record: &AuditRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read-only".into()))
        }
    }

    fn outcome(error_code: Option<ErrorCode>) -> CallOutcome {
        CallOutcome {
            request_id: Uuid::new_v4(),
            model: ModelId::Llama4Scout,
            user_id: Some("u-7".into()),
            tokens_used: 12,
            cost: 0.001,
            response_time_ms: 40,
            error_code,
            safety_score: Some(1.0),
            contains_phi: false,
        }
    }

    #[tokio::test]
    async fn test_failure_recorded_with_code() {
        let usage = Arc::new(MemoryUsageStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let recorder = Recorder::new(AppContext::Staff, usage.clone(), audit.clone(), true, true, true);

        recorder.record_call(&outcome(Some(ErrorCode::ModelUnavailable))).await;

        let events = usage.events().await;
        assert_eq!(events.len(), 1);
        assert!(!events[0].success);
        assert_eq!(events[0].error_code, Some(ErrorCode::ModelUnavailable));

        let records = audit.records().await;
        assert_eq!(records[0].action, AuditAction::AiInteraction);
        assert_eq!(records[0].details.result, Some(AuditResult::Failure));
    }

    #[tokio::test]
    async fn test_disabled_sinks_are_skipped() {
        let usage = Arc::new(MemoryUsageStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let recorder = Recorder::new(AppContext::Staff, usage.clone(), audit.clone(), false, false, false);

        recorder.record_call(&outcome(None)).await;
        recorder.record_safety_pass(Uuid::new_v4(), None, 0.9, false).await;

        assert!(usage.events().await.is_empty());
        assert!(audit.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failures_are_swallowed() {
        let refusing = Arc::new(Refusing);
        let recorder = Recorder::new(AppContext::Staff, refusing.clone(), refusing, true, true, true);
        recorder.record_call(&outcome(None)).await;
        recorder.record_safety_pass(Uuid::new_v4(), Some("u-7"), 0.9, false).await;
    }

    #[tokio::test]
    async fn test_spend_near_budget_raises_alert() {
        let usage = Arc::new(MemoryUsageStore::new());
        usage
            .record(&sample_event(AppContext::Staff, ModelId::Llama4Scout, 12.5, true))
            .await
            .unwrap();
        let monitor = CostMonitor::new(AppContext::Staff, 15.0, 1000.0, usage.clone());
        let recorder = Recorder::new(AppContext::Staff, usage.clone(), Arc::new(MemoryAuditSink::new()), true, false, false)
            .with_cost_monitor(monitor);

        let alerts = recorder.record_call(&outcome(None)).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].window, BudgetWindow::Daily);
        assert!((alerts[0].spent - 12.501).abs() < 1e-9);

        // Same window stays quiet until the cooldown passes
        assert!(recorder.record_call(&outcome(None)).await.is_empty());
    }

    #[tokio::test]
    async fn test_no_alert_without_metering() {
        let usage = Arc::new(MemoryUsageStore::new());
        usage
            .record(&sample_event(AppContext::Staff, ModelId::Llama4Scout, 14.0, true))
            .await
            .unwrap();
        let monitor = CostMonitor::new(AppContext::Staff, 15.0, 1000.0, usage.clone());
        let recorder = Recorder::new(AppContext::Staff, usage, Arc::new(MemoryAuditSink::new()), false, false, false)
            .with_cost_monitor(monitor);

        assert!(recorder.record_call(&outcome(None)).await.is_empty());
    }
}
