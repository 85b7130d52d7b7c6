//! Orchestrator - runs one governed call start to finish

use super::alerts::CostMonitor;
use super::cache::{cache_key, CacheStats, ResponseCache};
use super::executor::{estimate_cost, estimate_tokens, Execution, Executor};
use super::preflight::{Admission, BudgetReservation, PreflightGuard, SpendLedger};
use super::recorder::{CallOutcome, Recorder};
use super::selector::select_model;
use super::validator::{parse_request, validate_request};
use super::{CallerContext, GatewayConfig};
use crate::backend::InferenceBackend;
use crate::emergency::EmergencyMonitor;
use crate::error::GovernanceError;
use crate::models::{AiRequest, AiResponse, ResponseMeta};
use crate::registry::{ModelId, ModelRegistry, UseCase, FALLBACK_MODEL};
use crate::safety::{ComplianceLevel, SafetyFilter};
use crate::store::{AuditSink, UsageStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Facts gathered while the call runs, kept even when it fails
#[derive(Debug, Default)]
struct CallTrace {
    model: Option<ModelId>,
    safety_score: Option<f64>,
    contains_phi: bool,
    cached: bool,
}

pub struct GovernancePipeline {
    config: GatewayConfig,
    registry: Arc<ModelRegistry>,
    safety: SafetyFilter,
    guard: PreflightGuard,
    executor: Executor,
    recorder: Recorder,
    cache: Option<ResponseCache>,
}

impl GovernancePipeline {
    pub fn new(
        config: GatewayConfig,
        registry: Arc<ModelRegistry>,
        backend: Arc<dyn InferenceBackend>,
        emergency: Arc<dyn EmergencyMonitor>,
        usage: Arc<dyn UsageStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, GovernanceError> {
        config.validate()?;
        let Some(daily_budget) = registry.app(config.app).map(|a| a.daily_budget) else {
            return Err(GovernanceError::InvalidConfig(format!(
                "no limits configured for {}",
                config.app
            )));
        };

        let default_level = if config.hipaa_compliant {
            ComplianceLevel::Strict
        } else {
            ComplianceLevel::Standard
        };
        let ledger = SpendLedger::new(config.app, usage.clone(), config.usage_cache_ttl);
        let guard = PreflightGuard::new(
            emergency,
            ledger,
            config.enable_rate_limiting,
            config.hipaa_compliant,
        );
        let monitor = CostMonitor::new(config.app, daily_budget, config.monthly_budget, usage.clone());
        let recorder = Recorder::new(
            config.app,
            usage,
            audit,
            config.enable_usage_monitoring,
            config.hipaa_compliant && config.enable_audit_logging,
            config.enable_audit_logging,
        )
        .with_cost_monitor(monitor);
        let cache = config
            .enable_response_cache
            .then(|| ResponseCache::for_app(config.app, config.cache_max_entries));

        Ok(Self {
            cache,
            safety: SafetyFilter::new(default_level),
            guard,
            executor: Executor::new(backend),
            recorder,
            registry,
            config,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn safety(&self) -> &SafetyFilter {
        &self.safety
    }

    /// Response cache counters, when caching is on
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(ResponseCache::stats)
    }

    /// Governed chat completion. Always returns an envelope.
    pub async fn chat(&self, request: AiRequest, caller: &CallerContext) -> AiResponse<String> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let mut trace = CallTrace::default();

        let result = self.run(&request, caller, request_id, &mut trace).await;
        self.finish(request_id, started, trace, result, caller).await
    }

    /// Same as `chat`, for payloads that have not been deserialized yet
    pub async fn chat_json(&self, payload: Value, caller: &CallerContext) -> AiResponse<String> {
        match parse_request(payload) {
            Ok(request) => self.chat(request, caller).await,
            Err(e) => {
                self.finish(Uuid::new_v4(), Instant::now(), CallTrace::default(), Err(e), caller)
                    .await
            }
        }
    }

    async fn run(
        &self,
        request: &AiRequest,
        caller: &CallerContext,
        request_id: Uuid,
        trace: &mut CallTrace,
    ) -> Result<(Execution, BudgetReservation), GovernanceError> {
        validate_request(request)?;

        let overrides = request.config.as_ref();
        let use_case = overrides
            .and_then(|c| c.use_case)
            .unwrap_or(self.config.use_case);

        let model_id = select_model(
            &self.registry,
            overrides.and_then(|c| c.model.as_deref()),
            self.config.default_model,
            use_case,
        );
        trace.model = Some(model_id);
        debug!("Request {} routed to {} for {}", request_id, model_id, use_case.as_str());

        let model = self
            .registry
            .model(model_id)
            .ok_or_else(|| GovernanceError::ModelUnavailable {
                model: model_id,
                reason: "model is not registered".to_string(),
            })?;
        let app = self
            .registry
            .app(self.config.app)
            .ok_or_else(|| GovernanceError::InvalidConfig(format!("no limits configured for {}", self.config.app)))?;

        // Prompt-only estimate; completion tokens are unknown before the call.
        let estimated_cost = estimate_cost(model, estimate_tokens(&request.messages, ""));

        let reservation = self
            .guard
            .admit(Admission {
                app,
                model,
                estimated_cost,
                user_id: caller.user_id.as_deref(),
            })
            .await?;

        if self.config.hipaa_compliant {
            let level = overrides
                .and_then(|c| c.compliance_level)
                .unwrap_or(self.safety.default_level());
            self.check_safety(request, use_case, level, caller, request_id, trace)
                .await?;
        }

        let timeout = overrides
            .and_then(|c| c.timeout_ms)
            .map(Duration::from_millis)
            .unwrap_or(self.config.default_timeout);

        // Governance above still runs for cached content; only the backend is skipped.
        let key = self
            .cache
            .as_ref()
            .map(|_| cache_key(model_id, use_case, &request.messages, overrides));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(content) = cache.get(key) {
                debug!("Request {} served from response cache", request_id);
                trace.cached = true;
                return Ok((
                    Execution {
                        content,
                        tokens_used: 0,
                        cost: 0.0,
                    },
                    reservation,
                ));
            }
        }

        let execution = self
            .executor
            .execute(&self.registry, model, use_case, &request.messages, overrides, timeout)
            .await?;

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.insert(key, &execution);
        }

        Ok((execution, reservation))
    }

    async fn check_safety(
        &self,
        request: &AiRequest,
        use_case: UseCase,
        level: ComplianceLevel,
        caller: &CallerContext,
        request_id: Uuid,
        trace: &mut CallTrace,
    ) -> Result<(), GovernanceError> {
        let result = self
            .safety
            .check(&request.user_content(), Some(use_case), Some(level))?;
        trace.safety_score = Some(result.score);
        trace.contains_phi = result.contains_phi;

        if !result.safe {
            return Err(GovernanceError::SafetyViolation {
                score: result.score,
                reasons: result.reasons,
            });
        }

        self.recorder
            .record_safety_pass(request_id, caller.user_id.as_deref(), result.score, result.contains_phi)
            .await;
        Ok(())
    }

    async fn finish(
        &self,
        request_id: Uuid,
        started: Instant,
        trace: CallTrace,
        result: Result<(Execution, BudgetReservation), GovernanceError>,
        caller: &CallerContext,
    ) -> AiResponse<String> {
        let response_time_ms = started.elapsed().as_millis() as u64;
        let model = trace.model.unwrap_or(FALLBACK_MODEL);

        let mut meta = ResponseMeta::new(request_id, model);
        meta.response_time = Some(response_time_ms);
        meta.safety_score = trace.safety_score;
        meta.cached = trace.cached.then_some(true);

        let mut outcome = CallOutcome {
            request_id,
            model,
            user_id: caller.user_id.clone(),
            tokens_used: 0,
            cost: 0.0,
            response_time_ms,
            error_code: None,
            safety_score: trace.safety_score,
            contains_phi: trace.contains_phi,
        };

        match result {
            Ok((execution, reservation)) => {
                outcome.tokens_used = execution.tokens_used;
                outcome.cost = execution.cost;
                meta.tokens_used = Some(execution.tokens_used);
                meta.cost = Some(execution.cost);

                let alerts = self.recorder.record_call(&outcome).await;
                if !alerts.is_empty() {
                    debug!("Request {} raised {} budget alert(s)", request_id, alerts.len());
                }
                reservation.settle();

                info!(
                    "AI request {} for {} completed with {} in {}ms",
                    request_id, self.config.app, model, response_time_ms
                );
                AiResponse::ok(execution.content, meta)
            }
            Err(err) => {
                outcome.error_code = Some(err.code());
                self.recorder.record_call(&outcome).await;

                warn!(
                    "AI request {} for {} failed: {} ({})",
                    request_id,
                    self.config.app,
                    err.code().as_str(),
                    err
                );
                AiResponse::failure(&err, meta)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::emergency::{EmergencyState, EmergencySwitch};
    use crate::error::ErrorCode;
    use crate::models::{ChatMessage, RequestConfig};
    use crate::registry::{catalog_profile, AppContext};
    use crate::store::{
        sample_event, AuditAction, MemoryAuditSink, MemoryUsageStore, StoreError, UsageAggregate, UsageEvent,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo;

    #[async_trait]
    impl InferenceBackend for Echo {
        async fn invoke(
            &self,
            _model: ModelId,
            messages: &[ChatMessage],
            _config: Option<&crate::models::RequestConfig>,
        ) -> Result<String, BackendError> {
            Ok(format!("echo: {}", messages.last().map(|m| m.content.as_str()).unwrap_or("")))
        }
    }

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceBackend for Counting {
        async fn invoke(
            &self,
            _model: ModelId,
            _messages: &[ChatMessage],
            _config: Option<&crate::models::RequestConfig>,
        ) -> Result<String, BackendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("answer #{}", n))
        }
    }

    struct Failing;

    #[async_trait]
    impl InferenceBackend for Failing {
        async fn invoke(
            &self,
            _model: ModelId,
            _messages: &[ChatMessage],
            _config: Option<&crate::models::RequestConfig>,
        ) -> Result<String, BackendError> {
            Err(BackendError::Model("capacity".into()))
        }
    }

    struct DeadStore;

    #[async_trait]
    impl UsageStore for DeadStore {
        async fn record(&self, _event: &UsageEvent) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn aggregate(&self, _app: AppContext, _since: DateTime<Utc>) -> Result<UsageAggregate, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[async_trait]
    impl AuditSink for DeadStore {
        async fn append(&self, _record: &crate::store::AuditRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    struct Harness {
        pipeline: GovernancePipeline,
        switch: Arc<EmergencySwitch>,
        usage: Arc<MemoryUsageStore>,
        audit: Arc<MemoryAuditSink>,
    }

    fn harness(config: GatewayConfig, backend: Arc<dyn InferenceBackend>) -> Harness {
        harness_with(config, ModelRegistry::builtin(), backend)
    }

    fn harness_with(config: GatewayConfig, registry: ModelRegistry, backend: Arc<dyn InferenceBackend>) -> Harness {
        let switch = EmergencySwitch::shared();
        let usage = Arc::new(MemoryUsageStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let pipeline = GovernancePipeline::new(
            config,
            Arc::new(registry),
            backend,
            switch.clone(),
            usage.clone(),
            audit.clone(),
        )
        .unwrap();
        Harness {
            pipeline,
            switch,
            usage,
            audit,
        }
    }

    fn open_config() -> GatewayConfig {
        let mut config = GatewayConfig::new(AppContext::Staff);
        config.hipaa_compliant = false;
        config.enable_rate_limiting = false;
        config
    }

    fn hello() -> AiRequest {
        AiRequest::new(vec![ChatMessage::user("What time does the clinic open?")])
    }

    #[tokio::test]
    async fn test_successful_call_is_metered() {
        let h = harness(open_config(), Arc::new(Echo));
        let response = h.pipeline.chat(hello(), &CallerContext::anonymous()).await;

        assert!(response.success);
        assert_eq!(response.data.as_deref(), Some("echo: What time does the clinic open?"));
        assert_eq!(response.meta.model, ModelId::Llama33_70bFast);
        assert!(response.meta.tokens_used.unwrap() > 0);

        let events = h.usage.events().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
        assert_eq!(events[0].request_id, response.meta.request_id);
    }

    #[tokio::test]
    async fn test_invalid_payload_still_gets_envelope() {
        let h = harness(open_config(), Arc::new(Echo));
        let response = h
            .pipeline
            .chat_json(json!({ "messages": [] }), &CallerContext::anonymous())
            .await;

        assert!(!response.success);
        assert_eq!(response.error_code(), Some(ErrorCode::InvalidRequest));
        assert_eq!(response.meta.model, FALLBACK_MODEL);
        assert_eq!(h.usage.events().await[0].error_code, Some(ErrorCode::InvalidRequest));
    }

    #[tokio::test]
    async fn test_emergency_stop_blocks_backend() {
        let h = harness(open_config(), Arc::new(Failing));
        h.switch.set(EmergencyState::EmergencyStop);

        let response = h.pipeline.chat(hello(), &CallerContext::anonymous()).await;
        assert_eq!(response.error_code(), Some(ErrorCode::EmergencyStop));
    }

    #[tokio::test]
    async fn test_backend_failure_is_model_unavailable() {
        let h = harness(open_config(), Arc::new(Failing));
        let response = h.pipeline.chat(hello(), &CallerContext::anonymous()).await;

        assert_eq!(response.error_code(), Some(ErrorCode::ModelUnavailable));
        let error = response.error.unwrap();
        assert_eq!(error.details.unwrap()["model"], json!("llama-3.3-70b-instruct-fp8-fast"));
    }

    #[tokio::test]
    async fn test_hipaa_requires_user() {
        let mut config = GatewayConfig::new(AppContext::Staff);
        config.enable_rate_limiting = false;
        let h = harness(config, Arc::new(Echo));

        let response = h.pipeline.chat(hello(), &CallerContext::anonymous()).await;
        assert_eq!(response.error_code(), Some(ErrorCode::AuthenticationRequired));

        let response = h.pipeline.chat(hello(), &CallerContext::user("u-1")).await;
        assert!(response.success);
        assert_eq!(response.meta.safety_score, Some(1.0));

        let actions: Vec<_> = h.audit.records().await.iter().map(|r| r.action).collect();
        assert!(actions.contains(&AuditAction::SafetyCheck));
        assert!(actions.contains(&AuditAction::AiInteraction));
    }

    #[tokio::test]
    async fn test_phi_rejected_in_hipaa_mode() {
        let mut config = GatewayConfig::new(AppContext::Staff);
        config.enable_rate_limiting = false;
        let h = harness(config, Arc::new(Echo));

        let request = AiRequest::new(vec![ChatMessage::user("Patient SSN is 123-45-6789")]);
        let response = h.pipeline.chat(request, &CallerContext::user("u-1")).await;

        assert_eq!(response.error_code(), Some(ErrorCode::SafetyViolation));
        let events = h.usage.events().await;
        assert!(events[0].contains_phi);
        assert!(!events[0].success);
    }

    #[tokio::test]
    async fn test_compliance_override_relaxes_check() {
        let mut config = GatewayConfig::new(AppContext::Staff);
        config.enable_rate_limiting = false;
        let h = harness(config, Arc::new(Echo));

        let request = AiRequest::new(vec![ChatMessage::user("Reach me at pat@example.com")]).with_config(
            RequestConfig {
                compliance_level: Some(ComplianceLevel::None),
                ..Default::default()
            },
        );
        let response = h.pipeline.chat(request, &CallerContext::user("u-1")).await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_recording_failures_do_not_fail_call() {
        let pipeline = GovernancePipeline::new(
            open_config(),
            Arc::new(ModelRegistry::builtin()),
            Arc::new(Echo),
            EmergencySwitch::shared(),
            Arc::new(DeadStore),
            Arc::new(DeadStore),
        )
        .unwrap();

        let response = pipeline.chat(hello(), &CallerContext::anonymous()).await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_registered_override_is_used() {
        let h = harness(open_config(), Arc::new(Echo));
        let request = hello().with_config(RequestConfig {
            model: Some("llama-3.2-1b-instruct".into()),
            ..Default::default()
        });
        let response = h.pipeline.chat(request, &CallerContext::anonymous()).await;
        assert_eq!(response.meta.model, ModelId::Llama32_1b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_between_calls() {
        let mut config = open_config();
        config.enable_rate_limiting = true;
        config.default_model = Some(ModelId::Llama4Scout);
        let h = harness(config, Arc::new(Echo));

        assert!(h.pipeline.chat(hello(), &CallerContext::anonymous()).await.success);
        tokio::time::advance(Duration::from_millis(400)).await;

        let response = h.pipeline.chat(hello(), &CallerContext::anonymous()).await;
        assert_eq!(response.error_code(), Some(ErrorCode::RateLimitExceeded));
        let wait = response.error.unwrap().details.unwrap()["waitTimeMs"].as_u64().unwrap();
        assert!((590..=600).contains(&wait));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = GatewayConfig::new(AppContext::Staff);
        config.enable_safety_filtering = false;
        let result = GovernancePipeline::new(
            config,
            Arc::new(ModelRegistry::builtin()),
            Arc::new(Echo),
            EmergencySwitch::shared(),
            Arc::new(MemoryUsageStore::new()),
            Arc::new(MemoryAuditSink::new()),
        );
        assert_eq!(result.err().map(|e| e.code()), Some(ErrorCode::InvalidConfig));
    }

    #[tokio::test]
    async fn test_repeat_request_served_from_cache() {
        let backend = Arc::new(Counting::default());
        let h = harness(open_config(), backend.clone());

        let first = h.pipeline.chat(hello(), &CallerContext::anonymous()).await;
        assert_eq!(first.data.as_deref(), Some("answer #1"));
        assert_eq!(first.meta.cached, None);

        let again = AiRequest::new(vec![ChatMessage::user("  what time does the clinic OPEN? ")]);
        let second = h.pipeline.chat(again, &CallerContext::anonymous()).await;
        assert!(second.success);
        assert_eq!(second.data.as_deref(), Some("answer #1"));
        assert_eq!(second.meta.cached, Some(true));
        assert_eq!(second.meta.cost, Some(0.0));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        let events = h.usage.events().await;
        assert_eq!(events.len(), 2);
        assert!(events[1].success);
        assert_eq!(events[1].cost, 0.0);

        let stats = h.pipeline.cache_stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_cache_can_be_disabled() {
        let backend = Arc::new(Counting::default());
        let mut config = open_config();
        config.enable_response_cache = false;
        let h = harness(config, backend.clone());

        h.pipeline.chat(hello(), &CallerContext::anonymous()).await;
        let second = h.pipeline.chat(hello(), &CallerContext::anonymous()).await;
        assert_eq!(second.data.as_deref(), Some("answer #2"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert!(h.pipeline.cache_stats().is_none());
    }

    #[tokio::test]
    async fn test_failed_calls_are_not_cached() {
        let h = harness(open_config(), Arc::new(Failing));
        h.pipeline.chat(hello(), &CallerContext::anonymous()).await;
        assert_eq!(h.pipeline.cache_stats().unwrap().entries, 0);
    }

    #[tokio::test]
    async fn test_budget_exceeded_envelope() {
        let mut pricey = catalog_profile(ModelId::Llama33_70bFast).unwrap();
        pricey.cost_per_token = 0.1;
        let mut staff = ModelRegistry::builtin().app(AppContext::Staff).cloned().unwrap();
        staff.daily_budget = 10.0;
        let registry = ModelRegistry::builtin().with_models(vec![pricey]).with_app(staff);

        let backend = Arc::new(Counting::default());
        let h = harness_with(open_config(), registry, backend.clone());
        h.usage
            .record(&sample_event(AppContext::Staff, ModelId::Llama33_70bFast, 9.2, true))
            .await
            .unwrap();

        let response = h.pipeline.chat(hello(), &CallerContext::anonymous()).await;

        assert!(!response.success);
        assert_eq!(response.error_code(), Some(ErrorCode::BudgetExceeded));
        assert_eq!(response.meta.model, ModelId::Llama33_70bFast);
        let details = response.error.unwrap().details.unwrap();
        assert!((details["currentUsage"].as_f64().unwrap() - 9.2).abs() < 1e-9);
        assert!((details["limit"].as_f64().unwrap() - 9.5).abs() < 1e-9);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        let events = h.usage.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].error_code, Some(ErrorCode::BudgetExceeded));
        assert!(!events[1].success);
    }
}
