//! Governance Pipeline Module
//!
//! Every outbound inference call runs through one ordered pipeline:
//!
//! 1. **Validate**: request shape and bounds
//! 2. **Select**: resolve the model from overrides, defaults and ladders
//! 3. **Preflight**: emergency breaker, cooldown, budget, auth
//! 4. **Safety**: PHI / content scoring (HIPAA mode)
//! 5. **Execute**: response cache, else system prompt, backend call, token
//!    and cost estimate
//! 6. **Record**: usage event, audit trail and budget alerts, failures swallowed

pub mod alerts;
pub mod cache;
pub mod executor;
pub mod orchestrator;
pub mod preflight;
pub mod recorder;
pub mod selector;
pub mod validator;

pub use alerts::DEFAULT_MONTHLY_BUDGET;
pub use cache::DEFAULT_CACHE_MAX_ENTRIES;
pub use orchestrator::GovernancePipeline;

use crate::error::GovernanceError;
use crate::registry::{AppContext, ModelId, UseCase};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_USAGE_CACHE_TTL_MS: u64 = 60_000;

/// Per-application pipeline settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub app: AppContext,
    pub use_case: UseCase,
    pub default_model: Option<ModelId>,
    pub hipaa_compliant: bool,
    pub enable_safety_filtering: bool,
    pub enable_rate_limiting: bool,
    pub enable_usage_monitoring: bool,
    pub enable_audit_logging: bool,
    pub enable_response_cache: bool,
    pub cache_max_entries: usize,
    pub default_timeout: Duration,
    pub usage_cache_ttl: Duration,
    /// Monthly spend the budget alerts measure against
    pub monthly_budget: f64,
}

impl GatewayConfig {
    pub fn new(app: AppContext) -> Self {
        Self {
            app,
            use_case: UseCase::RealTimeChat,
            default_model: None,
            hipaa_compliant: true,
            enable_safety_filtering: true,
            enable_rate_limiting: true,
            enable_usage_monitoring: true,
            enable_audit_logging: true,
            enable_response_cache: true,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            usage_cache_ttl: Duration::from_millis(DEFAULT_USAGE_CACHE_TTL_MS),
            monthly_budget: DEFAULT_MONTHLY_BUDGET,
        }
    }

    pub fn validate(&self) -> Result<(), GovernanceError> {
        if self.hipaa_compliant && !self.enable_safety_filtering {
            return Err(GovernanceError::InvalidConfig(
                "HIPAA-compliant mode requires safety filtering".to_string(),
            ));
        }
        if self.monthly_budget < 0.0 {
            return Err(GovernanceError::InvalidConfig(
                "monthly budget must not be negative".to_string(),
            ));
        }
        if self.default_timeout.is_zero() {
            return Err(GovernanceError::InvalidConfig(
                "default timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Who is making the call
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub user_id: Option<String>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: Some(id.into()),
        }
    }
}
