//! Application state management
//!
//! Contains shared state accessible across all handlers: one governance
//! pipeline per tenant application, all sharing the breaker and stores.

use crate::backend::InferenceBackend;
use crate::config::GatewayDefaults;
use crate::emergency::EmergencySwitch;
use crate::error::GovernanceError;
use crate::pipeline::GovernancePipeline;
use crate::registry::{AppContext, ModelRegistry};
use crate::safety::SafetyFilter;
use crate::store::{AuditSink, UsageStore};
use std::collections::HashMap;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    pub registry: Arc<ModelRegistry>,

    /// Governed pipeline per tenant application
    pub pipelines: HashMap<AppContext, GovernancePipeline>,

    /// Filter behind the standalone safety endpoint
    pub safety: SafetyFilter,

    /// Operator-controlled breaker read by every pipeline
    pub emergency: Arc<EmergencySwitch>,

    pub usage: Arc<dyn UsageStore>,

    /// JWT secret key for token validation
    pub jwt_secret: String,
}

impl AppState {
    pub fn new(
        registry: Arc<ModelRegistry>,
        defaults: &GatewayDefaults,
        backend: Arc<dyn InferenceBackend>,
        usage: Arc<dyn UsageStore>,
        audit: Arc<dyn AuditSink>,
        jwt_secret: String,
    ) -> Result<Self, GovernanceError> {
        let emergency = EmergencySwitch::shared();

        let mut pipelines = HashMap::new();
        for app in AppContext::ALL {
            let pipeline = GovernancePipeline::new(
                defaults.for_app(app),
                registry.clone(),
                backend.clone(),
                emergency.clone(),
                usage.clone(),
                audit.clone(),
            )?;
            pipelines.insert(app, pipeline);
        }

        Ok(Self {
            registry,
            pipelines,
            safety: SafetyFilter::default(),
            emergency,
            usage,
            jwt_secret,
        })
    }

    pub fn pipeline(&self, app: AppContext) -> Option<&GovernancePipeline> {
        self.pipelines.get(&app)
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
