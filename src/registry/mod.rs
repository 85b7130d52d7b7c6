//! Model Registry
//!
//! Static catalog of selectable models, tenant application limits,
//! use-case selection ladders and system prompts. Everything is keyed by
//! closed enumerations; lookups that can miss have an explicit fallback.

mod catalog;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Model used whenever selection exhausts every other option, and for
/// attributing failures that happen before a model was chosen.
pub const FALLBACK_MODEL: ModelId = ModelId::Llama33_70bFast;

/// Use case whose ladder and prompt stand in for use cases without one.
pub const FALLBACK_USE_CASE: UseCase = UseCase::RealTimeChat;

/// Budget share a tenant may commit before new calls are refused.
pub const BUDGET_ADMISSION_RATIO: f64 = 0.95;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Every model the platform knows how to route to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "llama-4-scout-17b-16e-instruct")]
    Llama4Scout,
    #[serde(rename = "llama-3.3-70b-instruct-fp8-fast")]
    Llama33_70bFast,
    #[serde(rename = "llama-guard-3-8b")]
    LlamaGuard3,
    #[serde(rename = "qwq-32b")]
    Qwq32b,
    #[serde(rename = "llama-3.2-11b-vision-instruct")]
    Llama32Vision,
    #[serde(rename = "whisper-large-v3-turbo")]
    WhisperLargeV3Turbo,
    #[serde(rename = "melotts")]
    MeloTts,
    #[serde(rename = "llama-3.2-3b-instruct")]
    Llama32_3b,
    #[serde(rename = "llama-3.2-1b-instruct")]
    Llama32_1b,
    #[serde(rename = "bge-m3")]
    BgeM3,
    #[serde(rename = "bge-reranker-base")]
    BgeRerankerBase,
}

impl ModelId {
    pub const ALL: [ModelId; 11] = [
        ModelId::Llama4Scout,
        ModelId::Llama33_70bFast,
        ModelId::LlamaGuard3,
        ModelId::Qwq32b,
        ModelId::Llama32Vision,
        ModelId::WhisperLargeV3Turbo,
        ModelId::MeloTts,
        ModelId::Llama32_3b,
        ModelId::Llama32_1b,
        ModelId::BgeM3,
        ModelId::BgeRerankerBase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Llama4Scout => "llama-4-scout-17b-16e-instruct",
            ModelId::Llama33_70bFast => "llama-3.3-70b-instruct-fp8-fast",
            ModelId::LlamaGuard3 => "llama-guard-3-8b",
            ModelId::Qwq32b => "qwq-32b",
            ModelId::Llama32Vision => "llama-3.2-11b-vision-instruct",
            ModelId::WhisperLargeV3Turbo => "whisper-large-v3-turbo",
            ModelId::MeloTts => "melotts",
            ModelId::Llama32_3b => "llama-3.2-3b-instruct",
            ModelId::Llama32_1b => "llama-3.2-1b-instruct",
            ModelId::BgeM3 => "bge-m3",
            ModelId::BgeRerankerBase => "bge-reranker-base",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = UnknownId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelId::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownId(s.to_string()))
    }
}

/// Caller-declared purpose driving model choice and system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseCase {
    PatientCommunication,
    ClinicalDocumentation,
    BusinessIntelligence,
    DocumentProcessing,
    DocumentGeneration,
    VoiceProcessing,
    SafetyFiltering,
    RealTimeChat,
    ComplexReasoning,
    Embeddings,
    Reranking,
}

impl UseCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            UseCase::PatientCommunication => "patient_communication",
            UseCase::ClinicalDocumentation => "clinical_documentation",
            UseCase::BusinessIntelligence => "business_intelligence",
            UseCase::DocumentProcessing => "document_processing",
            UseCase::DocumentGeneration => "document_generation",
            UseCase::VoiceProcessing => "voice_processing",
            UseCase::SafetyFiltering => "safety_filtering",
            UseCase::RealTimeChat => "real_time_chat",
            UseCase::ComplexReasoning => "complex_reasoning",
            UseCase::Embeddings => "embeddings",
            UseCase::Reranking => "reranking",
        }
    }
}

impl FromStr for UseCase {
    type Err = UnknownId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| UnknownId(s.to_string()))
    }
}

/// Tenant application on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppContext {
    AiReceptionist,
    ClinicalStaffing,
    CheckinKiosk,
    #[serde(rename = "eos-l10")]
    EosL10,
    Inventory,
    Handouts,
    MedicationAuth,
    PharmaScheduling,
    CallCenterOps,
    BatchCloseout,
    SocialsReviews,
    ComplianceTraining,
    PlatformDashboard,
    ConfigDashboard,
    ComponentShowcase,
    Staff,
    IntegrationStatus,
}

impl AppContext {
    pub const ALL: [AppContext; 17] = [
        AppContext::AiReceptionist,
        AppContext::ClinicalStaffing,
        AppContext::CheckinKiosk,
        AppContext::EosL10,
        AppContext::Inventory,
        AppContext::Handouts,
        AppContext::MedicationAuth,
        AppContext::PharmaScheduling,
        AppContext::CallCenterOps,
        AppContext::BatchCloseout,
        AppContext::SocialsReviews,
        AppContext::ComplianceTraining,
        AppContext::PlatformDashboard,
        AppContext::ConfigDashboard,
        AppContext::ComponentShowcase,
        AppContext::Staff,
        AppContext::IntegrationStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppContext::AiReceptionist => "ai-receptionist",
            AppContext::ClinicalStaffing => "clinical-staffing",
            AppContext::CheckinKiosk => "checkin-kiosk",
            AppContext::EosL10 => "eos-l10",
            AppContext::Inventory => "inventory",
            AppContext::Handouts => "handouts",
            AppContext::MedicationAuth => "medication-auth",
            AppContext::PharmaScheduling => "pharma-scheduling",
            AppContext::CallCenterOps => "call-center-ops",
            AppContext::BatchCloseout => "batch-closeout",
            AppContext::SocialsReviews => "socials-reviews",
            AppContext::ComplianceTraining => "compliance-training",
            AppContext::PlatformDashboard => "platform-dashboard",
            AppContext::ConfigDashboard => "config-dashboard",
            AppContext::ComponentShowcase => "component-showcase",
            AppContext::Staff => "staff",
            AppContext::IntegrationStatus => "integration-status",
        }
    }
}

impl fmt::Display for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppContext {
    type Err = UnknownId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppContext::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownId(s.to_string()))
    }
}

/// Identifier that is not part of the closed catalog
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown identifier: {0}")]
pub struct UnknownId(pub String);

// =============================================================================
// PROFILES
// =============================================================================

/// Per-model throughput and spend limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRateLimits {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub daily_budget: f64,
    /// Minimum spacing between admitted requests, in milliseconds
    pub cooldown_between_requests_ms: Option<u64>,
    pub daily_request_limit: u32,
}

/// One selectable model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelProfile {
    pub id: ModelId,
    pub max_tokens: u32,
    pub cost_per_token: f64,
    pub capabilities: Vec<UseCase>,
    pub tier: u8,
    pub hipaa_compliant: bool,
    pub rate_limits: ModelRateLimits,
}

/// Limits for one tenant application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppProfile {
    pub app: AppContext,
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub daily_budget: f64,
    pub burst_limit: Option<u32>,
    pub cooldown_ms: Option<u64>,
    pub daily_request_limit: u32,
}

impl AppProfile {
    /// Highest projected daily spend that still admits a call
    pub fn admission_limit(&self) -> f64 {
        self.daily_budget * BUDGET_ADMISSION_RATIO
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Lookup tables for models, tenants, selection ladders and prompts
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: HashMap<ModelId, ModelProfile>,
    apps: HashMap<AppContext, AppProfile>,
    selection: HashMap<UseCase, Vec<ModelId>>,
    prompts: HashMap<UseCase, &'static str>,
}

impl ModelRegistry {
    /// The production catalog
    pub fn builtin() -> Self {
        Self {
            models: catalog::model_profiles()
                .into_iter()
                .map(|p| (p.id, p))
                .collect(),
            apps: catalog::app_profiles()
                .into_iter()
                .map(|p| (p.app, p))
                .collect(),
            selection: catalog::selection_ladders().into_iter().collect(),
            prompts: catalog::system_prompts().into_iter().collect(),
        }
    }

    /// Replace the model table, keeping everything else
    pub fn with_models(mut self, models: impl IntoIterator<Item = ModelProfile>) -> Self {
        self.models = models.into_iter().map(|p| (p.id, p)).collect();
        self
    }

    /// Replace (or remove, with an empty list) the ladder for one use case
    pub fn with_ladder(mut self, use_case: UseCase, ladder: Vec<ModelId>) -> Self {
        if ladder.is_empty() {
            self.selection.remove(&use_case);
        } else {
            self.selection.insert(use_case, ladder);
        }
        self
    }

    /// Override one application's limits
    pub fn with_app(mut self, profile: AppProfile) -> Self {
        self.apps.insert(profile.app, profile);
        self
    }

    pub fn model(&self, id: ModelId) -> Option<&ModelProfile> {
        self.models.get(&id)
    }

    pub fn contains(&self, id: ModelId) -> bool {
        self.models.contains_key(&id)
    }

    pub fn app(&self, app: AppContext) -> Option<&AppProfile> {
        self.apps.get(&app)
    }

    /// Candidate ladder for a use case, or the real-time chat ladder
    pub fn candidates(&self, use_case: UseCase) -> &[ModelId] {
        self.selection
            .get(&use_case)
            .or_else(|| self.selection.get(&FALLBACK_USE_CASE))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// System prompt for a use case, or the real-time chat prompt
    pub fn system_prompt(&self, use_case: UseCase) -> &'static str {
        self.prompts
            .get(&use_case)
            .or_else(|| self.prompts.get(&FALLBACK_USE_CASE))
            .copied()
            .unwrap_or(catalog::REAL_TIME_CHAT_PROMPT)
    }

    /// All model profiles, ordered by tier then id
    pub fn models(&self) -> Vec<&ModelProfile> {
        let mut models: Vec<_> = self.models.values().collect();
        models.sort_by(|a, b| a.tier.cmp(&b.tier).then(a.id.as_str().cmp(b.id.as_str())));
        models
    }

    /// All application profiles, ordered by name
    pub fn apps(&self) -> Vec<&AppProfile> {
        let mut apps: Vec<_> = self.apps.values().collect();
        apps.sort_by_key(|a| a.app.as_str());
        apps
    }
}

/// Production profile for one model
pub fn catalog_profile(id: ModelId) -> Option<ModelProfile> {
    catalog::model_profiles().into_iter().find(|p| p.id == id)
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
