//! Built-in catalog tables

use super::{AppContext, AppProfile, ModelId, ModelProfile, ModelRateLimits, UseCase};

pub(super) const REAL_TIME_CHAT_PROMPT: &str = "You are a real-time assistant for Ganger Dermatology staff. Provide quick, accurate responses to help with daily operations.";

fn model(
    id: ModelId,
    max_tokens: u32,
    cost_per_token: f64,
    capabilities: &[UseCase],
    tier: u8,
    limits: (u32, u32, f64, u64, u32),
) -> ModelProfile {
    let (requests_per_minute, requests_per_hour, daily_budget, cooldown, daily_request_limit) = limits;
    ModelProfile {
        id,
        max_tokens,
        cost_per_token,
        capabilities: capabilities.to_vec(),
        tier,
        hipaa_compliant: true,
        rate_limits: ModelRateLimits {
            requests_per_minute,
            requests_per_hour,
            daily_budget,
            cooldown_between_requests_ms: Some(cooldown),
            daily_request_limit,
        },
    }
}

fn app(
    app: AppContext,
    requests_per_minute: u32,
    requests_per_hour: u32,
    daily_budget: f64,
    burst_limit: Option<u32>,
    daily_request_limit: u32,
) -> AppProfile {
    AppProfile {
        app,
        requests_per_minute,
        requests_per_hour,
        daily_budget,
        burst_limit,
        cooldown_ms: None,
        daily_request_limit,
    }
}

pub(super) fn model_profiles() -> Vec<ModelProfile> {
    use UseCase::*;
    vec![
        model(ModelId::Llama4Scout, 2048, 0.000125, &[PatientCommunication, ClinicalDocumentation, ComplexReasoning], 1, (20, 1000, 50.0, 1000, 1000)),
        model(ModelId::Llama33_70bFast, 1024, 0.000125, &[RealTimeChat, PatientCommunication], 1, (50, 2000, 25.0, 500, 2000)),
        model(ModelId::LlamaGuard3, 512, 0.000011, &[SafetyFiltering], 1, (100, 5000, 10.0, 100, 10000)),
        model(ModelId::Qwq32b, 4096, 0.000087, &[ComplexReasoning, BusinessIntelligence], 2, (10, 500, 20.0, 2000, 200)),
        model(ModelId::Llama32Vision, 2048, 0.00008, &[DocumentProcessing], 2, (15, 400, 15.0, 1500, 400)),
        model(ModelId::WhisperLargeV3Turbo, 1024, 0.00006, &[VoiceProcessing], 2, (30, 1000, 10.0, 500, 1000)),
        model(ModelId::MeloTts, 2048, 0.00005, &[VoiceProcessing], 2, (20, 800, 8.0, 800, 800)),
        model(ModelId::Llama32_3b, 4096, 0.00006, &[PatientCommunication, DocumentGeneration, RealTimeChat], 1, (120, 3600, 20.0, 100, 10000)),
        model(ModelId::Llama32_1b, 2048, 0.00005, &[PatientCommunication, RealTimeChat], 1, (150, 4000, 15.0, 50, 12000)),
        model(ModelId::BgeM3, 512, 0.00002, &[Embeddings], 2, (100, 3000, 5.0, 200, 5000)),
        model(ModelId::BgeRerankerBase, 512, 0.00003, &[Reranking], 2, (100, 3000, 5.0, 200, 5000)),
    ]
}

pub(super) fn app_profiles() -> Vec<AppProfile> {
    vec![
        app(AppContext::AiReceptionist, 100, 2000, 50.0, Some(150), 2000),
        app(AppContext::ClinicalStaffing, 20, 500, 20.0, None, 500),
        app(AppContext::CheckinKiosk, 50, 1000, 25.0, None, 1000),
        app(AppContext::EosL10, 15, 300, 15.0, None, 300),
        app(AppContext::Inventory, 10, 200, 8.0, None, 200),
        app(AppContext::Handouts, 15, 300, 10.0, None, 300),
        app(AppContext::MedicationAuth, 25, 600, 18.0, None, 600),
        app(AppContext::PharmaScheduling, 10, 200, 8.0, None, 200),
        app(AppContext::CallCenterOps, 30, 800, 22.0, None, 800),
        app(AppContext::BatchCloseout, 5, 100, 5.0, None, 100),
        app(AppContext::SocialsReviews, 8, 150, 6.0, None, 150),
        app(AppContext::ComplianceTraining, 12, 250, 10.0, None, 250),
        app(AppContext::PlatformDashboard, 20, 400, 12.0, None, 400),
        app(AppContext::ConfigDashboard, 5, 100, 4.0, None, 100),
        app(AppContext::ComponentShowcase, 3, 50, 2.0, None, 50),
        app(AppContext::Staff, 25, 600, 15.0, None, 600),
        app(AppContext::IntegrationStatus, 8, 150, 5.0, None, 150),
    ]
}

/// Ordered cost/latency/quality ladders; the first registered entry wins
pub(super) fn selection_ladders() -> Vec<(UseCase, Vec<ModelId>)> {
    use ModelId::*;
    vec![
        (UseCase::PatientCommunication, vec![Llama4Scout, Llama33_70bFast]),
        (UseCase::ClinicalDocumentation, vec![Llama4Scout]),
        (UseCase::BusinessIntelligence, vec![Qwq32b, Llama4Scout]),
        (UseCase::DocumentProcessing, vec![Llama32Vision, BgeM3, BgeRerankerBase]),
        (UseCase::DocumentGeneration, vec![Llama4Scout, Llama32_3b]),
        (UseCase::VoiceProcessing, vec![WhisperLargeV3Turbo, MeloTts]),
        (UseCase::SafetyFiltering, vec![LlamaGuard3]),
        (UseCase::RealTimeChat, vec![Llama33_70bFast, Llama4Scout]),
        (UseCase::ComplexReasoning, vec![Qwq32b, Llama4Scout]),
        (UseCase::Embeddings, vec![BgeM3]),
        (UseCase::Reranking, vec![BgeRerankerBase]),
    ]
}

pub(super) fn system_prompts() -> Vec<(UseCase, &'static str)> {
    vec![
        (
            UseCase::PatientCommunication,
            "You are a professional medical assistant for Ganger Dermatology. Provide helpful, accurate, and empathetic responses to patient inquiries. Always maintain HIPAA compliance and patient privacy.",
        ),
        (
            UseCase::ClinicalDocumentation,
            "You are a clinical documentation assistant. Help create accurate, comprehensive medical documentation while maintaining professional standards and HIPAA compliance.",
        ),
        (
            UseCase::BusinessIntelligence,
            "You are a business intelligence assistant for healthcare operations. Analyze data, provide insights, and help optimize clinical and business processes.",
        ),
        (
            UseCase::DocumentProcessing,
            "You are a document processing assistant. Extract, analyze, and process medical documents accurately while maintaining data integrity and compliance.",
        ),
        (
            UseCase::DocumentGeneration,
            "You are a document generation assistant. Create professional medical documents, patient handouts, and educational materials while ensuring accuracy and compliance.",
        ),
        (
            UseCase::VoiceProcessing,
            "You are a voice processing assistant. Convert speech to text and text to speech accurately for medical communications.",
        ),
        (
            UseCase::SafetyFiltering,
            "You are a safety and compliance assistant. Ensure all content meets HIPAA requirements and contains no PHI exposure risks.",
        ),
        (UseCase::RealTimeChat, REAL_TIME_CHAT_PROMPT),
        (
            UseCase::ComplexReasoning,
            "You are an advanced reasoning assistant. Analyze complex problems, provide detailed solutions, and help with strategic decision-making.",
        ),
        (
            UseCase::Embeddings,
            "You are an embedding generation assistant for semantic search and document retrieval.",
        ),
        (
            UseCase::Reranking,
            "You are a reranking assistant for optimizing search results and document relevance.",
        ),
    ]
}
