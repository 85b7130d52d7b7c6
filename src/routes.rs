//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod catalog;
mod chat;
mod emergency;
mod safety;
mod usage;

use crate::auth::auth_middleware;
use crate::config::CorsConfig;
use crate::state::SharedState;
use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, cors: &CorsConfig) -> Router {
    let cors = build_cors_layer(cors);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    // Routes that need a valid bearer token
    let protected = Router::new()
        .route("/api/ai/{app}/usage", get(usage::usage_stats))
        .route(
            "/api/ai/emergency",
            get(emergency::get_emergency).post(emergency::set_emergency),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/ai/{app}/chat", post(chat::chat))
        .route("/api/ai/safety", post(safety::check_content))
        .route("/api/ai/models", get(catalog::list_models))
        .route("/api/ai/limits", get(catalog::list_limits))
        .merge(protected)
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    let origins: Vec<_> = cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let layer = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    };

    layer
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{create_token, Role};
    use crate::backend::{BackendError, InferenceBackend};
    use crate::config::GatewayDefaults;
    use crate::emergency::{EmergencyMonitor, EmergencyState};
    use crate::models::{ChatMessage, RequestConfig};
    use crate::registry::{ModelId, ModelRegistry};
    use crate::state::AppState;
    use crate::registry::AppContext;
    use crate::store::{sample_event, MemoryAuditSink, MemoryUsageStore, UsageStore};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const SECRET: &str = "route-test-secret";

    struct Canned;

    #[async_trait]
    impl InferenceBackend for Canned {
        async fn invoke(
            &self,
            _model: ModelId,
            _messages: &[ChatMessage],
            _config: Option<&RequestConfig>,
        ) -> Result<String, BackendError> {
            Ok("The clinic opens at 8am.".to_string())
        }
    }

    fn state() -> SharedState {
        state_with(GatewayDefaults {
            enable_rate_limiting: false,
            ..Default::default()
        })
    }

    fn state_with(defaults: GatewayDefaults) -> SharedState {
        Arc::new(
            AppState::new(
                Arc::new(ModelRegistry::builtin()),
                &defaults,
                Arc::new(Canned),
                Arc::new(MemoryUsageStore::new()),
                Arc::new(MemoryAuditSink::new()),
                SECRET.to_string(),
            )
            .unwrap(),
        )
    }

    fn token(role: Role) -> String {
        create_token(SECRET, "u-1", "u@clinic.test", role, chrono::Duration::minutes(5)).unwrap()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn chat_request(app: &str, auth: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::post(format!("/api/ai/{}/chat", app)).header("content-type", "application/json");
        if let Some(token) = auth {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let router = create_router(state(), &CorsConfig::default());
        let body = json!({ "messages": [{ "role": "user", "content": "When do you open?" }] }).to_string();

        let (status, json) = send(router, chat_request("staff", Some(&token(Role::Clinician)), &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], json!(true));
        assert_eq!(json["data"], json!("The clinic opens at 8am."));
        assert!(json["meta"]["requestId"].is_string());
    }

    #[tokio::test]
    async fn test_chat_without_user_in_hipaa_mode() {
        let router = create_router(state(), &CorsConfig::default());
        let body = json!({ "messages": [{ "role": "user", "content": "hi" }] }).to_string();

        let (status, json) = send(router, chat_request("staff", None, &body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], json!("AUTHENTICATION_REQUIRED"));
    }

    #[tokio::test]
    async fn test_malformed_body_gets_envelope() {
        let router = create_router(state(), &CorsConfig::default());
        let (status, json) = send(router, chat_request("staff", Some(&token(Role::Clinician)), "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], json!("INVALID_REQUEST"));
        assert_eq!(json["meta"]["model"], json!("llama-3.3-70b-instruct-fp8-fast"));
    }

    #[tokio::test]
    async fn test_unknown_app_is_not_found() {
        let router = create_router(state(), &CorsConfig::default());
        let (status, _) = send(router, chat_request("payroll", None, "{}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_safety_endpoint() {
        let router = create_router(state(), &CorsConfig::default());
        let request = Request::post("/api/ai/safety")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "content": "SSN 123-45-6789" }).to_string()))
            .unwrap();

        let (status, json) = send(router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["safe"], json!(false));
        assert_eq!(json["containsPHI"], json!(true));
        assert!(json["score"].is_number());
        assert!(json.get("data").is_none());
    }

    #[tokio::test]
    async fn test_spent_budget_maps_to_payment_required() {
        let state = state();
        state
            .usage
            .record(&sample_event(AppContext::Staff, ModelId::Llama33_70bFast, 15.0, true))
            .await
            .unwrap();
        let router = create_router(state, &CorsConfig::default());
        let body = json!({ "messages": [{ "role": "user", "content": "When do you open?" }] }).to_string();

        let (status, json) = send(router, chat_request("staff", Some(&token(Role::Clinician)), &body)).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(json["success"], json!(false));
        assert_eq!(json["error"]["code"], json!("BUDGET_EXCEEDED"));
        let limit = json["error"]["details"]["limit"].as_f64().unwrap();
        assert!((limit - 14.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_back_to_back_calls_map_to_too_many_requests() {
        let router = create_router(state_with(GatewayDefaults::default()), &CorsConfig::default());
        let body = json!({ "messages": [{ "role": "user", "content": "When do you open?" }] }).to_string();
        let auth = token(Role::Clinician);

        let (status, _) = send(router.clone(), chat_request("staff", Some(&auth), &body)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = send(router, chat_request("staff", Some(&auth), &body)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"]["code"], json!("RATE_LIMIT_EXCEEDED"));
        assert!(json["error"]["details"]["waitTimeMs"].as_u64().is_some());
    }

    #[tokio::test]
    async fn test_emergency_requires_admin() {
        let state = state();
        let router = create_router(state.clone(), &CorsConfig::default());
        let body = json!({ "state": "emergency_stop", "reason": "drill" }).to_string();

        let forbidden = Request::post("/api/ai/emergency")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", token(Role::Clinician)))
            .body(Body::from(body.clone()))
            .unwrap();
        let (status, _) = send(router.clone(), forbidden).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(state.emergency.state(), EmergencyState::Normal);

        let allowed = Request::post("/api/ai/emergency")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", token(Role::Admin)))
            .body(Body::from(body))
            .unwrap();
        let (status, json) = send(router.clone(), allowed).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["previous"], json!("normal"));
        assert_eq!(state.emergency.state(), EmergencyState::EmergencyStop);

        let chat_body = json!({ "messages": [{ "role": "user", "content": "hi" }] }).to_string();
        let (status, json) = send(router, chat_request("staff", Some(&token(Role::Clinician)), &chat_body)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"]["code"], json!("EMERGENCY_STOP"));
    }

    #[tokio::test]
    async fn test_usage_requires_token() {
        let router = create_router(state(), &CorsConfig::default());
        let anonymous = Request::get("/api/ai/staff/usage").body(Body::empty()).unwrap();
        let (status, _) = send(router.clone(), anonymous).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let authed = Request::get("/api/ai/staff/usage?timeframe=week")
            .header("authorization", format!("Bearer {}", token(Role::Viewer)))
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(router, authed).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["budgetStatus"], json!("healthy"));
        assert_eq!(json["data"]["timeframe"], json!("week"));
        assert_eq!(json["data"]["cache"]["hits"], json!(0));
    }

    #[tokio::test]
    async fn test_catalog_lists_models() {
        let router = create_router(state(), &CorsConfig::default());
        let (status, json) = send(router, Request::get("/api/ai/models").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"].as_array().map(Vec::len), Some(11));
    }
}
