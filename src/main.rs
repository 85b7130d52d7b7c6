//! AI Governance Gateway
//!
//! Every AI call made by a clinic application passes through one governed
//! pipeline: validation, model selection, emergency/rate/budget/auth
//! admission, PHI-aware safety screening, bounded execution and metered
//! recording. Callers always receive the same response envelope.

mod auth;
mod backend;
mod config;
mod emergency;
mod error;
mod models;
mod pipeline;
mod registry;
mod routes;
mod safety;
mod state;
mod store;

use crate::backend::cloudflare::CloudflareBackend;
use crate::config::Settings;
use crate::registry::ModelRegistry;
use crate::routes::create_router;
use crate::state::AppState;
use crate::store::{
    postgres::{create_pool, ensure_schema},
    AuditSink, MemoryAuditSink, MemoryUsageStore, PgAuditSink, PgUsageStore, UsageStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("Starting AI Governance Gateway...");

    let settings = Settings::load()?;
    info!("Configuration loaded successfully");

    let (usage, audit): (Arc<dyn UsageStore>, Arc<dyn AuditSink>) = match &settings.database {
        Some(db) => {
            let pool = create_pool(db).await.map_err(|e| {
                error!("Failed to initialize database pool: {}", e);
                e
            })?;
            if let Err(e) = ensure_schema(&pool).await {
                warn!("Warning creating tables: {}", e);
            }
            info!("Usage and audit records stored in PostgreSQL");
            (
                Arc::new(PgUsageStore::new(pool.clone())),
                Arc::new(PgAuditSink::new(pool)),
            )
        }
        None => {
            warn!("DATABASE_URL not set, usage and audit records are kept in memory only");
            (Arc::new(MemoryUsageStore::new()), Arc::new(MemoryAuditSink::new()))
        }
    };

    let backend = Arc::new(CloudflareBackend::new(
        settings.cloudflare.api_base.clone(),
        settings.cloudflare.account_id.clone(),
        settings.cloudflare.api_token.clone(),
    ));

    let state = Arc::new(AppState::new(
        Arc::new(ModelRegistry::builtin()),
        &settings.gateway,
        backend,
        usage,
        audit,
        settings.jwt_secret.clone(),
    )?);
    info!(
        "Governance pipelines ready for {} applications (HIPAA mode: {})",
        state.pipelines.len(),
        settings.gateway.hipaa_compliant
    );

    let app = create_router(state, &settings.cors);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("Server listening on http://{}", addr);
    info!("API Endpoints:");
    info!("   GET  /health                  - Liveness check");
    info!("   POST /api/ai/{{app}}/chat       - Governed chat completion");
    info!("   POST /api/ai/safety           - Standalone content safety check");
    info!("   GET  /api/ai/models           - Model catalog");
    info!("   GET  /api/ai/limits           - Per-application limits");
    info!("   GET  /api/ai/{{app}}/usage      - Usage and budget status (token)");
    info!("   GET  /api/ai/emergency        - Emergency state (admin)");
    info!("   POST /api/ai/emergency        - Set emergency state (admin)");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ai_governance_gateway=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
