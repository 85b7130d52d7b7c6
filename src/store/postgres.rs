//! PostgreSQL-backed usage store and audit sink

use super::{AuditRecord, AuditSink, StoreError, UsageAggregate, UsageEvent, UsageStore};
use crate::config::DatabaseConfig;
use crate::registry::{AppContext, ModelId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tracing::{info, warn};

/// Build a pool and verify it answers
pub async fn create_pool(config: &DatabaseConfig) -> Result<Pool, StoreError> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(deadpool_postgres::PoolConfig::new(config.max_pool_size));

    let pool = if config.require_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
        cfg.create_pool(Some(Runtime::Tokio1), tls)
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
    }
    .map_err(|e| StoreError::Unavailable(format!("Failed to create pool: {}", e)))?;

    let client = pool.get().await?;
    client.query_one("SELECT 1", &[]).await?;

    info!("Database connection successful (TLS: {})", config.require_tls);
    Ok(pool)
}

/// Optional lookups; a failure leaves the tables usable
const SCHEMA_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_ai_usage_events_app_created ON ai_usage_events(app, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_ai_audit_log_request_id ON ai_audit_log(request_id)",
];

/// Create the usage and audit tables if they don't exist
pub async fn ensure_schema(pool: &Pool) -> Result<(), StoreError> {
    let client = pool.get().await?;

    client
        .execute(
            "CREATE TABLE IF NOT EXISTS ai_usage_events (
                id UUID PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL,
                app VARCHAR(64) NOT NULL,
                model VARCHAR(128) NOT NULL,
                user_id VARCHAR(255),
                request_id UUID NOT NULL,
                tokens_used BIGINT NOT NULL,
                cost DOUBLE PRECISION NOT NULL,
                response_time_ms BIGINT NOT NULL,
                success BOOLEAN NOT NULL,
                error_code VARCHAR(64),
                safety_score DOUBLE PRECISION,
                contains_phi BOOLEAN NOT NULL DEFAULT false
            )",
            &[],
        )
        .await?;

    client
        .execute(
            "CREATE TABLE IF NOT EXISTS ai_audit_log (
                id UUID PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL,
                app VARCHAR(64) NOT NULL,
                request_id UUID NOT NULL,
                action VARCHAR(64) NOT NULL,
                user_id VARCHAR(255),
                details JSONB NOT NULL
            )",
            &[],
        )
        .await?;

    for statement in SCHEMA_INDEXES {
        if let Err(e) = client.execute(*statement, &[]).await {
            warn!("Failed to create index ({}): {}", statement, e);
        }
    }

    info!("AI governance tables initialized");
    Ok(())
}

pub struct PgUsageStore {
    pool: Pool,
}

impl PgUsageStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn record(&self, event: &UsageEvent) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        let error_code = event.error_code.map(|c| c.as_str());

        client
            .execute(
                "INSERT INTO ai_usage_events
                 (id, created_at, app, model, user_id, request_id, tokens_used, cost,
                  response_time_ms, success, error_code, safety_score, contains_phi)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
                &[
                    &event.id,
                    &event.timestamp,
                    &event.app.as_str(),
                    &event.model.as_str(),
                    &event.user_id,
                    &event.request_id,
                    &(event.tokens_used as i64),
                    &event.cost,
                    &(event.response_time_ms as i64),
                    &event.success,
                    &error_code,
                    &event.safety_score,
                    &event.contains_phi,
                ],
            )
            .await?;
        Ok(())
    }

    async fn aggregate(&self, app: AppContext, since: DateTime<Utc>) -> Result<UsageAggregate, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT model,
                        COUNT(*)::BIGINT,
                        COALESCE(SUM(cost), 0)::FLOAT8,
                        COALESCE(SUM(response_time_ms), 0)::BIGINT,
                        COUNT(*) FILTER (WHERE success)::BIGINT
                 FROM ai_usage_events
                 WHERE app = $1 AND created_at >= $2
                 GROUP BY model",
                &[&app.as_str(), &since],
            )
            .await?;

        let mut agg = UsageAggregate::default();
        let mut response_total = 0i64;
        let mut successes = 0i64;

        for row in rows {
            let model: String = row.get(0);
            let count: i64 = row.get(1);
            let cost: f64 = row.get(2);
            response_total += row.get::<_, i64>(3);
            successes += row.get::<_, i64>(4);

            agg.total_requests += count.max(0) as u64;
            agg.total_cost += cost;
            match model.parse::<ModelId>() {
                Ok(id) => {
                    agg.per_model.insert(id, count.max(0) as u64);
                }
                Err(e) => warn!("Skipping usage rows for {}", e),
            }
        }

        if agg.total_requests > 0 {
            agg.avg_response_time_ms = response_total as f64 / agg.total_requests as f64;
            agg.success_rate = successes as f64 / agg.total_requests as f64;
        }
        Ok(agg)
    }
}

pub struct PgAuditSink {
    pool: Pool,
}

impl PgAuditSink {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        let details = serde_json::to_value(&record.details)?;
        let client = self.pool.get().await?;

        client
            .execute(
                "INSERT INTO ai_audit_log (id, created_at, app, request_id, action, user_id, details)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &record.id,
                    &record.timestamp,
                    &record.app.as_str(),
                    &record.request_id,
                    &record.action.as_str(),
                    &record.user_id,
                    &details,
                ],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_statements_are_rerunnable() {
        assert_eq!(SCHEMA_INDEXES.len(), 2);
        for statement in SCHEMA_INDEXES {
            assert!(statement.starts_with("CREATE INDEX IF NOT EXISTS"));
        }
        assert!(SCHEMA_INDEXES.iter().any(|s| s.contains("ai_usage_events(app, created_at)")));
        assert!(SCHEMA_INDEXES.iter().any(|s| s.contains("ai_audit_log(request_id)")));
    }
}
