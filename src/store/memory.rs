//! In-process stores

use super::{AuditRecord, AuditSink, StoreError, UsageAggregate, UsageEvent, UsageStore};
use crate::registry::AppContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Usage events kept in memory for the life of the process
#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    events: RwLock<Vec<UsageEvent>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<UsageEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn record(&self, event: &UsageEvent) -> Result<(), StoreError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn aggregate(&self, app: AppContext, since: DateTime<Utc>) -> Result<UsageAggregate, StoreError> {
        let events = self.events.read().await;
        Ok(UsageAggregate::from_events(
            events.iter().filter(|e| e.app == app && e.timestamp >= since),
        ))
    }
}

#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}
