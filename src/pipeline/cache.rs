//! Response cache
//!
//! Completed responses keyed by model, use case, normalized messages and the
//! sampling knobs. Entries expire after a per-application TTL; when full,
//! the least recently read entry is evicted.

use super::executor::Execution;
use crate::models::{ChatMessage, RequestConfig};
use crate::registry::{AppContext, ModelId, UseCase};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;

/// How long a response stays fresh for each application
pub fn ttl_for_app(app: AppContext) -> Duration {
    const MINUTE: u64 = 60;
    let secs = match app {
        AppContext::AiReceptionist => 2 * MINUTE,
        AppContext::ClinicalStaffing => 30 * MINUTE,
        AppContext::CheckinKiosk => 5 * MINUTE,
        AppContext::EosL10 => 60 * MINUTE,
        AppContext::Inventory => 15 * MINUTE,
        AppContext::Handouts => 2 * 60 * MINUTE,
        AppContext::MedicationAuth => 10 * MINUTE,
        AppContext::PharmaScheduling => 4 * 60 * MINUTE,
        AppContext::CallCenterOps => 5 * MINUTE,
        AppContext::BatchCloseout => 60 * MINUTE,
        AppContext::SocialsReviews => 6 * 60 * MINUTE,
        AppContext::ComplianceTraining => 24 * 60 * MINUTE,
        AppContext::PlatformDashboard => 15 * MINUTE,
        AppContext::ConfigDashboard => 60 * MINUTE,
        AppContext::ComponentShowcase => 60 * MINUTE,
        AppContext::Staff => 30 * MINUTE,
        AppContext::IntegrationStatus => 10 * MINUTE,
    };
    Duration::from_secs(secs)
}

/// Stable key for one request. Message content is trimmed and lowercased.
pub fn cache_key(
    model: ModelId,
    use_case: UseCase,
    messages: &[ChatMessage],
    config: Option<&RequestConfig>,
) -> String {
    let normalized: Vec<_> = messages
        .iter()
        .map(|m| json!({ "role": m.role, "content": m.content.trim().to_lowercase() }))
        .collect();
    let key_data = json!({
        "model": model,
        "useCase": use_case,
        "messages": normalized,
        "temperature": config.and_then(|c| c.temperature),
        "maxTokens": config.and_then(|c| c.max_tokens),
    });

    let mut hasher = Sha256::new();
    hasher.update(key_data.to_string().as_bytes());
    hasher
        .finalize()
        .iter()
        .take(16)
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    /// Estimated spend avoided by serving hits
    pub cost_saved: f64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    content: String,
    cost: f64,
    expires_at: Instant,
    last_accessed: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

pub struct ResponseCache {
    ttl: Duration,
    max_entries: usize,
    state: Mutex<CacheState>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn for_app(app: AppContext, max_entries: usize) -> Self {
        Self::new(ttl_for_app(app), max_entries)
    }

    /// Fresh content for `key`, if any. A poisoned cache reads as a miss.
    pub fn get(&self, key: &str) -> Option<String> {
        let Ok(mut guard) = self.state.lock() else {
            return None;
        };
        let state = &mut *guard;
        let now = Instant::now();

        let fresh = state.entries.get(key).map(|e| e.expires_at > now);
        match fresh {
            Some(true) => {
                if let Some(entry) = state.entries.get_mut(key) {
                    entry.last_accessed = now;
                    state.stats.hits += 1;
                    state.stats.cost_saved += entry.cost;
                    return Some(entry.content.clone());
                }
            }
            Some(false) => {
                state.entries.remove(key);
                state.stats.evictions += 1;
                state.stats.entries = state.entries.len();
            }
            None => {}
        }

        state.stats.misses += 1;
        None
    }

    pub fn insert(&self, key: String, execution: &Execution) {
        let Ok(mut guard) = self.state.lock() else {
            return;
        };
        let state = &mut *guard;
        let now = Instant::now();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_entries {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
                state.stats.evictions += 1;
                debug!("Response cache full, evicted least recently used entry");
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                content: execution.content.clone(),
                cost: execution.cost,
                expires_at: now + self.ttl,
                last_accessed: now,
            },
        );
        state.stats.entries = state.entries.len();
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().map(|s| s.stats).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn execution(content: &str, cost: f64) -> Execution {
        Execution {
            content: content.to_string(),
            tokens_used: 10,
            cost,
        }
    }

    fn key_for(text: &str) -> String {
        cache_key(ModelId::Llama4Scout, UseCase::RealTimeChat, &[ChatMessage::user(text)], None)
    }

    #[test]
    fn test_key_normalizes_content() {
        assert_eq!(key_for("  When do you OPEN? "), key_for("when do you open?"));
        assert_eq!(key_for("hello").len(), 32);
        assert_ne!(key_for("hello"), key_for("goodbye"));
    }

    #[test]
    fn test_key_depends_on_model_and_knobs() {
        let messages = [ChatMessage::user("hello")];
        let base = cache_key(ModelId::Llama4Scout, UseCase::RealTimeChat, &messages, None);
        let other_model = cache_key(ModelId::Qwq32b, UseCase::RealTimeChat, &messages, None);
        let warmer = cache_key(
            ModelId::Llama4Scout,
            UseCase::RealTimeChat,
            &messages,
            Some(&RequestConfig {
                temperature: Some(1.2),
                ..Default::default()
            }),
        );
        assert_ne!(base, other_model);
        assert_ne!(base, warmer);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(60), 10);
        cache.insert(key_for("hi"), &execution("hello there", 0.01));

        assert_eq!(cache.get(&key_for("hi")).as_deref(), Some("hello there"));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get(&key_for("hi")), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entries, 0);
        assert!((stats.cost_saved - 0.01).abs() < 1e-12);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cache_evicts_least_recently_read() {
        let cache = ResponseCache::new(Duration::from_secs(600), 2);
        cache.insert(key_for("a"), &execution("A", 0.0));
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.insert(key_for("b"), &execution("B", 0.0));
        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(cache.get(&key_for("a")).is_some());

        cache.insert(key_for("c"), &execution("C", 0.0));
        assert!(cache.get(&key_for("a")).is_some());
        assert!(cache.get(&key_for("b")).is_none());
        assert!(cache.get(&key_for("c")).is_some());
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_app_ttls() {
        assert_eq!(ttl_for_app(AppContext::AiReceptionist), Duration::from_secs(120));
        assert_eq!(ttl_for_app(AppContext::ComplianceTraining), Duration::from_secs(86_400));
    }
}
