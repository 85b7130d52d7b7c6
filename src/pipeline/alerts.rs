//! Budget alerts
//!
//! After a call is metered, today's and this month's spend are compared
//! with their alert thresholds. Each window alerts at most once per
//! cooldown.

use super::preflight::start_of_day;
use crate::registry::AppContext;
use crate::store::UsageStore;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

pub const DAILY_ALERT_THRESHOLD: f64 = 0.8;
pub const MONTHLY_ALERT_THRESHOLD: f64 = 0.9;
pub const DEFAULT_MONTHLY_BUDGET: f64 = 1000.0;
pub const ALERT_COOLDOWN: Duration = Duration::from_secs(15 * 60);

/// Midnight UTC on the first of the current month
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or_else(|| start_of_day(now))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetWindow {
    Daily,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAlert {
    pub app: AppContext,
    pub window: BudgetWindow,
    pub spent: f64,
    pub budget: f64,
    pub threshold: f64,
}

pub struct CostMonitor {
    app: AppContext,
    daily_budget: f64,
    monthly_budget: f64,
    usage: Arc<dyn UsageStore>,
    last_raised: Mutex<HashMap<BudgetWindow, Instant>>,
}

impl CostMonitor {
    pub fn new(app: AppContext, daily_budget: f64, monthly_budget: f64, usage: Arc<dyn UsageStore>) -> Self {
        Self {
            app,
            daily_budget,
            monthly_budget,
            usage,
            last_raised: Mutex::new(HashMap::new()),
        }
    }

    /// Windows whose spend crossed their threshold, logged as warnings.
    /// Store failures skip the window.
    pub async fn check(&self) -> Vec<BudgetAlert> {
        let now = Utc::now();
        let windows = [
            (BudgetWindow::Daily, start_of_day(now), self.daily_budget, DAILY_ALERT_THRESHOLD),
            (BudgetWindow::Monthly, start_of_month(now), self.monthly_budget, MONTHLY_ALERT_THRESHOLD),
        ];

        let mut alerts = Vec::new();
        for (window, since, budget, threshold) in windows {
            if budget <= 0.0 || self.cooling_down(window) {
                continue;
            }

            let spent = match self.usage.aggregate(self.app, since).await {
                Ok(agg) => agg.total_cost,
                Err(e) => {
                    warn!("Skipping {:?} budget alert for {}: {}", window, self.app, e);
                    continue;
                }
            };
            if spent < budget * threshold {
                continue;
            }

            self.mark_raised(window);
            warn!(
                "AI budget alert for {}: {:?} spend ${:.2} of ${:.2} ({:.0}%)",
                self.app,
                window,
                spent,
                budget,
                spent / budget * 100.0
            );
            alerts.push(BudgetAlert {
                app: self.app,
                window,
                spent,
                budget,
                threshold,
            });
        }
        alerts
    }

    fn cooling_down(&self, window: BudgetWindow) -> bool {
        self.last_raised
            .lock()
            .map(|raised| {
                raised
                    .get(&window)
                    .is_some_and(|at| at.elapsed() < ALERT_COOLDOWN)
            })
            .unwrap_or(false)
    }

    fn mark_raised(&self, window: BudgetWindow) {
        if let Ok(mut raised) = self.last_raised.lock() {
            raised.insert(window, Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelId;
    use crate::store::{sample_event, MemoryUsageStore};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    async fn store_with_spend(cost: f64) -> Arc<MemoryUsageStore> {
        let store = Arc::new(MemoryUsageStore::new());
        store
            .record(&sample_event(AppContext::Inventory, ModelId::Llama4Scout, cost, true))
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_start_of_month() {
        let now = Utc.with_ymd_and_hms(2026, 3, 17, 14, 5, 0).unwrap();
        assert_eq!(start_of_month(now), Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_quiet_below_threshold() {
        let monitor = CostMonitor::new(AppContext::Inventory, 10.0, 1000.0, store_with_spend(7.9).await);
        assert!(monitor.check().await.is_empty());
    }

    #[tokio::test]
    async fn test_daily_alert_at_eighty_percent() {
        let monitor = CostMonitor::new(AppContext::Inventory, 10.0, 1000.0, store_with_spend(8.0).await);
        let alerts = monitor.check().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].window, BudgetWindow::Daily);
        assert_eq!(alerts[0].threshold, DAILY_ALERT_THRESHOLD);
    }

    #[tokio::test]
    async fn test_monthly_alert_at_ninety_percent() {
        let monitor = CostMonitor::new(AppContext::Inventory, 1000.0, 20.0, store_with_spend(18.0).await);
        let alerts = monitor.check().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].window, BudgetWindow::Monthly);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alerts_respect_cooldown() {
        let monitor = CostMonitor::new(AppContext::Inventory, 10.0, 1000.0, store_with_spend(9.0).await);
        assert_eq!(monitor.check().await.len(), 1);
        assert!(monitor.check().await.is_empty());

        tokio::time::advance(ALERT_COOLDOWN).await;
        assert_eq!(monitor.check().await.len(), 1);
    }
}
