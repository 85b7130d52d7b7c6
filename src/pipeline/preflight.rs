//! Admission control
//!
//! Checks run in a fixed order: emergency breaker, model cooldown, daily
//! budget, caller identity. The first failure wins.
//!
//! Cooldown and budget reservations are per process. Two gateway replicas
//! each keep their own timestamp and their own outstanding reservations.

use crate::emergency::EmergencyMonitor;
use crate::error::GovernanceError;
use crate::registry::{AppContext, AppProfile, ModelProfile};
use crate::store::UsageStore;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Start of the current UTC day
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Today's aggregate as last read from the store
    cached: Option<CachedSpend>,
    /// Estimates admitted but not yet recorded
    reserved: f64,
}

#[derive(Debug, Clone, Copy)]
struct CachedSpend {
    day: NaiveDate,
    fetched_at: Instant,
    total_cost: f64,
}

/// Today's spend for one application plus in-flight reservations
pub struct SpendLedger {
    app: AppContext,
    store: Arc<dyn UsageStore>,
    cache_ttl: Duration,
    state: Arc<Mutex<LedgerState>>,
}

impl SpendLedger {
    pub fn new(app: AppContext, store: Arc<dyn UsageStore>, cache_ttl: Duration) -> Self {
        Self {
            app,
            store,
            cache_ttl,
            state: Arc::new(Mutex::new(LedgerState::default())),
        }
    }

    /// Today's recorded spend. Store failures count as zero.
    async fn spent_today(&self) -> Result<f64, GovernanceError> {
        let now = Utc::now();
        let today = now.date_naive();
        {
            let state = self.state.lock()?;
            if let Some(cached) = state.cached {
                if cached.day == today && cached.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(cached.total_cost);
                }
            }
        }

        let total_cost = match self.store.aggregate(self.app, start_of_day(now)).await {
            Ok(agg) => agg.total_cost,
            Err(e) => {
                warn!("Usage store unavailable for {}, budget check fails open: {}", self.app, e);
                return Ok(0.0);
            }
        };

        let mut state = self.state.lock()?;
        state.cached = Some(CachedSpend {
            day: today,
            fetched_at: Instant::now(),
            total_cost,
        });
        Ok(total_cost)
    }

    /// Admit `estimate` if the projected total stays within the admission limit
    pub async fn reserve(&self, profile: &AppProfile, estimate: f64) -> Result<BudgetReservation, GovernanceError> {
        let spent = self.spent_today().await?;
        let limit = profile.admission_limit();

        let mut state = self.state.lock()?;
        let current_usage = spent + state.reserved;
        let projected = current_usage + estimate;
        if projected > limit {
            debug!(
                "Budget refused for {}: projected {:.4} > limit {:.4}",
                self.app, projected, limit
            );
            return Err(GovernanceError::BudgetExceeded { current_usage, limit });
        }
        state.reserved += estimate;

        Ok(BudgetReservation {
            state: Some(self.state.clone()),
            amount: estimate,
        })
    }

    /// Reservation that holds nothing, for calls that skip the budget check
    pub fn empty_reservation() -> BudgetReservation {
        BudgetReservation {
            state: None,
            amount: 0.0,
        }
    }

    pub fn reserved(&self) -> f64 {
        self.state.lock().map(|s| s.reserved).unwrap_or(0.0)
    }
}

/// An admitted estimate. Released on drop; `settle` also drops the cached
/// aggregate so the next check reads the recorded event.
#[derive(Debug)]
pub struct BudgetReservation {
    state: Option<Arc<Mutex<LedgerState>>>,
    amount: f64,
}

impl BudgetReservation {
    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn settle(mut self) {
        if let Some(state) = self.state.take() {
            if let Ok(mut state) = state.lock() {
                state.reserved = (state.reserved - self.amount).max(0.0);
                state.cached = None;
            }
        }
    }
}

impl Drop for BudgetReservation {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            if let Ok(mut state) = state.lock() {
                state.reserved = (state.reserved - self.amount).max(0.0);
            }
        }
    }
}

/// Everything the guard needs to decide on one call
pub struct Admission<'a> {
    pub app: &'a AppProfile,
    pub model: &'a ModelProfile,
    pub estimated_cost: f64,
    pub user_id: Option<&'a str>,
}

pub struct PreflightGuard {
    emergency: Arc<dyn EmergencyMonitor>,
    enforce_rate_limit: bool,
    require_auth: bool,
    last_admitted: Mutex<Option<Instant>>,
    ledger: SpendLedger,
}

impl PreflightGuard {
    pub fn new(
        emergency: Arc<dyn EmergencyMonitor>,
        ledger: SpendLedger,
        enforce_rate_limit: bool,
        require_auth: bool,
    ) -> Self {
        Self {
            emergency,
            enforce_rate_limit,
            require_auth,
            last_admitted: Mutex::new(None),
            ledger,
        }
    }

    pub fn ledger(&self) -> &SpendLedger {
        &self.ledger
    }

    pub async fn admit(&self, admission: Admission<'_>) -> Result<BudgetReservation, GovernanceError> {
        if self.emergency.state().blocks_admission() {
            return Err(GovernanceError::EmergencyStop);
        }

        if self.enforce_rate_limit {
            if let Some(cooldown) = admission.model.rate_limits.cooldown_between_requests_ms {
                self.check_cooldown(Duration::from_millis(cooldown))?;
            }
        }

        let reservation = self.ledger.reserve(admission.app, admission.estimated_cost).await?;

        if self.require_auth && admission.user_id.map_or(true, str::is_empty) {
            return Err(GovernanceError::AuthenticationRequired);
        }

        Ok(reservation)
    }

    /// Refuse if the last admitted call was less than `cooldown` ago,
    /// otherwise stamp now
    fn check_cooldown(&self, cooldown: Duration) -> Result<(), GovernanceError> {
        let mut last = self.last_admitted.lock()?;
        let now = Instant::now();
        if let Some(previous) = *last {
            let elapsed = now.duration_since(previous);
            if elapsed < cooldown {
                let wait = cooldown - elapsed;
                return Err(GovernanceError::RateLimitExceeded {
                    wait_ms: wait.as_millis() as u64,
                });
            }
        }
        *last = Some(now);
        Ok(())
    }
}
