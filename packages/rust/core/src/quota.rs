//! Daily call quota gate.

use chrono::Utc;
use tenderwatch_storage::{UsageStats, UsageStore};
use tracing::{info, warn};

use crate::model::CallError;

/// Calls between two usage log lines.
const LOG_EVERY: u32 = 50;

/// Counts external calls against a daily limit, persisting every call.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    store: UsageStore,
    daily_limit: u32,
}

impl QuotaTracker {
    pub fn new(store: UsageStore, daily_limit: u32) -> Self {
        Self { store, daily_limit }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Calls recorded today.
    pub fn used_today(&self) -> u32 {
        self.store.calls_on(Utc::now().date_naive())
    }

    /// Reserve one call for today.
    ///
    /// Records and persists the call before it is sent. Fails without
    /// recording anything when the limit is already reached.
    pub fn try_acquire(&self) -> Result<u32, CallError> {
        let now = Utc::now();
        let used = self.store.calls_on(now.date_naive());
        if used >= self.daily_limit {
            warn!(used, limit = self.daily_limit, "daily call quota reached");
            return Err(CallError::QuotaExhausted {
                used,
                limit: self.daily_limit,
            });
        }

        let calls = self
            .store
            .record_call(now)
            .map_err(|e| CallError::LedgerUnavailable(e.to_string()))?;

        if calls % LOG_EVERY == 0 {
            info!(calls, limit = self.daily_limit, "model usage today");
        }
        Ok(calls)
    }

    pub fn stats(&self) -> UsageStats {
        self.store.stats(Utc::now().date_naive(), self.daily_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(limit: u32) -> (QuotaTracker, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("tw_test_{}", uuid::Uuid::now_v7()));
        let store = UsageStore::new(dir.join("api-usage.json"));
        (QuotaTracker::new(store, limit), dir)
    }

    #[test]
    fn acquire_until_limit() {
        let (quota, dir) = tracker(2);

        assert_eq!(quota.try_acquire().unwrap(), 1);
        assert_eq!(quota.try_acquire().unwrap(), 2);

        let err = quota.try_acquire().unwrap_err();
        assert_eq!(err, CallError::QuotaExhausted { used: 2, limit: 2 });
        assert_eq!(quota.used_today(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stats_reflect_calls() {
        let (quota, dir) = tracker(10);
        quota.try_acquire().unwrap();

        let stats = quota.stats();
        assert_eq!(stats.today, 1);
        assert_eq!(stats.remaining, 9);
        assert_eq!(stats.percentage, 10);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
