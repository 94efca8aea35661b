//! Daily counter of external model calls.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tenderwatch_shared::Result;

use crate::{load_json, save_json};

/// Number of most recent days kept in the ledger.
pub const RETAINED_DAYS: usize = 30;

/// Days covered by [`UsageStats::history`].
const HISTORY_DAYS: u64 = 14;

/// Days averaged by [`UsageStats::avg_last_7`].
const AVERAGE_DAYS: usize = 7;

/// Calls recorded on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayUsage {
    pub calls: u32,
    pub first_call: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_call: Option<DateTime<Utc>>,
}

/// On-disk shape of `api-usage.json`, keyed by `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageLedger {
    #[serde(default)]
    pub days: BTreeMap<String, DayUsage>,
}

impl UsageLedger {
    pub fn calls_on(&self, date: NaiveDate) -> u32 {
        self.days.get(&day_key(date)).map_or(0, |d| d.calls)
    }

    /// Count one call at `now`, drop days beyond the retention window and
    /// return the day's new total.
    pub fn record(&mut self, now: DateTime<Utc>) -> u32 {
        let day = self
            .days
            .entry(day_key(now.date_naive()))
            .or_insert_with(|| DayUsage {
                calls: 0,
                first_call: now,
                last_call: None,
            });
        day.calls += 1;
        day.last_call = Some(now);
        let calls = day.calls;

        while self.days.len() > RETAINED_DAYS {
            self.days.pop_first();
        }
        calls
    }

    /// Usage summary as of `today` against a daily `limit`.
    pub fn stats(&self, today: NaiveDate, limit: u32) -> UsageStats {
        let calls = self.calls_on(today);

        let recent: Vec<u32> = self
            .days
            .values()
            .rev()
            .take(AVERAGE_DAYS)
            .map(|d| d.calls)
            .collect();
        let avg_last_7 = if recent.is_empty() {
            0
        } else {
            let sum: u32 = recent.iter().sum();
            (f64::from(sum) / recent.len() as f64).round() as u32
        };

        let history = (0..HISTORY_DAYS)
            .rev()
            .filter_map(|back| today.checked_sub_days(Days::new(back)))
            .map(|date| DailyCalls {
                date,
                calls: self.calls_on(date),
            })
            .collect();

        let percentage = if limit == 0 {
            100
        } else {
            (f64::from(calls) / f64::from(limit) * 100.0).round() as u32
        };

        UsageStats {
            today: calls,
            limit,
            percentage,
            remaining: limit.saturating_sub(calls),
            avg_last_7,
            history,
        }
    }
}

/// Calls made on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyCalls {
    pub date: NaiveDate,
    pub calls: u32,
}

/// Snapshot of quota consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub today: u32,
    pub limit: u32,
    pub percentage: u32,
    pub remaining: u32,
    pub avg_last_7: u32,
    /// Oldest first, ending today.
    pub history: Vec<DailyCalls>,
}

#[derive(Debug, Clone)]
pub struct UsageStore {
    path: PathBuf,
}

impl UsageStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> UsageLedger {
        load_json(&self.path)
    }

    pub fn save(&self, ledger: &UsageLedger) -> Result<()> {
        save_json(&self.path, ledger)
    }

    pub fn calls_on(&self, date: NaiveDate) -> u32 {
        self.load().calls_on(date)
    }

    /// Record one call and persist immediately. Returns the day's total.
    pub fn record_call(&self, now: DateTime<Utc>) -> Result<u32> {
        let mut ledger = self.load();
        let calls = ledger.record(now);
        self.save(&ledger)?;
        Ok(calls)
    }

    pub fn stats(&self, today: NaiveDate, limit: u32) -> UsageStats {
        self.load().stats(today, limit)
    }
}

fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
