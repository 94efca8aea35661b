//! Archive of past executions and their tenders.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tenderwatch_shared::{EnrichedTender, Result};
use tracing::info;

use crate::{load_json, save_json};

/// Maximum number of executions kept, newest first.
pub const MAX_EXECUTIONS: usize = 90;

/// One completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    /// Period covered by the archive (`MM/YYYY`).
    pub date: String,
    pub timestamp: DateTime<Utc>,
    pub count: usize,
    #[serde(default)]
    pub tenders: Vec<EnrichedTender>,
}

/// On-disk shape of `results.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsArchive {
    /// Newest first.
    #[serde(default)]
    pub executions: Vec<Execution>,
}

/// Filters for [`ResultsStore::search`]. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Earliest publication date (inclusive).
    pub from: Option<NaiveDate>,
    /// Latest publication date (inclusive).
    pub to: Option<NaiveDate>,
    /// Case-insensitive substring of the tender id.
    pub id: Option<String>,
}

/// A stored tender and the run that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(flatten)]
    pub tender: EnrichedTender,
    pub execution_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ResultsStore {
    path: PathBuf,
}

impl ResultsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> ResultsArchive {
        load_json(&self.path)
    }

    /// Prepend a run, keeping the newest [`MAX_EXECUTIONS`].
    pub fn record_execution(
        &self,
        tenders: &[EnrichedTender],
        period: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut archive = self.load();
        let tenders: Vec<EnrichedTender> = tenders
            .iter()
            .cloned()
            .map(|mut t| {
                if t.currency.is_empty() {
                    t.currency = "EUR".into();
                }
                t
            })
            .collect();

        archive.executions.insert(
            0,
            Execution {
                date: period.to_string(),
                timestamp: now,
                count: tenders.len(),
                tenders,
            },
        );
        archive.executions.truncate(MAX_EXECUTIONS);

        save_json(&self.path, &archive)?;
        info!(period, executions = archive.executions.len(), "results saved");
        Ok(())
    }

    /// Every tender id stored in any execution.
    pub fn all_ids(&self) -> HashSet<String> {
        self.load()
            .executions
            .into_iter()
            .flat_map(|e| e.tenders.into_iter().map(|t| t.id))
            .collect()
    }

    /// Stored tenders matching `query`, one per id (newest run wins), sorted
    /// by budget descending.
    pub fn search(&self, query: &SearchQuery) -> Vec<SearchHit> {
        let needle = query.id.as_deref().map(str::to_lowercase);
        let from = query.from.map(|d| d.to_string());
        let to = query.to.map(|d| d.to_string());

        let mut seen = HashSet::new();
        let mut hits = Vec::new();

        for execution in self.load().executions {
            let fallback_date = execution.timestamp.date_naive().to_string();
            for tender in execution.tenders {
                if let Some(needle) = &needle {
                    if !tender.id.to_lowercase().contains(needle) {
                        continue;
                    }
                }

                let date = if tender.publication_date.is_empty() {
                    fallback_date.as_str()
                } else {
                    tender.publication_date.as_str()
                };
                if from.as_deref().is_some_and(|from| date < from)
                    || to.as_deref().is_some_and(|to| date > to)
                {
                    continue;
                }

                if seen.insert(tender.id.clone()) {
                    hits.push(SearchHit {
                        tender,
                        execution_date: execution.timestamp,
                    });
                }
            }
        }

        hits.sort_by(|a, b| b.tender.ranking_budget().total_cmp(&a.tender.ranking_budget()));
        hits
    }

    /// Delete a tender from every execution, dropping executions left empty.
    /// Returns `false` if the id was not stored.
    pub fn remove_tender(&self, id: &str) -> Result<bool> {
        let mut archive = self.load();
        let mut removed = false;

        for execution in &mut archive.executions {
            let before = execution.tenders.len();
            execution.tenders.retain(|t| t.id != id);
            if execution.tenders.len() != before {
                removed = true;
                execution.count = execution.tenders.len();
            }
        }

        if removed {
            archive.executions.retain(|e| !e.tenders.is_empty());
            save_json(&self.path, &archive)?;
            info!(%id, "removed tender from results");
        }
        Ok(removed)
    }
}
