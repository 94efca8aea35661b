//! Per-entry enrichment through the external model.
//!
//! Each relevant entry gets at most [`RetryPolicy::max_attempts`] calls. The
//! quota is checked (and the call recorded) right before every attempt, so an
//! exhausted quota ends the entry without sending anything.
//!
//! The identifier, budget and publication date extracted from the raw entry
//! override whatever the model returns for those fields.

use chrono::{NaiveDate, Utc};
use tenderwatch_feed::fields;
use tenderwatch_shared::{EnrichedTender, RecordFragment};
use tracing::{debug, error, instrument, warn};

use crate::model::{CallError, StructuringModel};
use crate::quota::QuotaTracker;
use crate::retry::{RetryPolicy, with_backoff};

/// Default currency when the model leaves it empty.
const DEFAULT_CURRENCY: &str = "EUR";

/// Result of enriching one entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichOutcome {
    Enriched(EnrichedTender),
    /// The daily quota was reached before the call could be sent.
    QuotaExhausted,
    /// Every attempt failed; the entry is dropped from the run.
    Failed { attempts: u32, error: String },
}

/// Runs structuring and digest calls under the retry policy and quota gate.
pub struct Enricher<'a, M: StructuringModel + ?Sized> {
    model: &'a M,
    quota: &'a QuotaTracker,
    policy: RetryPolicy,
}

impl<'a, M: StructuringModel + ?Sized> Enricher<'a, M> {
    pub fn new(model: &'a M, quota: &'a QuotaTracker, policy: RetryPolicy) -> Self {
        Self {
            model,
            quota,
            policy,
        }
    }

    /// Structure one relevant entry.
    #[instrument(skip_all, fields(id = %fragment.id))]
    pub async fn enrich(&self, fragment: &RecordFragment) -> EnrichOutcome {
        let text = fragment.text.as_str();
        let model = self.model;
        let quota = self.quota;

        let result = with_backoff(
            &self.policy,
            "structure",
            CallError::kind,
            CallError::retry_after,
            |attempt| {
                let gate = quota.try_acquire();
                async move {
                    let calls_today = gate?;
                    debug!(attempt, calls_today, "dispatching structuring call");
                    model.structure(text).await
                }
            },
        )
        .await;

        match result {
            Ok(done) => {
                debug!(attempts = done.attempts, waited_secs = done.waited.as_secs(), "entry enriched");
                EnrichOutcome::Enriched(overlay(done.value, fragment, Utc::now().date_naive()))
            }
            Err(failure) => match failure.error {
                CallError::QuotaExhausted { used, limit } => {
                    error!(used, limit, "daily quota reached, entry not analysed");
                    EnrichOutcome::QuotaExhausted
                }
                other => {
                    error!(attempts = failure.attempts, error = %other, "entry could not be enriched");
                    EnrichOutcome::Failed {
                        attempts: failure.attempts,
                        error: other.to_string(),
                    }
                }
            },
        }
    }

    /// HTML digest of the final tender list. `None` if the call fails.
    #[instrument(skip_all, fields(tenders = tenders.len(), period = %period))]
    pub async fn digest(&self, tenders: &[EnrichedTender], period: &str) -> Option<String> {
        if tenders.is_empty() {
            return None;
        }
        let model = self.model;
        let quota = self.quota;

        let result = with_backoff(
            &self.policy,
            "summarize",
            CallError::kind,
            CallError::retry_after,
            |_| {
                let gate = quota.try_acquire();
                async move {
                    gate?;
                    model.summarize(tenders, period).await
                }
            },
        )
        .await;

        match result {
            Ok(done) => Some(done.value),
            Err(failure) => {
                warn!(error = %failure.error, "digest could not be generated");
                None
            }
        }
    }
}

/// Overlay the fields extracted from the raw entry onto the model output.
pub fn overlay(mut tender: EnrichedTender, fragment: &RecordFragment, today: NaiveDate) -> EnrichedTender {
    let text = fragment.text.as_str();

    tender.id = fragment.id.to_string();

    if let Some(budget) = fields::budget(text) {
        tender.budget = Some(budget);
    }

    if let Some(date) = fields::notice_date(text) {
        tender.publication_date = date.to_string();
    } else if tender.publication_date.trim().is_empty() {
        tender.publication_date = today.to_string();
    }

    if tender.currency.trim().is_empty() {
        tender.currency = DEFAULT_CURRENCY.into();
    }
    tender
}
