//! Relevance filtering of tender fragments.
//!
//! Every fragment runs through four checks in a fixed order and stops at the
//! first one it fails:
//!
//! 1. status: the entry must be published
//! 2. window: the issue date must fall within the recency window
//! 3. history: the id must not have been handled by an earlier run
//! 4. relevance: category code plus budget tier, or authority plus keyword
//!
//! Survivors land in an insertion-ordered map keyed by [`UniqueId`].

mod matcher;
mod text;

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use tenderwatch_feed::fields;
use tenderwatch_shared::{
    FilterCriteria, HistorySet, RecordFragment, Result, TenderWatchError, UniqueId,
};
use tracing::{debug, info, instrument};

pub use matcher::TermMatcher;
pub use text::clean_text;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Why a fragment was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    Status,
    Window,
    History,
    Relevance,
}

/// Which relevance rule admitted a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// Qualifying category code and a budget over the applicable tier.
    CategoryBudget,
    /// Interesting authority and a domain keyword in title or summary.
    AuthorityKeyword,
}

/// Per-reason exclusion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExclusionCounts {
    pub status: usize,
    pub window: usize,
    pub history: usize,
    pub relevance: usize,
}

impl ExclusionCounts {
    pub fn record(&mut self, reason: Exclusion) {
        match reason {
            Exclusion::Status => self.status += 1,
            Exclusion::Window => self.window += 1,
            Exclusion::History => self.history += 1,
            Exclusion::Relevance => self.relevance += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.status + self.window + self.history + self.relevance
    }
}

/// Result of filtering one batch.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Relevant fragments in first-encounter order; a repeated id keeps its
    /// first position and the last fragment seen.
    pub entries: IndexMap<UniqueId, RecordFragment>,
    pub counts: ExclusionCounts,
}

// ---------------------------------------------------------------------------
// RelevanceFilter
// ---------------------------------------------------------------------------

/// Compiled form of [`FilterCriteria`] for one run.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    window_days: i64,
    min_budget_local: f64,
    min_budget_national: f64,
    local_area: Option<Regex>,
    cpv_codes: HashSet<String>,
    authorities: TermMatcher,
    keywords: TermMatcher,
    today: NaiveDate,
}

impl RelevanceFilter {
    /// Compile the criteria. Fails if a configured local-area pattern is not
    /// a valid regular expression.
    pub fn new(criteria: &FilterCriteria) -> Result<Self> {
        Ok(Self {
            window_days: i64::from(criteria.window_days),
            min_budget_local: criteria.min_budget_local,
            min_budget_national: criteria.min_budget_national,
            local_area: local_area_regex(criteria)?,
            cpv_codes: criteria.cpv_codes.iter().map(|c| c.trim().to_string()).collect(),
            authorities: TermMatcher::new(&criteria.authorities)?,
            keywords: TermMatcher::new(&criteria.keywords)?,
            today: Utc::now().date_naive(),
        })
    }

    /// Evaluate the recency window against a fixed date instead of today.
    pub fn at(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Classify one fragment.
    pub fn check(
        &self,
        fragment: &RecordFragment,
        history: &HistorySet,
    ) -> std::result::Result<Criterion, Exclusion> {
        let text = fragment.text.as_str();

        if !fields::status_is_published(text) {
            return Err(Exclusion::Status);
        }
        if !self.within_window(text) {
            return Err(Exclusion::Window);
        }
        if history.contains(&fragment.id) {
            return Err(Exclusion::History);
        }
        if self.meets_budget_rule(text) {
            return Ok(Criterion::CategoryBudget);
        }
        if self.meets_authority_rule(text) {
            return Ok(Criterion::AuthorityKeyword);
        }
        Err(Exclusion::Relevance)
    }

    /// Filter a batch of fragments.
    #[instrument(skip_all, fields(history = history.len()))]
    pub fn filter<I>(&self, fragments: I, history: &HistorySet) -> FilterOutcome
    where
        I: IntoIterator<Item = RecordFragment>,
    {
        let mut outcome = FilterOutcome::default();

        for fragment in fragments {
            match self.check(&fragment, history) {
                Ok(criterion) => {
                    debug!(id = %fragment.id, ?criterion, "relevant entry");
                    outcome.entries.insert(fragment.id.clone(), fragment);
                }
                Err(reason) => outcome.counts.record(reason),
            }
        }

        let counts = outcome.counts;
        info!(
            by_status = counts.status,
            by_window = counts.window,
            by_history = counts.history,
            by_relevance = counts.relevance,
            relevant = outcome.entries.len(),
            window_days = self.window_days,
            "filter complete"
        );

        outcome
    }

    fn within_window(&self, text: &str) -> bool {
        fields::issue_date(text).is_some_and(|date| {
            let age = (self.today - date).num_days();
            (0..=self.window_days).contains(&age)
        })
    }

    fn is_local(&self, text: &str) -> bool {
        let area = fields::location_block(text).unwrap_or(text);
        self.local_area.as_ref().is_some_and(|re| re.is_match(area))
    }

    /// Criterion A: qualifying category code and a budget over the tier.
    fn meets_budget_rule(&self, text: &str) -> bool {
        let has_code = fields::cpv_codes(text)
            .iter()
            .any(|code| self.cpv_codes.contains(*code));
        if !has_code {
            return false;
        }

        let budget = fields::budget(text).unwrap_or(0.0);
        let threshold = if self.is_local(text) {
            self.min_budget_local
        } else {
            self.min_budget_national
        };
        budget >= threshold
    }

    /// Criterion B: interesting authority and a keyword in title or summary.
    fn meets_authority_rule(&self, text: &str) -> bool {
        let authority = fields::authority_name(text).unwrap_or_default();
        if !self.authorities.is_match(authority) {
            return false;
        }

        let haystack = format!(
            "{} {}",
            clean_text(fields::title(text).unwrap_or_default()),
            clean_text(fields::summary(text).unwrap_or_default()),
        );
        self.keywords.is_match(&haystack)
    }
}

/// Case-insensitive alternation of region names (literal) and extra patterns.
/// `None` when nothing is configured, so every tender uses the national tier.
fn local_area_regex(criteria: &FilterCriteria) -> Result<Option<Regex>> {
    let alternatives: Vec<String> = criteria
        .local_regions
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .map(regex::escape)
        .chain(
            criteria
                .local_extra_patterns
                .iter()
                .filter(|p| !p.trim().is_empty())
                .cloned(),
        )
        .map(|p| format!("(?:{p})"))
        .collect();

    if alternatives.is_empty() {
        return Ok(None);
    }

    RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|e| TenderWatchError::config(format!("invalid local area pattern: {e}")))
}
