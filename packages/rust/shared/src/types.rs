//! Core domain types for the tender feed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// UniqueId
// ---------------------------------------------------------------------------

/// Stable identifier of one tender record, used for history and dedup.
///
/// Never empty. Identifiers derived from the record itself are stable across
/// runs; [`UniqueId::generated`] ones are not and are flagged by [`IdSource`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId(String);

impl UniqueId {
    /// Wrap an extracted identifier. Returns `None` for blank input.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Generate a placeholder identifier for a record that carries none.
    pub fn generated() -> Self {
        Self(format!("gen-{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UniqueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UniqueId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which extractor produced a fragment's [`UniqueId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSource {
    /// "Expediente" case number embedded in the title.
    CaseNumber,
    /// Trailing segment of the `<id>` element.
    IdTail,
    /// Random placeholder; not stable across runs.
    Generated,
}

// ---------------------------------------------------------------------------
// RecordFragment
// ---------------------------------------------------------------------------

/// Raw text of one `<entry>` plus its extracted identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFragment {
    pub id: UniqueId,
    pub id_source: IdSource,
    pub text: String,
}

// ---------------------------------------------------------------------------
// HistorySet
// ---------------------------------------------------------------------------

/// Identifiers already handled by earlier runs.
///
/// Built from the persisted history plus the ids of archived results. Blank
/// identifiers are dropped on the way in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySet {
    ids: HashSet<UniqueId>,
}

impl HistorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &UniqueId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for HistorySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<S: AsRef<str>> Extend<S> for HistorySet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.ids.extend(iter.into_iter().filter_map(UniqueId::new));
    }
}

// ---------------------------------------------------------------------------
// EnrichedTender
// ---------------------------------------------------------------------------

/// Structured tender produced by the enrichment call.
///
/// Every field the external call could not fill is left empty; only `id` is
/// guaranteed to be set (it is overlaid from the raw fragment).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnrichedTender {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub publication_date: String,
    pub contracting_authority: String,
    /// Province of the place of execution.
    pub province: String,
    /// Budget excluding taxes.
    pub budget: Option<f64>,
    pub currency: String,
    /// Deadline for submitting offers.
    pub deadline: String,
    pub link: String,
    pub cpv_codes: Vec<String>,
    pub status: String,
    pub execution_period: String,
    pub procedure: String,
    pub award_criteria: String,
    pub provisional_guarantee: String,
    pub solvency: String,
}

impl EnrichedTender {
    /// Budget used for ranking; a missing budget ranks as zero.
    pub fn ranking_budget(&self) -> f64 {
        self.budget.unwrap_or(0.0)
    }
}
