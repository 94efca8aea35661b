//! Enrichment and run orchestration for TenderWatch.
//!
//! Ties the feed, filter and storage crates together: relevant entries are
//! sent one by one to the structuring model under a daily quota and a shared
//! retry policy, then ordered and persisted by [`pipeline::run_analysis`].

pub mod aggregate;
pub mod enrichment;
pub mod gemini;
pub mod model;
pub mod pipeline;
pub mod quota;
pub mod retry;

pub use aggregate::aggregate;
pub use enrichment::{EnrichOutcome, Enricher, overlay};
pub use gemini::GeminiClient;
pub use model::{CallError, StructuringModel};
pub use pipeline::{
    ArchiveSource, CancelFlag, ProgressReporter, RunConfig, RunCounters, RunReport, RunStatus,
    SilentProgress, run_analysis,
};
pub use quota::QuotaTracker;
pub use retry::{FailureKind, RetryFailure, RetryPolicy, Retried, with_backoff};
