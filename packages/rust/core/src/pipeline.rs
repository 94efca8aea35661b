//! End-to-end run: archive → unpack → extract → filter → enrich → aggregate.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument, warn};

use tenderwatch_feed::{
    ArchivePayload, DownloadOptions, download_archive, extract_all, monthly_archive_url,
    period_label, unpack,
};
use tenderwatch_filter::{ExclusionCounts, RelevanceFilter};
use tenderwatch_shared::{
    AppConfig, EnrichedTender, FilterCriteria, IdSource, Result, TenderWatchError,
};
use tenderwatch_storage::Storage;

use crate::aggregate::aggregate;
use crate::enrichment::{EnrichOutcome, Enricher};
use crate::model::StructuringModel;
use crate::quota::QuotaTracker;
use crate::retry::RetryPolicy;

const STEP_TOTAL: usize = 5;

// ---------------------------------------------------------------------------
// Configuration and inputs
// ---------------------------------------------------------------------------

/// Settings for one run, fixed before it starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub criteria: FilterCriteria,
    pub retry: RetryPolicy,
    pub daily_limit: u32,
    /// Base of the monthly archive URL (see [`monthly_archive_url`]).
    pub feed_base_url: String,
    pub download: DownloadOptions,
    /// Dry run: nothing is written to the history or results stores.
    pub test_mode: bool,
    /// Evaluate the recency window against this date instead of today.
    pub reference_date: Option<NaiveDate>,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            criteria: FilterCriteria::from(config),
            retry: RetryPolicy::default(),
            daily_limit: config.gemini.daily_limit,
            feed_base_url: config.feed.base_url.clone(),
            download: DownloadOptions {
                timeout_secs: config.feed.timeout_secs,
            },
            test_mode: false,
            reference_date: None,
        }
    }
}

/// Where the monthly archive comes from.
#[derive(Debug, Clone)]
pub enum ArchiveSource {
    /// Download the archive of `month` (current month if `None`).
    Download { month: Option<NaiveDate> },
    /// Read a previously downloaded archive.
    File {
        path: PathBuf,
        month: Option<NaiveDate>,
    },
    /// Archive already in memory.
    Bytes { bytes: Vec<u8>, period: String },
}

// ---------------------------------------------------------------------------
// Progress and cancellation
// ---------------------------------------------------------------------------

/// Receives progress events while a run is in flight.
pub trait ProgressReporter: Send + Sync {
    /// Entering step `index` of `total`.
    fn step(&self, index: usize, total: usize, label: &str);
    /// Enrichment position within the relevant entries.
    fn progress(&self, current: usize, total: usize);
    /// A tender was enriched.
    fn tender(&self, tender: &EnrichedTender);
    /// Free-form status line.
    fn log(&self, message: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn step(&self, _index: usize, _total: usize, _label: &str) {}
    fn progress(&self, _current: usize, _total: usize) {}
    fn tender(&self, _tender: &EnrichedTender) {}
    fn log(&self, _message: &str) {}
}

/// Cooperative stop request, checked between entries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Counters collected over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    /// Feed documents found in the archive.
    pub documents: usize,
    pub fragments: usize,
    /// Fragments whose id had to be generated.
    pub generated_ids: usize,
    pub excluded: ExclusionCounts,
    pub relevant: usize,
    pub enriched: usize,
    pub failed: usize,
    /// Relevant entries never attempted (quota reached or run cancelled).
    pub skipped: usize,
    pub quota_exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// No relevant entries; nothing was sent to the model.
    NothingToDo,
    Cancelled,
}

/// Result of [`run_analysis`].
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Archive month, `MM/YYYY`.
    pub period: String,
    /// Enriched tenders, largest budget first.
    pub tenders: Vec<EnrichedTender>,
    pub counters: RunCounters,
    /// HTML digest of `tenders`, if it could be generated.
    pub digest: Option<String>,
    pub elapsed: Duration,
    pub test_mode: bool,
    pub status: RunStatus,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the full analysis.
///
/// 1. Acquire the monthly archive
/// 2. Unpack it and split the feed documents into entries
/// 3. Filter against the criteria and the already-seen ids
/// 4. Enrich each relevant entry, one at a time, with pacing
/// 5. Order the tenders, write the digest and persist the run
///
/// Fails on an unreadable archive, or when relevant entries existed but none
/// could be enriched. Every other problem is counted and logged.
#[instrument(skip_all, fields(test_mode = config.test_mode))]
pub async fn run_analysis(
    config: &RunConfig,
    source: ArchiveSource,
    model: &dyn StructuringModel,
    storage: &Storage,
    progress: &dyn ProgressReporter,
    cancel: &CancelFlag,
) -> Result<RunReport> {
    let start = Instant::now();
    let today = config.reference_date.unwrap_or_else(|| Utc::now().date_naive());
    let mut counters = RunCounters::default();

    // --- Step 1: Archive ---
    progress.step(1, STEP_TOTAL, "Downloading monthly archive");
    let ArchivePayload { bytes, period } = acquire_archive(config, source, today).await?;
    info!(%period, bytes = bytes.len(), "archive ready");

    // --- Step 2: Unpack and extract ---
    progress.step(2, STEP_TOTAL, "Extracting entries");
    let documents = unpack(&bytes)?;
    drop(bytes);
    let fragments = extract_all(&documents);
    counters.documents = documents.len();
    counters.fragments = fragments.len();
    counters.generated_ids = fragments
        .iter()
        .filter(|f| f.id_source == IdSource::Generated)
        .count();
    drop(documents);
    progress.log(&format!(
        "{} entries in {} documents",
        counters.fragments, counters.documents
    ));

    // --- Step 3: Filter ---
    progress.step(3, STEP_TOTAL, "Filtering relevant tenders");
    let mut seen = storage.history.set();
    seen.extend(storage.results.all_ids());
    let filter = RelevanceFilter::new(&config.criteria)?.at(today);
    let outcome = filter.filter(fragments, &seen);
    counters.excluded = outcome.counts;
    counters.relevant = outcome.entries.len();

    if outcome.entries.is_empty() {
        progress.log("No new tenders this time");
        return Ok(RunReport {
            period,
            tenders: Vec::new(),
            counters,
            digest: None,
            elapsed: start.elapsed(),
            test_mode: config.test_mode,
            status: RunStatus::NothingToDo,
        });
    }

    // --- Step 4: Enrich ---
    let total = outcome.entries.len();
    progress.step(4, STEP_TOTAL, &format!("Analysing {total} tenders"));
    let quota = QuotaTracker::new(storage.usage.clone(), config.daily_limit);
    let enricher = Enricher::new(model, &quota, config.retry);
    let mut enriched = Vec::with_capacity(total);
    let mut cancelled = false;

    for (i, (id, fragment)) in outcome.entries.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(done = i, total, "run cancelled");
            cancelled = true;
            counters.skipped = total - i;
            break;
        }

        progress.progress(i + 1, total);
        match enricher.enrich(fragment).await {
            EnrichOutcome::Enriched(tender) => {
                progress.tender(&tender);
                enriched.push(tender);
            }
            EnrichOutcome::QuotaExhausted => {
                counters.quota_exhausted = true;
                counters.skipped = total - i;
                progress.log(&format!(
                    "Daily quota of {} calls reached, {} entries left",
                    quota.daily_limit(),
                    total - i
                ));
                break;
            }
            EnrichOutcome::Failed { .. } => {
                counters.failed += 1;
                progress.log(&format!("Could not analyse {id}"));
            }
        }

        if i + 1 < total && !config.criteria.pacing.is_zero() {
            tokio::time::sleep(config.criteria.pacing).await;
        }
    }
    counters.enriched = enriched.len();

    if enriched.is_empty() && !cancelled {
        return Err(TenderWatchError::NothingEnriched {
            relevant: counters.relevant,
        });
    }

    // --- Step 5: Aggregate, digest and persist ---
    progress.step(5, STEP_TOTAL, "Building summary");
    let tenders = aggregate(enriched);
    let digest = if cancelled {
        None
    } else {
        enricher.digest(&tenders, &period).await
    };

    if config.test_mode {
        progress.log("Test mode: history and results left untouched");
    } else if !tenders.is_empty() {
        storage.results.record_execution(&tenders, &period, Utc::now())?;
        storage.history.append(tenders.iter().map(|t| t.id.as_str()))?;
    }

    let elapsed = start.elapsed();
    info!(
        %period,
        relevant = counters.relevant,
        enriched = counters.enriched,
        failed = counters.failed,
        skipped = counters.skipped,
        elapsed_secs = elapsed.as_secs(),
        "run complete"
    );

    Ok(RunReport {
        period,
        tenders,
        counters,
        digest,
        elapsed,
        test_mode: config.test_mode,
        status: if cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        },
    })
}

async fn acquire_archive(
    config: &RunConfig,
    source: ArchiveSource,
    today: NaiveDate,
) -> Result<ArchivePayload> {
    match source {
        ArchiveSource::Download { month } => {
            let month = month.unwrap_or(today);
            let url = monthly_archive_url(&config.feed_base_url, month);
            download_archive(&url, month, &config.download).await
        }
        ArchiveSource::File { path, month } => {
            let bytes = std::fs::read(&path).map_err(|e| TenderWatchError::io(&path, e))?;
            Ok(ArchivePayload {
                bytes,
                period: period_label(month.unwrap_or(today)),
            })
        }
        ArchiveSource::Bytes { bytes, period } => Ok(ArchivePayload { bytes, period }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use zip::write::SimpleFileOptions;

    use crate::model::CallError;

    const FIXTURE: &str = "../../../fixtures/atom/licitacionesPerfilesContratanteCompleto3.atom";

    /// Answers every structuring call with a fixed tender, or always fails.
    struct StubModel {
        fail: bool,
        calls: Mutex<u32>,
    }

    impl StubModel {
        fn ok() -> Self {
            Self {
                fail: false,
                calls: Mutex::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl StructuringModel for StubModel {
        async fn structure(&self, _entry: &str) -> std::result::Result<EnrichedTender, CallError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err(CallError::InvalidResponse("not json".into()));
            }
            Ok(EnrichedTender {
                title: "Parsed tender".into(),
                province: "Murcia".into(),
                ..Default::default()
            })
        }

        async fn summarize(
            &self,
            tenders: &[EnrichedTender],
            period: &str,
        ) -> std::result::Result<String, CallError> {
            *self.calls.lock().unwrap() += 1;
            Ok(format!("<p>{} tenders in {period}</p>", tenders.len()))
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        steps: Mutex<Vec<usize>>,
        tenders: Mutex<Vec<String>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn step(&self, index: usize, _total: usize, _label: &str) {
            self.steps.lock().unwrap().push(index);
        }
        fn progress(&self, _current: usize, _total: usize) {}
        fn tender(&self, tender: &EnrichedTender) {
            self.tenders.lock().unwrap().push(tender.id.clone());
        }
        fn log(&self, _message: &str) {}
    }

    fn fixture_zip() -> Vec<u8> {
        let atom = std::fs::read_to_string(FIXTURE).expect("read atom fixture");
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("licitacionesPerfilesContratanteCompleto3.atom", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(atom.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn source() -> ArchiveSource {
        ArchiveSource::Bytes {
            bytes: fixture_zip(),
            period: "05/2024".into(),
        }
    }

    fn run_config() -> RunConfig {
        let mut config = RunConfig::from(&AppConfig::default());
        config.criteria.pacing = Duration::ZERO;
        config.retry.max_attempts = 1;
        config.reference_date = NaiveDate::from_ymd_opt(2024, 5, 10);
        config
    }

    fn storage() -> (Storage, PathBuf) {
        let dir = std::env::temp_dir().join(format!("tw_test_{}", uuid::Uuid::now_v7()));
        (Storage::open(&dir).unwrap(), dir)
    }

    #[tokio::test]
    async fn fixture_run_end_to_end() {
        let (storage, dir) = storage();
        let model = StubModel::ok();
        let progress = RecordingProgress::default();

        let report = run_analysis(
            &run_config(),
            source(),
            &model,
            &storage,
            &progress,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.period, "05/2024");
        assert_eq!(report.counters.documents, 1);
        assert_eq!(report.counters.fragments, 4);
        assert_eq!(report.counters.excluded.status, 1);
        assert_eq!(report.counters.excluded.window, 1);
        assert_eq!(report.counters.excluded.relevance, 0);
        assert_eq!(report.counters.relevant, 2);
        assert_eq!(report.counters.enriched, 2);

        let ids: Vec<&str> = report.tenders.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["2024/SUM/0117", "9988776"]);
        assert_eq!(report.tenders[0].budget, Some(45_000.0));
        assert_eq!(report.tenders[0].publication_date, "2024-05-06");
        assert_eq!(report.digest.as_deref(), Some("<p>2 tenders in 05/2024</p>"));
        assert_eq!(*progress.steps.lock().unwrap(), [1, 2, 3, 4, 5]);
        assert_eq!(progress.tenders.lock().unwrap().len(), 2);

        // two structuring calls and the digest
        assert_eq!(model.calls(), 3);
        assert_eq!(storage.usage.calls_on(Utc::now().date_naive()), 3);

        let history = storage.history.load();
        assert_eq!(history.total_ids, 2);
        assert_eq!(storage.results.load().executions.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn second_run_finds_nothing_new() {
        let (storage, dir) = storage();
        let model = StubModel::ok();
        let cancel = CancelFlag::new();

        run_analysis(&run_config(), source(), &model, &storage, &SilentProgress, &cancel)
            .await
            .unwrap();
        let again = run_analysis(&run_config(), source(), &model, &storage, &SilentProgress, &cancel)
            .await
            .unwrap();

        assert_eq!(again.status, RunStatus::NothingToDo);
        assert_eq!(again.counters.excluded.history, 2);
        assert!(again.tenders.is_empty());
        assert_eq!(model.calls(), 3);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_mode_leaves_stores_untouched() {
        let (storage, dir) = storage();
        let mut config = run_config();
        config.test_mode = true;

        let report = run_analysis(
            &config,
            source(),
            &StubModel::ok(),
            &storage,
            &SilentProgress,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

        assert!(report.test_mode);
        assert_eq!(report.tenders.len(), 2);
        assert!(storage.history.set().is_empty());
        assert!(storage.results.load().executions.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn nothing_enriched_is_an_error() {
        let (storage, dir) = storage();

        let err = run_analysis(
            &run_config(),
            source(),
            &StubModel::failing(),
            &storage,
            &SilentProgress,
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TenderWatchError::NothingEnriched { relevant: 2 }));
        assert!(storage.history.set().is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn quota_stops_dispatching() {
        let (storage, dir) = storage();
        let mut config = run_config();
        config.daily_limit = 1;
        let model = StubModel::ok();

        let report = run_analysis(&config, source(), &model, &storage, &SilentProgress, &CancelFlag::new())
            .await
            .unwrap();

        assert!(report.counters.quota_exhausted);
        assert_eq!(report.counters.enriched, 1);
        assert_eq!(report.counters.skipped, 1);
        assert_eq!(report.digest, None);
        assert_eq!(model.calls(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn cancelled_before_enrichment() {
        let (storage, dir) = storage();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let model = StubModel::ok();

        let report = run_analysis(&run_config(), source(), &model, &storage, &SilentProgress, &cancel)
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.counters.skipped, 2);
        assert!(report.tenders.is_empty());
        assert_eq!(model.calls(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    /// Raises the cancel flag as soon as the first tender comes back.
    struct CancelOnTender(CancelFlag);

    impl ProgressReporter for CancelOnTender {
        fn step(&self, _index: usize, _total: usize, _label: &str) {}
        fn progress(&self, _current: usize, _total: usize) {}
        fn tender(&self, _tender: &EnrichedTender) {
            self.0.cancel();
        }
        fn log(&self, _message: &str) {}
    }

    #[tokio::test]
    async fn cancel_mid_run_keeps_enriched_tenders() {
        let (storage, dir) = storage();
        let cancel = CancelFlag::new();
        let progress = CancelOnTender(cancel.clone());
        let model = StubModel::ok();

        let report = run_analysis(&run_config(), source(), &model, &storage, &progress, &cancel)
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.counters.enriched, 1);
        assert_eq!(report.counters.skipped, 1);
        assert_eq!(report.tenders.len(), 1);
        assert_eq!(report.digest, None);
        // no digest call after the cancel
        assert_eq!(model.calls(), 1);

        assert_eq!(storage.history.load().total_ids, 1);
        let executions = storage.results.load().executions;
        assert_eq!(executions.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_between_entries_only() {
        let (storage, dir) = storage();
        let mut config = run_config();
        config.criteria.pacing = Duration::from_secs(3);

        let started = tokio::time::Instant::now();
        run_analysis(&config, source(), &StubModel::ok(), &storage, &SilentProgress, &CancelFlag::new())
            .await
            .unwrap();

        // two entries, one pause
        assert_eq!(started.elapsed(), Duration::from_secs(3));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn corrupt_archive_fails_the_run() {
        let (storage, dir) = storage();
        let source = ArchiveSource::Bytes {
            bytes: b"not a zip".to_vec(),
            period: "05/2024".into(),
        };

        let err = run_analysis(&run_config(), source, &StubModel::ok(), &storage, &SilentProgress, &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TenderWatchError::Archive { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn local_file_source() {
        let (storage, dir) = storage();
        let path = dir.join("archive.zip");
        std::fs::write(&path, fixture_zip()).unwrap();

        let report = run_analysis(
            &run_config(),
            ArchiveSource::File {
                path,
                month: NaiveDate::from_ymd_opt(2024, 5, 1),
            },
            &StubModel::ok(),
            &storage,
            &SilentProgress,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.period, "05/2024");
        assert_eq!(report.counters.relevant, 2);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
