//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tenderwatch_core::{
    ArchiveSource, CancelFlag, GeminiClient, ProgressReporter, QuotaTracker, RunConfig, RunReport,
    RunStatus, run_analysis,
};
use tenderwatch_shared::{AppConfig, EnrichedTender, api_key, data_dir, init_config, load_config};
use tenderwatch_storage::{SearchQuery, Storage};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// TenderWatch: filter and analyse the monthly public procurement feed.
#[derive(Parser)]
#[command(
    name = "tenderwatch",
    version,
    about = "Find relevant public tenders in the monthly procurement archive.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Download, filter and analyse a monthly archive.
    Run {
        /// Read a local archive instead of downloading it.
        #[arg(long)]
        archive: Option<PathBuf>,

        /// Month to process (YYYYMM). Defaults to the current month.
        #[arg(long, value_parser = parse_month_arg)]
        month: Option<NaiveDate>,

        /// Dry run: history and results are not updated.
        #[arg(long)]
        test: bool,

        /// Write the HTML digest to this file.
        #[arg(long)]
        digest_out: Option<PathBuf>,
    },

    /// Inspect or edit the processed-id history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Show external call usage against the daily quota.
    Usage,

    /// Query stored results.
    Results {
        #[command(subcommand)]
        action: ResultsAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum HistoryAction {
    /// Print history size and the most recent ids.
    Show {
        /// Number of recent ids to print.
        #[arg(long, default_value = "20")]
        last: usize,
    },
    /// Forget every processed id.
    Clear,
    /// Forget one id so the next run can pick it up again.
    Remove { id: String },
}

#[derive(Subcommand)]
pub(crate) enum ResultsAction {
    /// Search stored tenders by publication date and id.
    Search {
        /// Earliest publication date (YYYY-MM-DD).
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Latest publication date (YYYY-MM-DD).
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Substring of the tender id.
        #[arg(long)]
        id: Option<String>,

        /// Print matches as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete a tender from stored results.
    Remove { id: String },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

fn parse_month_arg(raw: &str) -> std::result::Result<NaiveDate, String> {
    tenderwatch_feed::parse_month(raw).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "tenderwatch=info",
        1 => "tenderwatch=debug",
        _ => "tenderwatch=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            archive,
            month,
            test,
            digest_out,
        } => cmd_run(archive, month, test, digest_out).await,
        Command::History { action } => match action {
            HistoryAction::Show { last } => cmd_history_show(last),
            HistoryAction::Clear => cmd_history_clear(),
            HistoryAction::Remove { id } => cmd_history_remove(&id),
        },
        Command::Usage => cmd_usage(),
        Command::Results { action } => match action {
            ResultsAction::Search { from, to, id, json } => {
                cmd_results_search(SearchQuery { from, to, id }, json)
            }
            ResultsAction::Remove { id } => cmd_results_remove(&id),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

fn open_storage(config: &AppConfig) -> Result<Storage> {
    let dir = data_dir(config)?;
    Ok(Storage::open(&dir)?)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(
    archive: Option<PathBuf>,
    month: Option<NaiveDate>,
    test: bool,
    digest_out: Option<PathBuf>,
) -> Result<()> {
    let config = load_config()?;
    let key = api_key(&config)?;
    let model = GeminiClient::new(&config.gemini, key)?;
    let storage = open_storage(&config)?;

    let mut run_config = RunConfig::from(&config);
    run_config.test_mode = test;

    let source = match archive {
        Some(path) => ArchiveSource::File { path, month },
        None => ArchiveSource::Download { month },
    };

    info!(
        test_mode = test,
        model = %config.gemini.model,
        data_dir = %storage.dir().display(),
        "starting analysis"
    );

    let cancel = CancelFlag::new();
    let watcher = tokio::spawn(watch_interrupt(cancel.clone()));

    let reporter = CliProgress::new();
    let result = run_analysis(&run_config, source, &model, &storage, &reporter, &cancel).await;
    reporter.finish();
    watcher.abort();

    let report = result?;
    print_report(&report);

    if let Some(path) = digest_out {
        match &report.digest {
            Some(html) => {
                std::fs::write(&path, html)
                    .map_err(|e| eyre!("cannot write digest to {}: {e}", path.display()))?;
                println!("  Digest: {}", path.display());
            }
            None => warn!("no digest was generated, {} not written", path.display()),
        }
    }

    Ok(())
}

/// First Ctrl-C stops after the current entry; a second one exits at once.
async fn watch_interrupt(cancel: CancelFlag) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    warn!("interrupt received, stopping after the current entry");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        std::process::exit(130);
    }
}

fn print_report(report: &RunReport) {
    let c = &report.counters;

    println!();
    match report.status {
        RunStatus::NothingToDo => println!("  No new relevant tenders for {}.", report.period),
        RunStatus::Cancelled => println!("  Run cancelled ({}).", report.period),
        RunStatus::Completed => println!("  Analysis of {} complete.", report.period),
    }
    if report.test_mode {
        println!("  Test mode: history and results not updated.");
    }
    println!("  Entries:   {} in {} documents", c.fragments, c.documents);
    println!(
        "  Excluded:  {} status, {} window, {} history, {} relevance",
        c.excluded.status, c.excluded.window, c.excluded.history, c.excluded.relevance
    );
    println!("  Relevant:  {}", c.relevant);
    println!("  Enriched:  {} ({} failed, {} skipped)", c.enriched, c.failed, c.skipped);
    if c.quota_exhausted {
        println!("  Daily quota reached before every entry was analysed.");
    }
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());

    if !report.tenders.is_empty() {
        println!();
        for tender in &report.tenders {
            print_tender(tender);
        }
    }
    println!();
}

fn print_tender(tender: &EnrichedTender) {
    println!(
        "  {:>16}  {}  {}",
        format_budget(tender.budget, &tender.currency),
        tender.publication_date,
        tender.title
    );
    println!("  {:>16}  {} | {}", "", tender.id, tender.contracting_authority);
}

fn format_budget(budget: Option<f64>, currency: &str) -> String {
    match budget {
        Some(amount) => format!("{amount:.0} {currency}"),
        None => "-".to_string(),
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn step(&self, index: usize, total: usize, label: &str) {
        self.spinner.println(format!("[{index}/{total}] {label}"));
        self.spinner.set_message(label.to_string());
    }

    fn progress(&self, current: usize, total: usize) {
        self.spinner.set_message(format!("Analysing [{current}/{total}]"));
    }

    fn tender(&self, tender: &EnrichedTender) {
        self.spinner.println(format!("  ok  {}", tender.title));
    }

    fn log(&self, message: &str) {
        self.spinner.println(format!("  {message}"));
    }
}

// ---------------------------------------------------------------------------
// history / usage / results / config
// ---------------------------------------------------------------------------

fn cmd_history_show(last: usize) -> Result<()> {
    let storage = open_storage(&load_config()?)?;
    let history = storage.history.load();

    println!("Processed ids: {}", history.total_ids);
    match history.last_updated {
        Some(at) => println!("Last updated:  {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Last updated:  never"),
    }

    let skip = history.processed_ids.len().saturating_sub(last);
    for id in &history.processed_ids[skip..] {
        println!("  {id}");
    }
    Ok(())
}

fn cmd_history_clear() -> Result<()> {
    let storage = open_storage(&load_config()?)?;
    storage.history.clear()?;
    println!("History cleared.");
    Ok(())
}

fn cmd_history_remove(id: &str) -> Result<()> {
    let storage = open_storage(&load_config()?)?;
    if storage.history.remove(id)? {
        println!("Removed {id} from history.");
        Ok(())
    } else {
        Err(eyre!("'{id}' is not in the history"))
    }
}

fn cmd_usage() -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config)?;
    let stats = QuotaTracker::new(storage.usage.clone(), config.gemini.daily_limit).stats();

    println!(
        "Today:     {}/{} calls ({}%), {} remaining",
        stats.today, stats.limit, stats.percentage, stats.remaining
    );
    println!("7-day avg: {}", stats.avg_last_7);
    println!();
    for day in &stats.history {
        println!("  {}  {:>5}", day.date, day.calls);
    }
    Ok(())
}

fn cmd_results_search(query: SearchQuery, json: bool) -> Result<()> {
    let storage = open_storage(&load_config()?)?;
    let hits = storage.results.search(&query);

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    println!("{} matching tenders", hits.len());
    for hit in &hits {
        print_tender(&hit.tender);
    }
    Ok(())
}

fn cmd_results_remove(id: &str) -> Result<()> {
    let storage = open_storage(&load_config()?)?;
    if storage.results.remove_tender(id)? {
        println!("Removed {id} from results.");
        Ok(())
    } else {
        Err(eyre!("'{id}' is not in the stored results"))
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::parse_from([
            "tenderwatch",
            "run",
            "--month",
            "202405",
            "--test",
            "--archive",
            "may.zip",
        ]);
        let Command::Run {
            archive,
            month,
            test,
            digest_out,
        } = cli.command
        else {
            panic!("expected run command");
        };
        assert_eq!(archive, Some(PathBuf::from("may.zip")));
        assert_eq!(month, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert!(test);
        assert!(digest_out.is_none());
    }

    #[test]
    fn bad_month_is_rejected() {
        assert!(Cli::try_parse_from(["tenderwatch", "run", "--month", "2024-05"]).is_err());
    }

    #[test]
    fn budget_formatting() {
        assert_eq!(format_budget(Some(45_000.4), "EUR"), "45000 EUR");
        assert_eq!(format_budget(None, "EUR"), "-");
    }
}
