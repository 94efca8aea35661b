//! Application configuration for TenderWatch.
//!
//! User config lives at `~/.tenderwatch/tenderwatch.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TenderWatchError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tenderwatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tenderwatch";

/// Data directory name under the config directory.
const DATA_DIR_NAME: &str = "data";

// ---------------------------------------------------------------------------
// Default filter vocabulary
// ---------------------------------------------------------------------------

/// CPV codes that make a tender eligible for the budget criterion.
pub const DEFAULT_CPV_CODES: &[&str] = &[
    "45315600", "45315400", "45310000", "45331000", "42512000", "42511110", "45331220", "45311000",
    "45311100", "09310000", "31500000", "50232100", "71356200", "71310000", "50532000", "50532200",
    "50532400", "09332000", "09330000", "09331000", "09331200", "45316100", "34928500", "34928530",
    "45316000", "71313000", "71314300", "72220000", "72224000", "73000000", "79411000", "79419000",
    "50232110", "51100000", "45300000", "50700000", "50711000", "50720000", "50730000", "50721000",
];

/// Contracting authorities whose tenders are checked against the keywords.
pub const DEFAULT_AUTHORITIES: &[&str] = &[
    "DIRECCION GENERAL DE CARRETERAS",
    "ADIF",
    "AUTORIDAD PORTUARIA DE BARCELONA",
    "AUTORIDAD PORTUARIA DE MALAGA",
    "AUTORIDAD PORTUARIA DE CARTAGENA",
    "AUTORIDAD PORTUARIA DE VIGO",
    "Consejeria Fomento Murcia",
    "Empresa Municipal de Transportes de Madrid",
    "MCT",
    "ICA",
    "SEIASA",
    "CHS",
    "EMUASA",
    "UMH",
    "Aadif",
    "Intendente de Cartagena",
    "EMT PALMA",
    "AYUNTAMIENTO DE CARTAGENA",
];

/// Domain keywords searched in title and summary.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "energia",
    "instalaciones electricas",
    "climatizacion",
    "hidrogeno",
    "eficiencia energetica",
    "fotovoltaica",
];

// ---------------------------------------------------------------------------
// Config structs (matching tenderwatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Relevance filter settings.
    #[serde(default)]
    pub filters: FiltersConfig,

    /// Gemini settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Feed archive location.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Where history, usage and results are persisted.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[filters]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiltersConfig {
    /// Maximum age of the issue date, in days (inclusive).
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Budget threshold for tenders executed in a local region.
    #[serde(default = "default_min_budget_local")]
    pub min_budget_local: f64,

    /// Budget threshold for every other tender.
    #[serde(default = "default_min_budget_national")]
    pub min_budget_national: f64,

    /// Region names that select the local budget tier.
    #[serde(default = "default_local_regions")]
    pub local_regions: Vec<String>,

    /// Extra regex patterns (aliases, postal codes) that also select the local tier.
    #[serde(default = "default_local_extra_patterns")]
    pub local_extra_patterns: Vec<String>,

    /// Qualifying CPV codes. Empty means the default set.
    #[serde(default)]
    pub cpv_codes: Vec<String>,

    /// Interesting contracting authorities. Empty means the default set.
    #[serde(default)]
    pub authorities: Vec<String>,

    /// Domain keywords. Empty means the default set.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Pause between consecutive enrichment calls, in seconds.
    #[serde(default = "default_pause_seconds")]
    pub pause_seconds: u64,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            min_budget_local: default_min_budget_local(),
            min_budget_national: default_min_budget_national(),
            local_regions: default_local_regions(),
            local_extra_patterns: default_local_extra_patterns(),
            cpv_codes: Vec::new(),
            authorities: Vec::new(),
            keywords: Vec::new(),
            pause_seconds: default_pause_seconds(),
        }
    }
}

fn default_window_days() -> u32 {
    10
}
fn default_min_budget_local() -> f64 {
    30_000.0
}
fn default_min_budget_national() -> f64 {
    1_000_000.0
}
fn default_local_regions() -> Vec<String> {
    vec!["Murcia".into(), "Alicante".into()]
}
fn default_local_extra_patterns() -> Vec<String> {
    vec!["Alacant".into(), r"3000\d".into(), r"0300\d".into()]
}
fn default_pause_seconds() -> u64 {
    3
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for structuring and digests.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Maximum external calls per calendar day.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_gemini_base_url(),
            daily_limit: default_daily_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_daily_limit() -> u32 {
    1000
}
fn default_timeout_secs() -> u64 {
    120
}

/// `[feed]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Monthly archive URL without the `_YYYYMM.zip` suffix.
    #[serde(default = "default_feed_base_url")]
    pub base_url: String,

    /// Download timeout in seconds.
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_base_url(),
            timeout_secs: default_download_timeout(),
        }
    }
}

fn default_feed_base_url() -> String {
    "https://contrataciondelsectorpublico.gob.es/sindicacion/sindicacion_643/licitacionesPerfilesContratanteCompleto3".into()
}
fn default_download_timeout() -> u64 {
    300
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Defaults to `~/.tenderwatch/data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Filter criteria (runtime snapshot, immutable for one run)
// ---------------------------------------------------------------------------

/// Relevance criteria for one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCriteria {
    pub window_days: u32,
    pub min_budget_local: f64,
    pub min_budget_national: f64,
    pub local_regions: Vec<String>,
    pub local_extra_patterns: Vec<String>,
    pub cpv_codes: Vec<String>,
    pub authorities: Vec<String>,
    pub keywords: Vec<String>,
    /// Minimum pause between consecutive enrichment calls.
    pub pacing: Duration,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FilterCriteria {
    fn from(config: &AppConfig) -> Self {
        let f = &config.filters;
        Self {
            window_days: f.window_days,
            min_budget_local: f.min_budget_local,
            min_budget_national: f.min_budget_national,
            local_regions: f.local_regions.clone(),
            local_extra_patterns: f.local_extra_patterns.clone(),
            cpv_codes: or_defaults(&f.cpv_codes, DEFAULT_CPV_CODES),
            authorities: or_defaults(&f.authorities, DEFAULT_AUTHORITIES),
            keywords: or_defaults(&f.keywords, DEFAULT_KEYWORDS),
            pacing: Duration::from_secs(f.pause_seconds),
        }
    }
}

fn or_defaults(configured: &[String], defaults: &[&str]) -> Vec<String> {
    if configured.is_empty() {
        defaults.iter().map(|s| (*s).to_string()).collect()
    } else {
        configured.to_vec()
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tenderwatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TenderWatchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tenderwatch/tenderwatch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the data directory holding history, usage and results files.
pub fn data_dir(config: &AppConfig) -> Result<PathBuf> {
    match &config.storage.data_dir {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => Ok(config_dir()?.join(DATA_DIR_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TenderWatchError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        TenderWatchError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TenderWatchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TenderWatchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TenderWatchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the Gemini API key from the env var named in the config.
pub fn api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.gemini.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(TenderWatchError::config(format!(
            "Gemini API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the Gemini API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    api_key(config).map(|_| ())
}
