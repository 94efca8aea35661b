//! JSON-file persistence for TenderWatch.
//!
//! The [`Storage`] struct groups the three stores kept in the data directory:
//! - [`HistoryStore`] (`history.json`): ids already handled by earlier runs
//! - [`UsageStore`] (`api-usage.json`): per-day external call counter
//! - [`ResultsStore`] (`results.json`): archive of past executions
//!
//! **Access rules:**
//! - Loading never fails: a missing or corrupt file yields the default value.
//! - Saving rewrites the whole file through a temporary file and a rename.
//! - One writer process at a time; callers guard against concurrent runs.

mod history;
mod results;
mod usage;

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tenderwatch_shared::{Result, TenderWatchError};
use tracing::warn;

pub use history::{HistoryFile, HistoryStore, MAX_HISTORY_IDS};
pub use results::{Execution, MAX_EXECUTIONS, ResultsArchive, ResultsStore, SearchHit, SearchQuery};
pub use usage::{DailyCalls, DayUsage, RETAINED_DAYS, UsageLedger, UsageStats, UsageStore};

/// Handle on the data directory and its stores.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
    pub history: HistoryStore,
    pub usage: UsageStore,
    pub results: ResultsStore,
}

impl Storage {
    /// Open (creating if needed) the data directory at `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| TenderWatchError::io(dir, e))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            history: HistoryStore::new(dir.join("history.json")),
            usage: UsageStore::new(dir.join("api-usage.json")),
            results: ResultsStore::new(dir.join("results.json")),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Read a JSON file, falling back to the default on absence or corruption.
pub(crate) fn load_json<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(?path, error = %e, "cannot read store, using empty state");
            return T::default();
        }
    };

    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(?path, error = %e, "corrupt store, using empty state");
        T::default()
    })
}

/// Overwrite a JSON file atomically (write a sibling temp file, then rename).
pub(crate) fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TenderWatchError::io(parent, e))?;
    }

    let body = serde_json::to_string_pretty(value)
        .map_err(|e| TenderWatchError::Storage(format!("cannot serialize {}: {e}", path.display())))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body).map_err(|e| TenderWatchError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| TenderWatchError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("tw_test_{}", uuid::Uuid::now_v7()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        values: Vec<u32>,
    }

    #[test]
    fn open_creates_directory() {
        let dir = temp_dir().join("nested");
        let storage = Storage::open(&dir).unwrap();
        assert!(storage.dir().is_dir());
        let _ = std::fs::remove_dir_all(dir.parent().unwrap());
    }

    #[test]
    fn missing_and_corrupt_files_load_default() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();

        let missing: Sample = load_json(&dir.join("missing.json"));
        assert_eq!(missing, Sample::default());

        let corrupt = dir.join("corrupt.json");
        std::fs::write(&corrupt, "{ not json").unwrap();
        let loaded: Sample = load_json(&corrupt);
        assert_eq!(loaded, Sample::default());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_replaces_whole_file() {
        let dir = temp_dir();
        let path = dir.join("sample.json");

        save_json(&path, &Sample { values: vec![1, 2, 3] }).unwrap();
        save_json(&path, &Sample { values: vec![9] }).unwrap();

        let loaded: Sample = load_json(&path);
        assert_eq!(loaded.values, vec![9]);
        assert!(!path.with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
