//! Cross-run history of processed tender ids.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tenderwatch_shared::{HistorySet, Result};
use tracing::info;

use crate::{load_json, save_json};

/// Maximum number of ids kept; the oldest are dropped first.
pub const MAX_HISTORY_IDS: usize = 50_000;

/// On-disk shape of `history.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryFile {
    pub last_updated: Option<DateTime<Utc>>,
    pub total_ids: usize,
    /// Oldest first.
    pub processed_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> HistoryFile {
        load_json(&self.path)
    }

    /// Known ids as a lookup set.
    pub fn set(&self) -> HistorySet {
        self.load().processed_ids.into_iter().collect()
    }

    /// Add ids not seen before, keeping the newest [`MAX_HISTORY_IDS`].
    /// Returns the number of ids stored afterwards.
    pub fn append<I, S>(&self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut file = self.load();
        let mut known: HashSet<String> = file.processed_ids.iter().cloned().collect();

        for id in ids {
            let id = id.into();
            if known.insert(id.clone()) {
                file.processed_ids.push(id);
            }
        }

        if file.processed_ids.len() > MAX_HISTORY_IDS {
            let excess = file.processed_ids.len() - MAX_HISTORY_IDS;
            file.processed_ids.drain(..excess);
        }

        let total = file.processed_ids.len();
        self.write(file.processed_ids)?;
        info!(total, "history saved");
        Ok(total)
    }

    /// Forget every id.
    pub fn clear(&self) -> Result<()> {
        self.write(Vec::new())?;
        info!("history cleared");
        Ok(())
    }

    /// Forget one id. Returns `false` if it was not known.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut file = self.load();
        let before = file.processed_ids.len();
        file.processed_ids.retain(|known| known != id);
        if file.processed_ids.len() == before {
            return Ok(false);
        }

        self.write(file.processed_ids)?;
        info!(%id, "removed id from history");
        Ok(true)
    }

    fn write(&self, processed_ids: Vec<String>) -> Result<()> {
        let file = HistoryFile {
            last_updated: Some(Utc::now()),
            total_ids: processed_ids.len(),
            processed_ids,
        };
        save_json(&self.path, &file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temp_dir;
    use tenderwatch_shared::UniqueId;

    fn store() -> (HistoryStore, PathBuf) {
        let dir = temp_dir();
        (HistoryStore::new(dir.join("history.json")), dir)
    }

    #[test]
    fn append_unions_and_keeps_order() {
        let (history, dir) = store();

        history.append(["A", "B"]).unwrap();
        let total = history.append(["B", "C"]).unwrap();

        assert_eq!(total, 3);
        let file = history.load();
        assert_eq!(file.processed_ids, vec!["A", "B", "C"]);
        assert_eq!(file.total_ids, 3);
        assert!(file.last_updated.is_some());
        assert!(history.set().contains(&UniqueId::new("C").unwrap()));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn append_caps_at_newest_ids() {
        let (history, dir) = store();

        let ids: Vec<String> = (0..MAX_HISTORY_IDS + 5).map(|i| format!("ID-{i}")).collect();
        let total = history.append(ids).unwrap();

        assert_eq!(total, MAX_HISTORY_IDS);
        let file = history.load();
        assert_eq!(file.processed_ids.first().map(String::as_str), Some("ID-5"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn remove_and_clear() {
        let (history, dir) = store();
        history.append(["A", "B"]).unwrap();

        assert!(history.remove("A").unwrap());
        assert!(!history.remove("missing").unwrap());
        assert_eq!(history.load().processed_ids, vec!["B"]);

        history.clear().unwrap();
        assert!(history.set().is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn reads_camel_case_file() {
        let (history, dir) = store();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("history.json"),
            r#"{"lastUpdated":"2024-05-01T10:00:00Z","totalIds":1,"processedIds":["X-1"]}"#,
        )
        .unwrap();

        assert_eq!(history.load().processed_ids, vec!["X-1"]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
