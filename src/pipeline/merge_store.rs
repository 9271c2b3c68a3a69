//! Persistent show dataset: load, merge and atomic persist.
//!
//! The Detailed file is keyed by [`ShowIdentity`]. A merge only ever adds or
//! replaces rows, so the stored set grows monotonically across runs.

use crate::error::{Result, ScraperError};
use crate::observability::metrics;
use crate::types::{NormalizedRow, ShowIdentity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// On-disk layout of a `<date>_Detailed.json` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedFile {
    pub date: String,
    #[serde(rename = "lastUpdated")]
    pub last_updated: String,
    pub shows: Vec<NormalizedRow>,
    #[serde(rename = "autoCorrected", default, skip_serializing_if = "Option::is_none")]
    pub auto_corrected: Option<usize>,
}

/// Envelope read back from disk; rows are decoded one at a time.
#[derive(Debug, Deserialize)]
struct StoredShows {
    shows: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub replaced: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MergedDataset {
    rows: BTreeMap<ShowIdentity, NormalizedRow>,
}

impl MergedDataset {
    pub fn from_rows(rows: impl IntoIterator<Item = NormalizedRow>) -> Self {
        let mut dataset = Self::default();
        dataset.merge(rows);
        dataset
    }

    /// Reads a Detailed file. A missing file yields an empty dataset.
    ///
    /// Rows that do not decode are dropped one by one and the file is copied
    /// to `<path>.corrupt` first. A file that cannot be read as a whole is
    /// moved there, so the next persist never destroys the only copy.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!("No prior dataset at {}", path.display());
            return Self::default();
        }
        match read_rows(path) {
            Ok((rows, dropped)) => {
                if dropped > 0 {
                    metrics::store::rows_undecodable(dropped);
                    warn!("{} undecodable rows dropped from {}", dropped, path.display());
                    if let Err(e) = fs::copy(path, corrupt_path(path)) {
                        warn!("Failed to keep a copy of {}: {}", path.display(), e);
                    }
                }
                let dataset = Self::from_rows(rows);
                metrics::store::rows_loaded(dataset.len());
                info!("Loaded prior dataset: {} shows from {}", dataset.len(), path.display());
                dataset
            }
            Err(e) => {
                metrics::store::corrupt_file();
                let aside = corrupt_path(path);
                match fs::rename(path, &aside) {
                    Ok(()) => warn!("Prior dataset {} is corrupt ({}), moved to {}", path.display(), e, aside.display()),
                    Err(rename_err) => warn!(
                        "Prior dataset {} is corrupt ({}) and could not be moved aside: {}",
                        path.display(),
                        e,
                        rename_err
                    ),
                }
                Self::default()
            }
        }
    }

    /// Key-wise union with `batch`; rows in `batch` win on shared keys.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = NormalizedRow>) -> MergeStats {
        let before = self.rows.len();
        let mut stats = MergeStats::default();
        for row in batch {
            match self.rows.insert(row.identity(), row) {
                Some(_) => stats.replaced += 1,
                None => stats.added += 1,
            }
        }
        debug_assert!(self.rows.len() >= before);
        metrics::store::rows_merged(stats.added, stats.replaced);
        stats
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, identity: &ShowIdentity) -> Option<&NormalizedRow> {
        self.rows.get(identity)
    }

    pub fn rows(&self) -> impl Iterator<Item = &NormalizedRow> {
        self.rows.values()
    }

    pub fn bad_data_count(&self) -> usize {
        self.rows.values().filter(|r| r.bad_data).count()
    }

    pub fn to_detailed(&self, date: &str, last_updated: &str, with_auto_corrected: bool) -> DetailedFile {
        DetailedFile {
            date: date.to_string(),
            last_updated: last_updated.to_string(),
            shows: self.rows.values().cloned().collect(),
            auto_corrected: with_auto_corrected.then(|| self.bad_data_count()),
        }
    }
}

/// Decodable rows of a Detailed file plus the number that were not.
fn read_rows(path: &Path) -> Result<(Vec<NormalizedRow>, usize)> {
    let bytes = fs::read(path)?;
    let stored: StoredShows = serde_json::from_slice(&bytes)?;
    let total = stored.shows.len();
    let rows: Vec<NormalizedRow> = stored
        .shows
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<NormalizedRow>(raw) {
            Ok(row) => Some(row),
            Err(e) => {
                debug!(error = %e, "Undecodable stored row");
                None
            }
        })
        .collect();
    if total > 0 && rows.is_empty() {
        return Err(ScraperError::MalformedPayload(format!("none of {} stored rows decode", total)));
    }
    let dropped = total - rows.len();
    Ok((rows, dropped))
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn tmp_path(path: &Path) -> PathBuf {
    sibling_path(path, ".tmp")
}

fn corrupt_path(path: &Path) -> PathBuf {
    sibling_path(path, ".corrupt")
}

/// Writes `value` as pretty JSON next to `path` and renames it into place,
/// so a reader never sees a half-written file.
pub fn persist<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_vec_pretty(value)?;
    let tmp = tmp_path(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&body)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    metrics::store::write();
    debug!("Wrote {} ({} bytes)", path.display(), body.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TicketTotals;
    use tempfile::TempDir;

    fn row(show_id: &str, sold: u64) -> NormalizedRow {
        let identity = ShowIdentity::new("7", "QFX", show_id);
        NormalizedRow::from_totals(
            &identity,
            "Film",
            "2025-12-09",
            TicketTotals {
                seats: 10,
                sold,
                reserved: 0,
                available: 10 - sold,
                gross: sold as f64 * 300.0,
            },
        )
    }

    #[test]
    fn merge_never_drops_prior_keys() {
        let mut dataset = MergedDataset::from_rows(vec![row("a", 1), row("b", 2)]);
        let stats = dataset.merge(vec![row("c", 3)]);
        assert_eq!(stats, MergeStats { added: 1, replaced: 0 });
        assert_eq!(dataset.len(), 3);
        for id in ["a", "b", "c"] {
            assert!(dataset.get(&ShowIdentity::new("7", "QFX", id)).is_some());
        }
    }

    #[test]
    fn merge_lets_new_rows_win() {
        let mut dataset = MergedDataset::from_rows(vec![row("a", 1)]);
        let stats = dataset.merge(vec![row("a", 9)]);
        assert_eq!(stats, MergeStats { added: 0, replaced: 1 });
        assert_eq!(dataset.get(&ShowIdentity::new("7", "QFX", "a")).unwrap().sold, 9);
    }

    #[test]
    fn empty_merge_is_a_no_op() {
        let mut dataset = MergedDataset::from_rows(vec![row("a", 1)]);
        assert_eq!(dataset.merge(Vec::new()), MergeStats::default());
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn missing_and_corrupt_files_load_empty() {
        let dir = TempDir::new().unwrap();
        assert!(MergedDataset::load(&dir.path().join("absent.json")).is_empty());

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, b"{\"date\": \"2025-12").unwrap();
        assert!(MergedDataset::load(&corrupt).is_empty());
        // moved aside, not left for the next persist to overwrite
        assert!(!corrupt.exists());
        assert_eq!(fs::read(corrupt_path(&corrupt)).unwrap(), b"{\"date\": \"2025-12");
    }

    #[test]
    fn one_bad_row_does_not_discard_the_rest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2025-12-09_Detailed.json");
        let good = serde_json::to_value(row("a", 1)).unwrap();
        let mut bad = serde_json::to_value(row("b", 2)).unwrap();
        bad["seats"] = Value::from(-4);
        let legacy = serde_json::json!({
            "movie_id": 7, "movie_name": "Film", "show_id": "c", "venue": "QFX",
            "date": "2025-12-09", "time": null,
            "seats": 10, "sold": 3, "reserved": 0, "available": 7, "gross": 900, "occupancy_percent": 30
        });
        let file = serde_json::json!({"date": "2025-12-09", "lastUpdated": "now", "shows": [good, bad, legacy]});
        fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

        let dataset = MergedDataset::load(&path);
        assert_eq!(dataset.len(), 2);
        assert!(dataset.get(&ShowIdentity::new("7", "QFX", "c")).is_some());
        assert!(corrupt_path(&path).exists());
        assert!(path.exists());
    }

    #[test]
    fn non_finite_gross_cannot_wipe_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2025-12-09_Detailed.json");
        let mut poisoned = row("b", 2);
        poisoned.gross = f64::NAN;
        let dataset = MergedDataset::from_rows(vec![row("a", 1), poisoned, row("c", 3)]);
        persist(&path, &dataset.to_detailed("2025-12-09", "now", false)).unwrap();

        let mut reloaded = MergedDataset::load(&path);
        assert_eq!(reloaded.len(), 2);
        reloaded.merge(vec![row("d", 4)]);
        persist(&path, &reloaded.to_detailed("2025-12-09", "later", false)).unwrap();
        assert_eq!(MergedDataset::load(&path).len(), 3);
    }

    #[test]
    fn persisted_file_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/2025-12-09_Detailed.json");
        let dataset = MergedDataset::from_rows(vec![row("a", 1), row("b", 2)]);
        persist(&path, &dataset.to_detailed("2025-12-09", "01:00 PM, 09 December 2025", false)).unwrap();

        assert!(!tmp_path(&path).exists());
        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["lastUpdated"], "01:00 PM, 09 December 2025");
        assert!(raw.get("autoCorrected").is_none());
        assert_eq!(MergedDataset::load(&path).len(), 2);
    }

    #[test]
    fn interrupted_write_leaves_previous_file_intact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2025-12-09_Detailed.json");
        let before = MergedDataset::from_rows(vec![row("a", 1)]);
        persist(&path, &before.to_detailed("2025-12-09", "now", false)).unwrap();
        let original = fs::read(&path).unwrap();

        // crash after the temp file was written but before the rename
        fs::write(tmp_path(&path), b"{\"partial\":").unwrap();

        assert_eq!(fs::read(&path).unwrap(), original);
        assert_eq!(MergedDataset::load(&path).len(), 1);

        // the next run overwrites the stale temp file
        persist(&path, &before.to_detailed("2025-12-09", "later", false)).unwrap();
        assert!(!tmp_path(&path).exists());
    }
}
