//! Persisted per-option position counters.
//!
//! One [`RandomizationStat`] row per option, accumulated across every
//! presentation for the lifetime of the option — independent of individual
//! sessions. The hot path performs exactly one counter increment per
//! placement event, under the store lock, so concurrent requests never lose
//! updates. The derived statistic fields are written only by the analyzer
//! batch.
//!
//! Two store implementations ship here: an in-memory map for servers and
//! tests, and a JSON-file store for CLI audit workflows. The surrounding
//! application can substitute its own persistence by implementing
//! [`StatStore`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::analyzer::OptionAnalysis;
use crate::error::ShuffleError;
use crate::question::MAX_POSITIONS;

/// Lifetime position aggregate for one option.
///
/// Invariant: `total_randomizations == position_counts.iter().sum()`. The
/// analyzer verifies this before touching a row and skips violators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomizationStat {
    pub option_id: String,
    pub option_label: String,
    /// Landing counts per display position, fixed arity.
    pub position_counts: [u64; MAX_POSITIONS],
    /// How many positions this option's question actually has (2..=5).
    pub positions_used: usize,
    pub total_randomizations: u64,
    /// Derived by the analyzer batch; `None` until the first pass.
    pub chi_square_statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub bias_score: Option<f64>,
}

impl RandomizationStat {
    pub fn new(option_id: impl Into<String>, option_label: impl Into<String>, positions_used: usize) -> Self {
        Self {
            option_id: option_id.into(),
            option_label: option_label.into(),
            position_counts: [0; MAX_POSITIONS],
            positions_used,
            total_randomizations: 0,
            chi_square_statistic: None,
            p_value: None,
            bias_score: None,
        }
    }

    /// Counter conservation check.
    pub fn conserves_counts(&self) -> bool {
        self.position_counts.iter().sum::<u64>() == self.total_randomizations
    }
}

/// Persistence seam between the shuffle path, the analyzer, and the
/// surrounding application.
pub trait StatStore: Send + Sync {
    /// Record that `option_id` was displayed at `position` in a question
    /// with `positions_used` answer slots. One atomic counter increment.
    fn record_placement(
        &self,
        option_id: &str,
        option_label: &str,
        position: usize,
        positions_used: usize,
    ) -> Result<(), ShuffleError>;

    /// Snapshot of every tracked row. Eventually consistent with concurrent
    /// increments; the analyzer tolerates slight undercounting.
    fn load_all(&self) -> Result<Vec<RandomizationStat>, ShuffleError>;

    /// Persist derived statistics back onto a row.
    fn save_analysis(
        &self,
        option_id: &str,
        analysis: &OptionAnalysis,
    ) -> Result<(), ShuffleError>;
}

fn validate_placement(position: usize, positions_used: usize) -> Result<(), ShuffleError> {
    if !(2..=MAX_POSITIONS).contains(&positions_used) || position >= positions_used {
        return Err(ShuffleError::InvalidPosition {
            position,
            positions_used,
        });
    }
    Ok(())
}

fn apply_placement(
    rows: &mut HashMap<String, RandomizationStat>,
    option_id: &str,
    option_label: &str,
    position: usize,
    positions_used: usize,
) {
    let row = rows
        .entry(option_id.to_string())
        .or_insert_with(|| RandomizationStat::new(option_id, option_label, positions_used));
    // A question's arity can grow when options are added later; counters keep
    // the widest arity seen.
    row.positions_used = row.positions_used.max(positions_used);
    row.position_counts[position] += 1;
    row.total_randomizations += 1;
}

fn apply_analysis(
    rows: &mut HashMap<String, RandomizationStat>,
    option_id: &str,
    analysis: &OptionAnalysis,
) {
    match rows.get_mut(option_id) {
        Some(row) => {
            row.chi_square_statistic = Some(analysis.chi_square_statistic);
            row.p_value = Some(analysis.p_value);
            row.bias_score = Some(analysis.bias_score);
        }
        None => log::warn!("save_analysis for unknown option {option_id}, ignored"),
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Mutex-guarded in-memory stat store.
#[derive(Default)]
pub struct MemoryStatStore {
    rows: Mutex<HashMap<String, RandomizationStat>>,
}

impl MemoryStatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a full row. Intended for imports and tests.
    pub fn insert_row(&self, row: RandomizationStat) {
        self.rows
            .lock()
            .unwrap()
            .insert(row.option_id.clone(), row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

impl StatStore for MemoryStatStore {
    fn record_placement(
        &self,
        option_id: &str,
        option_label: &str,
        position: usize,
        positions_used: usize,
    ) -> Result<(), ShuffleError> {
        validate_placement(position, positions_used)?;
        let mut rows = self.rows.lock().unwrap();
        apply_placement(&mut rows, option_id, option_label, position, positions_used);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<RandomizationStat>, ShuffleError> {
        let rows = self.rows.lock().unwrap();
        let mut all: Vec<RandomizationStat> = rows.values().cloned().collect();
        all.sort_by(|a, b| a.option_id.cmp(&b.option_id));
        Ok(all)
    }

    fn save_analysis(
        &self,
        option_id: &str,
        analysis: &OptionAnalysis,
    ) -> Result<(), ShuffleError> {
        let mut rows = self.rows.lock().unwrap();
        apply_analysis(&mut rows, option_id, analysis);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// JSON-file-backed stat store.
///
/// Rows live in memory; [`flush`](Self::flush) rewrites the whole file.
/// Suited to audit tooling and small deployments, not high-write-rate
/// serving — swap in a database-backed [`StatStore`] there.
pub struct JsonStatStore {
    path: PathBuf,
    rows: Mutex<HashMap<String, RandomizationStat>>,
}

impl JsonStatStore {
    /// Open a store, loading existing rows if the file is present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ShuffleError> {
        let path = path.into();
        let rows = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let all: Vec<RandomizationStat> = serde_json::from_str(&contents)?;
            all.into_iter().map(|r| (r.option_id.clone(), r)).collect()
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    /// Write all rows back to the file, sorted for stable diffs.
    pub fn flush(&self) -> Result<(), ShuffleError> {
        let rows = self.rows.lock().unwrap();
        let mut all: Vec<&RandomizationStat> = rows.values().collect();
        all.sort_by(|a, b| a.option_id.cmp(&b.option_id));
        let json = serde_json::to_string_pretty(&all)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatStore for JsonStatStore {
    fn record_placement(
        &self,
        option_id: &str,
        option_label: &str,
        position: usize,
        positions_used: usize,
    ) -> Result<(), ShuffleError> {
        validate_placement(position, positions_used)?;
        let mut rows = self.rows.lock().unwrap();
        apply_placement(&mut rows, option_id, option_label, position, positions_used);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<RandomizationStat>, ShuffleError> {
        let rows = self.rows.lock().unwrap();
        let mut all: Vec<RandomizationStat> = rows.values().cloned().collect();
        all.sort_by(|a, b| a.option_id.cmp(&b.option_id));
        Ok(all)
    }

    fn save_analysis(
        &self,
        option_id: &str,
        analysis: &OptionAnalysis,
    ) -> Result<(), ShuffleError> {
        let mut rows = self.rows.lock().unwrap();
        apply_analysis(&mut rows, option_id, analysis);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_placement_increments_one_counter() {
        let store = MemoryStatStore::new();
        store.record_placement("opt1", "①", 2, 4).unwrap();
        store.record_placement("opt1", "①", 2, 4).unwrap();
        store.record_placement("opt1", "①", 0, 4).unwrap();

        let rows = store.load_all().unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.position_counts, [1, 0, 2, 0, 0]);
        assert_eq!(row.total_randomizations, 3);
        assert_eq!(row.positions_used, 4);
        assert!(row.conserves_counts());
    }

    #[test]
    fn test_record_placement_validates_bounds() {
        let store = MemoryStatStore::new();
        assert!(store.record_placement("o", "①", 4, 4).is_err());
        assert!(store.record_placement("o", "①", 0, 1).is_err());
        assert!(store.record_placement("o", "①", 0, MAX_POSITIONS + 1).is_err());
        assert_eq!(store.row_count(), 0);
    }

    #[test]
    fn test_positions_used_keeps_widest_arity() {
        let store = MemoryStatStore::new();
        store.record_placement("o", "①", 0, 3).unwrap();
        store.record_placement("o", "①", 4, 5).unwrap();
        store.record_placement("o", "①", 1, 2).unwrap();
        let row = &store.load_all().unwrap()[0];
        assert_eq!(row.positions_used, 5);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStatStore::new());
        std::thread::scope(|s| {
            for _ in 0..8 {
                let store = Arc::clone(&store);
                s.spawn(move || {
                    for i in 0..250 {
                        store
                            .record_placement("shared", "①", i % 5, 5)
                            .unwrap();
                    }
                });
            }
        });
        let row = &store.load_all().unwrap()[0];
        assert_eq!(row.total_randomizations, 2000);
        assert!(row.conserves_counts());
    }

    #[test]
    fn test_save_analysis_fills_derived_fields() {
        let store = MemoryStatStore::new();
        store.record_placement("opt1", "①", 0, 5).unwrap();
        let analysis = crate::analyzer::OptionAnalysis {
            chi_square_statistic: 1.5,
            p_value: 0.83,
            bias_score: 2.0,
            quality: crate::analyzer::QualityRating::Excellent,
        };
        store.save_analysis("opt1", &analysis).unwrap();
        let row = &store.load_all().unwrap()[0];
        assert_eq!(row.chi_square_statistic, Some(1.5));
        assert_eq!(row.p_value, Some(0.83));
        assert_eq!(row.bias_score, Some(2.0));

        // Unknown option: logged, not an error.
        store.save_analysis("nope", &analysis).unwrap();
    }

    #[test]
    fn test_json_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");

        let store = JsonStatStore::open(&path).unwrap();
        store.record_placement("opt_a", "①", 0, 4).unwrap();
        store.record_placement("opt_a", "①", 3, 4).unwrap();
        store.record_placement("opt_b", "②", 1, 4).unwrap();
        store.flush().unwrap();
        assert!(path.exists());

        let reopened = JsonStatStore::open(&path).unwrap();
        let rows = reopened.load_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].option_id, "opt_a");
        assert_eq!(rows[0].position_counts, [1, 0, 0, 1, 0]);
        assert_eq!(rows[1].option_id, "opt_b");
        assert_eq!(rows[1].total_randomizations, 1);
    }

    #[test]
    fn test_json_store_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStatStore::open(dir.path().join("absent.json")).unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_json_store_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "not json at all").unwrap();
        assert!(matches!(
            JsonStatStore::open(&path),
            Err(ShuffleError::Serde(_))
        ));
    }

    #[test]
    fn test_stat_serde_roundtrip() {
        let mut row = RandomizationStat::new("opt1", "①", 5);
        row.position_counts = [5, 4, 3, 2, 1];
        row.total_randomizations = 15;
        row.p_value = Some(0.2);
        let json = serde_json::to_string(&row).unwrap();
        let parsed: RandomizationStat = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, row);
    }
}
