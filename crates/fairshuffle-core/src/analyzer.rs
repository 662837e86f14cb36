//! Batch bias analysis over accumulated position counters.
//!
//! The analyzer is the offline half of the pipeline: it never runs on the
//! question-rendering path. It reads every stat row the store has
//! accumulated, runs a chi-square goodness-of-fit test against the expected
//! uniform position distribution, computes a normalized bias score, and
//! persists the derived statistics back onto the row. Rows whose counters
//! fail the conservation invariant are logged and skipped — one bad row
//! never aborts a batch.
//!
//! An option is flagged as significantly biased only when BOTH hold:
//! `p_value < significance` and `bias_score >= min_bias_score`. A borderline
//! p-value with a negligible deviation (which large samples produce readily)
//! is not an alarm.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::error::ShuffleError;
use crate::question::MAX_POSITIONS;
use crate::stats::{RandomizationStat, StatStore};

/// Chi-square goodness-of-fit result.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChiSquareResult {
    pub statistic: f64,
    pub p_value: f64,
}

/// Chi-square test of observed counts against a flat expected frequency.
///
/// Degrees of freedom = `observed.len() - 1`. Degenerate inputs (fewer than
/// two cells, or a non-positive expectation) are reported as a perfect fit
/// rather than an error — there is nothing to test.
pub fn chi_square_test(observed: &[u64], expected_frequency: f64) -> ChiSquareResult {
    let df = observed.len().saturating_sub(1);
    if df == 0 || expected_frequency <= 0.0 {
        return ChiSquareResult {
            statistic: 0.0,
            p_value: 1.0,
        };
    }
    let statistic: f64 = observed
        .iter()
        .map(|&c| {
            let diff = c as f64 - expected_frequency;
            diff * diff / expected_frequency
        })
        .sum();
    let dist = ChiSquared::new(df as f64).unwrap();
    ChiSquareResult {
        statistic,
        p_value: dist.sf(statistic),
    }
}

/// Normalized deviation severity in [0, 100].
///
/// Coefficient of variation of the position counts, scaled by 100 and
/// clamped. Independent of the chi-square p-value: it measures how big the
/// skew is, not how certain we are of it.
pub fn bias_score_for_distribution(observed: &[u64]) -> f64 {
    let n = observed.len();
    if n == 0 {
        return 0.0;
    }
    let total: u64 = observed.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let mean = total as f64 / n as f64;
    let variance = observed
        .iter()
        .map(|&c| {
            let diff = c as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / n as f64;
    (variance.sqrt() / mean * 100.0).min(100.0)
}

/// Human-readable severity scale derived from the bias score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityRating {
    Excellent,
    Good,
    Acceptable,
    Poor,
    VeryPoor,
}

impl QualityRating {
    pub fn from_score(score: f64) -> Self {
        if score < 5.0 {
            Self::Excellent
        } else if score < 10.0 {
            Self::Good
        } else if score < 20.0 {
            Self::Acceptable
        } else if score < 30.0 {
            Self::Poor
        } else {
            Self::VeryPoor
        }
    }
}

impl std::fmt::Display for QualityRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excellent => write!(f, "excellent"),
            Self::Good => write!(f, "good"),
            Self::Acceptable => write!(f, "acceptable"),
            Self::Poor => write!(f, "poor"),
            Self::VeryPoor => write!(f, "very_poor"),
        }
    }
}

/// Derived statistics for one option, produced by a single analyzer pass.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OptionAnalysis {
    pub chi_square_statistic: f64,
    pub p_value: f64,
    pub bias_score: f64,
    pub quality: QualityRating,
}

/// Analyzer thresholds.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    /// Chi-square p-value below which a skew is considered statistically
    /// established.
    pub significance: f64,
    /// Minimum bias score for an established skew to matter.
    pub min_bias_score: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            significance: 0.05,
            min_bias_score: 10.0,
        }
    }
}

/// End-of-run summary for one analyzer batch.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BatchSummary {
    pub analyzed: usize,
    pub skipped: usize,
    pub flagged: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Per-option entry in a bias report.
#[derive(Debug, Clone, Serialize)]
pub struct BiasFinding {
    pub option_id: String,
    pub option_label: String,
    pub total_randomizations: u64,
    pub position_counts: Vec<u64>,
    pub positions_used: usize,
    pub chi_square_statistic: f64,
    pub p_value: f64,
    pub bias_score: f64,
    pub quality: QualityRating,
    pub significantly_biased: bool,
}

/// Operator-facing bias report over all tracked options.
#[derive(Debug, Clone, Serialize)]
pub struct BiasReport {
    pub options: Vec<BiasFinding>,
    pub flagged: Vec<String>,
    pub skipped: usize,
}

/// Batch processor for [`RandomizationStat`] rows.
pub struct BiasAnalyzer {
    store: Arc<dyn StatStore>,
    config: AnalyzerConfig,
}

impl BiasAnalyzer {
    pub fn new(store: Arc<dyn StatStore>) -> Self {
        Self {
            store,
            config: AnalyzerConfig::default(),
        }
    }

    pub fn with_config(store: Arc<dyn StatStore>, config: AnalyzerConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> AnalyzerConfig {
        self.config
    }

    /// Run one full pass: analyze every tracked option and persist the
    /// derived statistics.
    pub fn analyze_all_questions(&self) -> Result<BatchSummary, ShuffleError> {
        self.analyze_all_questions_with_cancel(&AtomicBool::new(false))
    }

    /// Like [`analyze_all_questions`](Self::analyze_all_questions), checking
    /// the cancellation flag between rows. A cancelled batch keeps whatever
    /// it already persisted.
    pub fn analyze_all_questions_with_cancel(
        &self,
        cancel: &AtomicBool,
    ) -> Result<BatchSummary, ShuffleError> {
        let start = Instant::now();
        let rows = self.store.load_all()?;

        let mut analyzed = 0usize;
        let mut skipped = 0usize;
        let mut flagged = 0usize;
        let mut cancelled = false;

        for row in &rows {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                log::info!("bias analysis cancelled after {analyzed} of {} rows", rows.len());
                break;
            }
            match self.analyze_question(row) {
                Ok(analysis) => {
                    if self.is_significant(&analysis) {
                        flagged += 1;
                    }
                    self.store.save_analysis(&row.option_id, &analysis)?;
                    analyzed += 1;
                }
                Err(
                    err @ (ShuffleError::CorruptStatRow { .. }
                    | ShuffleError::InvalidPosition { .. }),
                ) => {
                    log::warn!("skipping stat row: {err}");
                    skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        let summary = BatchSummary {
            analyzed,
            skipped,
            flagged,
            cancelled,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        log::debug!(
            "bias analysis batch: {} analyzed, {} skipped, {} flagged in {}ms",
            summary.analyzed,
            summary.skipped,
            summary.flagged,
            summary.duration_ms
        );
        Ok(summary)
    }

    /// Analyze one stat row.
    ///
    /// Verifies the counter conservation invariant first; an inconsistent
    /// row is a data-integrity error for the caller to skip, not a batch
    /// failure.
    pub fn analyze_question(
        &self,
        stat: &RandomizationStat,
    ) -> Result<OptionAnalysis, ShuffleError> {
        let counted: u64 = stat.position_counts.iter().sum();
        if counted != stat.total_randomizations {
            return Err(ShuffleError::CorruptStatRow {
                option_id: stat.option_id.clone(),
                total: stat.total_randomizations,
                counted,
            });
        }
        if !(2..=MAX_POSITIONS).contains(&stat.positions_used) {
            return Err(ShuffleError::InvalidPosition {
                position: stat.positions_used,
                positions_used: MAX_POSITIONS,
            });
        }

        let observed = &stat.position_counts[..stat.positions_used];
        let expected = stat.total_randomizations as f64 / stat.positions_used as f64;
        let chi = chi_square_test(observed, expected);
        let bias_score = bias_score_for_distribution(observed);

        Ok(OptionAnalysis {
            chi_square_statistic: chi.statistic,
            p_value: chi.p_value,
            bias_score,
            quality: QualityRating::from_score(bias_score),
        })
    }

    /// Whether a stored row carries analysis results that meet both flagging
    /// thresholds.
    pub fn significantly_biased(&self, stat: &RandomizationStat) -> bool {
        match (stat.p_value, stat.bias_score) {
            (Some(p), Some(score)) => {
                p < self.config.significance && score >= self.config.min_bias_score
            }
            _ => false,
        }
    }

    fn is_significant(&self, analysis: &OptionAnalysis) -> bool {
        analysis.p_value < self.config.significance
            && analysis.bias_score >= self.config.min_bias_score
    }

    /// Build an operator-facing report from the current store contents.
    ///
    /// Analysis is computed fresh per row so the report never mixes counters
    /// with stale stored statistics; corrupt rows are counted, not listed.
    pub fn generate_report(&self) -> Result<BiasReport, ShuffleError> {
        let rows = self.store.load_all()?;
        let mut options = Vec::with_capacity(rows.len());
        let mut flagged = Vec::new();
        let mut skipped = 0usize;

        for row in &rows {
            match self.analyze_question(row) {
                Ok(analysis) => {
                    let significant = self.is_significant(&analysis);
                    if significant {
                        flagged.push(row.option_id.clone());
                    }
                    options.push(BiasFinding {
                        option_id: row.option_id.clone(),
                        option_label: row.option_label.clone(),
                        total_randomizations: row.total_randomizations,
                        position_counts: row.position_counts.to_vec(),
                        positions_used: row.positions_used,
                        chi_square_statistic: analysis.chi_square_statistic,
                        p_value: analysis.p_value,
                        bias_score: analysis.bias_score,
                        quality: analysis.quality,
                        significantly_biased: significant,
                    });
                }
                Err(
                    err @ (ShuffleError::CorruptStatRow { .. }
                    | ShuffleError::InvalidPosition { .. }),
                ) => {
                    log::warn!("report skipping stat row: {err}");
                    skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        // Worst offenders first.
        options.sort_by(|a, b| {
            b.bias_score
                .partial_cmp(&a.bias_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(BiasReport {
            options,
            flagged,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::MemoryStatStore;

    fn stat(option_id: &str, counts: [u64; MAX_POSITIONS], positions_used: usize) -> RandomizationStat {
        RandomizationStat {
            option_id: option_id.to_string(),
            option_label: "①".to_string(),
            position_counts: counts,
            positions_used,
            total_randomizations: counts.iter().sum(),
            chi_square_statistic: None,
            p_value: None,
            bias_score: None,
        }
    }

    #[test]
    fn test_chi_square_uniform_counts() {
        let result = chi_square_test(&[200, 200, 200, 200, 200], 200.0);
        assert!(result.statistic.abs() < 1e-9);
        assert!(result.p_value > 0.99);
    }

    #[test]
    fn test_chi_square_skewed_counts() {
        let result = chi_square_test(&[800, 50, 50, 50, 50], 200.0);
        assert!(result.statistic > 100.0);
        assert!(result.p_value < 1e-6);
    }

    #[test]
    fn test_chi_square_degenerate_cells() {
        let result = chi_square_test(&[100], 100.0);
        assert_eq!(result.statistic, 0.0);
        assert_eq!(result.p_value, 1.0);
        let result = chi_square_test(&[], 0.0);
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn test_bias_score_uniform_is_zero() {
        assert!(bias_score_for_distribution(&[100, 100, 100, 100]).abs() < 1e-9);
    }

    #[test]
    fn test_bias_score_extreme_is_capped() {
        let score = bias_score_for_distribution(&[1000, 0, 0, 0, 0]);
        assert!((score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_bias_score_empty_counts() {
        assert_eq!(bias_score_for_distribution(&[]), 0.0);
        assert_eq!(bias_score_for_distribution(&[0, 0, 0]), 0.0);
    }

    #[test]
    fn test_quality_rating_thresholds() {
        assert_eq!(QualityRating::from_score(0.0), QualityRating::Excellent);
        assert_eq!(QualityRating::from_score(4.99), QualityRating::Excellent);
        assert_eq!(QualityRating::from_score(5.0), QualityRating::Good);
        assert_eq!(QualityRating::from_score(10.0), QualityRating::Acceptable);
        assert_eq!(QualityRating::from_score(20.0), QualityRating::Poor);
        assert_eq!(QualityRating::from_score(30.0), QualityRating::VeryPoor);
        assert_eq!(QualityRating::from_score(100.0), QualityRating::VeryPoor);
    }

    #[test]
    fn test_analyze_question_flags_conservation_violation() {
        let store = Arc::new(MemoryStatStore::new());
        let analyzer = BiasAnalyzer::new(store);
        let mut bad = stat("opt1", [10, 10, 10, 10, 10], 5);
        bad.total_randomizations = 49;
        let err = analyzer.analyze_question(&bad).unwrap_err();
        assert!(matches!(err, ShuffleError::CorruptStatRow { .. }));
    }

    #[test]
    fn test_analyze_question_rejects_bad_arity() {
        let store = Arc::new(MemoryStatStore::new());
        let analyzer = BiasAnalyzer::new(store);
        let bad = stat("opt1", [10, 0, 0, 0, 0], 1);
        assert!(analyzer.analyze_question(&bad).is_err());
    }

    #[test]
    fn test_synthetically_biased_option_is_flagged() {
        // 80% of 1000 trials land at position 0: must be flagged.
        let store = Arc::new(MemoryStatStore::new());
        let analyzer = BiasAnalyzer::new(Arc::clone(&store) as Arc<dyn StatStore>);
        let biased = stat("opt_biased", [800, 50, 50, 50, 50], 5);
        let analysis = analyzer.analyze_question(&biased).unwrap();
        assert!(analysis.p_value < 0.05);
        assert!(analysis.bias_score >= 10.0);
        assert!(analyzer.is_significant(&analysis));
        assert_eq!(analysis.quality, QualityRating::VeryPoor);
    }

    #[test]
    fn test_balanced_option_is_not_flagged() {
        let store = Arc::new(MemoryStatStore::new());
        let analyzer = BiasAnalyzer::new(store);
        let balanced = stat("opt_ok", [201, 199, 200, 198, 202], 5);
        let analysis = analyzer.analyze_question(&balanced).unwrap();
        assert!(analysis.p_value > 0.05);
        assert!(!analyzer.is_significant(&analysis));
        assert_eq!(analysis.quality, QualityRating::Excellent);
    }

    #[test]
    fn test_low_p_with_negligible_score_is_not_flagged() {
        // Huge sample, tiny relative skew: chi-square is certain the skew is
        // real, the score says it does not matter. Both must hold to flag.
        let store = Arc::new(MemoryStatStore::new());
        let analyzer = BiasAnalyzer::new(store);
        let subtle = stat("opt_subtle", [20600, 19850, 19850, 19850, 19850], 5);
        let analysis = analyzer.analyze_question(&subtle).unwrap();
        assert!(analysis.p_value < 0.05, "p={}", analysis.p_value);
        assert!(analysis.bias_score < 10.0, "score={}", analysis.bias_score);
        assert!(!analyzer.is_significant(&analysis));
    }

    #[test]
    fn test_batch_skips_corrupt_rows_and_counts_them() {
        let store = Arc::new(MemoryStatStore::new());
        store.insert_row(stat("good", [200, 200, 200, 200, 200], 5));
        let mut corrupt = stat("bad", [10, 10, 10, 10, 10], 5);
        corrupt.total_randomizations = 999;
        store.insert_row(corrupt);
        store.insert_row(stat("biased", [800, 50, 50, 50, 50], 5));

        let analyzer = BiasAnalyzer::new(Arc::clone(&store) as Arc<dyn StatStore>);
        let summary = analyzer.analyze_all_questions().unwrap();
        assert_eq!(summary.analyzed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.flagged, 1);
        assert!(!summary.cancelled);

        // Derived statistics were persisted back onto the analyzed rows.
        let rows = store.load_all().unwrap();
        let biased = rows.iter().find(|r| r.option_id == "biased").unwrap();
        assert!(biased.p_value.unwrap() < 0.05);
        assert!(analyzer.significantly_biased(biased));
        let bad = rows.iter().find(|r| r.option_id == "bad").unwrap();
        assert!(bad.p_value.is_none());
    }

    #[test]
    fn test_batch_cancellation_stops_before_work() {
        let store = Arc::new(MemoryStatStore::new());
        store.insert_row(stat("a", [100, 100, 100, 100, 100], 5));
        store.insert_row(stat("b", [100, 100, 100, 100, 100], 5));
        let analyzer = BiasAnalyzer::new(Arc::clone(&store) as Arc<dyn StatStore>);

        let cancel = AtomicBool::new(true);
        let summary = analyzer.analyze_all_questions_with_cancel(&cancel).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.analyzed, 0);
    }

    #[test]
    fn test_report_sorts_worst_first_and_lists_flagged() {
        let store = Arc::new(MemoryStatStore::new());
        store.insert_row(stat("mild", [210, 195, 195, 200, 200], 5));
        store.insert_row(stat("severe", [800, 50, 50, 50, 50], 5));
        let analyzer = BiasAnalyzer::new(Arc::clone(&store) as Arc<dyn StatStore>);

        let report = analyzer.generate_report().unwrap();
        assert_eq!(report.options.len(), 2);
        assert_eq!(report.options[0].option_id, "severe");
        assert_eq!(report.flagged, vec!["severe".to_string()]);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn test_significantly_biased_requires_stored_analysis() {
        let store = Arc::new(MemoryStatStore::new());
        let analyzer = BiasAnalyzer::new(store);
        // No derived statistics yet: never flagged.
        let fresh = stat("opt", [800, 50, 50, 50, 50], 5);
        assert!(!analyzer.significantly_biased(&fresh));
    }

    #[test]
    fn test_empty_row_is_a_perfect_fit() {
        let store = Arc::new(MemoryStatStore::new());
        let analyzer = BiasAnalyzer::new(store);
        let empty = stat("opt_new", [0, 0, 0, 0, 0], 4);
        let analysis = analyzer.analyze_question(&empty).unwrap();
        assert_eq!(analysis.bias_score, 0.0);
        assert_eq!(analysis.p_value, 1.0);
        assert_eq!(analysis.quality, QualityRating::Excellent);
    }
}
