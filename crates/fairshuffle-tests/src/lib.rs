//! Statistical uniformity test battery for answer-option permutations.
//!
//! Five tests over a sample of recorded permutations (each sample is a
//! display→original mapping). A fair shuffler draws every permutation with
//! equal probability; each test attacks a different way that property can
//! fail. Every test returns a [`TestResult`] with a p-value (where
//! applicable), a pass/fail determination, and a letter grade (A through F).

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

// ═══════════════════════════════════════════════════════════════════════════════
// Core types
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a single uniformity test.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub p_value: Option<f64>,
    pub statistic: f64,
    pub details: String,
    pub grade: char,
}

impl TestResult {
    /// Assign a letter grade based on p-value.
    ///
    /// - A: p >= 0.1
    /// - B: p >= 0.01
    /// - C: p >= 0.001
    /// - D: p >= 0.0001
    /// - F: otherwise or None
    pub fn grade_from_p(p: Option<f64>) -> char {
        match p {
            Some(p) if p >= 0.1 => 'A',
            Some(p) if p >= 0.01 => 'B',
            Some(p) if p >= 0.001 => 'C',
            Some(p) if p >= 0.0001 => 'D',
            _ => 'F',
        }
    }

    /// Determine pass/fail from p-value against a threshold (default 0.01).
    pub fn pass_from_p(p: Option<f64>, threshold: f64) -> bool {
        match p {
            Some(p) => p >= threshold,
            None => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Return a failing `TestResult` when the sample is too small.
fn insufficient(name: &str, needed: usize, got: usize) -> TestResult {
    TestResult {
        name: name.to_string(),
        passed: false,
        p_value: None,
        statistic: 0.0,
        details: format!("Insufficient samples: need {needed}, got {got}"),
        grade: 'F',
    }
}

/// Return a failing `TestResult` for malformed input.
fn malformed(name: &str, details: String) -> TestResult {
    TestResult {
        name: name.to_string(),
        passed: false,
        p_value: None,
        statistic: 0.0,
        details,
        grade: 'F',
    }
}

/// Validate that every sample is a permutation of `0..n` for a single
/// consistent `n`. Returns the width, or an error message.
fn sample_width(samples: &[Vec<usize>]) -> Result<usize, String> {
    let n = match samples.first() {
        Some(first) => first.len(),
        None => return Err("empty sample set".to_string()),
    };
    for (i, sample) in samples.iter().enumerate() {
        if sample.len() != n {
            return Err(format!(
                "sample {i} has width {}, expected {n}",
                sample.len()
            ));
        }
        let mut seen = vec![false; n];
        for &p in sample {
            if p >= n || seen[p] {
                return Err(format!("sample {i} is not a permutation of 0..{n}"));
            }
            seen[p] = true;
        }
    }
    Ok(n)
}

fn factorial(n: usize) -> usize {
    (1..=n).product::<usize>().max(1)
}

/// Lehmer index of a permutation in `0..n!`.
fn permutation_index(perm: &[usize]) -> usize {
    let n = perm.len();
    let mut index = 0;
    for i in 0..n {
        let smaller = perm[i + 1..].iter().filter(|&&x| x < perm[i]).count();
        index = index * (n - i) + smaller;
    }
    index
}

fn chi_square_p(statistic: f64, df: usize) -> f64 {
    if df == 0 {
        return 1.0;
    }
    let dist = ChiSquared::new(df as f64).unwrap();
    dist.sf(statistic)
}

// ═══════════════════════════════════════════════════════════════════════════════
// 1. POSITION FREQUENCY
// ═══════════════════════════════════════════════════════════════════════════════

/// Test 1: Position frequency -- contingency chi-square of option vs display
/// position. For uniform permutations every option lands in every position
/// equally often; df = (n-1)^2 under the doubly-stochastic constraint.
pub fn position_frequency(samples: &[Vec<usize>]) -> TestResult {
    let name = "Position Frequency";
    let n = match sample_width(samples) {
        Ok(n) => n,
        Err(msg) => return malformed(name, msg),
    };
    let m = samples.len();
    if m < 20 * n {
        return insufficient(name, 20 * n, m);
    }

    let mut counts = vec![vec![0u64; n]; n]; // counts[original][display]
    for sample in samples {
        for (display, &original) in sample.iter().enumerate() {
            counts[original][display] += 1;
        }
    }

    let expected = m as f64 / n as f64;
    let mut chi2 = 0.0;
    for row in &counts {
        for &c in row {
            let diff = c as f64 - expected;
            chi2 += diff * diff / expected;
        }
    }
    let df = (n - 1) * (n - 1);
    let p = chi_square_p(chi2, df);
    TestResult {
        name: name.to_string(),
        passed: TestResult::pass_from_p(Some(p), 0.01),
        p_value: Some(p),
        statistic: chi2,
        details: format!("n={n}, samples={m}, expected_per_cell={expected:.1}"),
        grade: TestResult::grade_from_p(Some(p)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 2. FIRST POSITION OCCUPANCY
// ═══════════════════════════════════════════════════════════════════════════════

/// Test 2: First position occupancy -- which original option lands at
/// display position 0. The position students read first is where placement
/// bias does the most damage.
pub fn first_position_occupancy(samples: &[Vec<usize>]) -> TestResult {
    let name = "First Position Occupancy";
    let n = match sample_width(samples) {
        Ok(n) => n,
        Err(msg) => return malformed(name, msg),
    };
    let m = samples.len();
    if m < 20 * n {
        return insufficient(name, 20 * n, m);
    }

    let mut counts = vec![0u64; n];
    for sample in samples {
        counts[sample[0]] += 1;
    }
    let expected = m as f64 / n as f64;
    let chi2: f64 = counts
        .iter()
        .map(|&c| {
            let diff = c as f64 - expected;
            diff * diff / expected
        })
        .sum();
    let p = chi_square_p(chi2, n - 1);
    let max_count = counts.iter().copied().max().unwrap_or(0);
    TestResult {
        name: name.to_string(),
        passed: TestResult::pass_from_p(Some(p), 0.01),
        p_value: Some(p),
        statistic: chi2,
        details: format!("max_count={max_count}, expected={expected:.1}"),
        grade: TestResult::grade_from_p(Some(p)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 3. PERMUTATION FREQUENCY
// ═══════════════════════════════════════════════════════════════════════════════

/// Test 3: Permutation frequency -- chi-square over all n! permutations.
/// Only feasible for n <= 4 (24 bins); catches generators that are
/// positionally uniform but favor particular whole orderings.
pub fn permutation_frequency(samples: &[Vec<usize>]) -> TestResult {
    let name = "Permutation Frequency";
    let n = match sample_width(samples) {
        Ok(n) => n,
        Err(msg) => return malformed(name, msg),
    };
    if n > 4 {
        return TestResult {
            name: name.to_string(),
            passed: true,
            p_value: None,
            statistic: 0.0,
            details: format!("skipped: {n}! bins too many, run with n<=4"),
            grade: 'B',
        };
    }
    let bins = factorial(n);
    let m = samples.len();
    if m < 5 * bins {
        return insufficient(name, 5 * bins, m);
    }

    let mut counts = vec![0u64; bins];
    for sample in samples {
        counts[permutation_index(sample)] += 1;
    }
    let expected = m as f64 / bins as f64;
    let chi2: f64 = counts
        .iter()
        .map(|&c| {
            let diff = c as f64 - expected;
            diff * diff / expected
        })
        .sum();
    let p = chi_square_p(chi2, bins - 1);
    TestResult {
        name: name.to_string(),
        passed: TestResult::pass_from_p(Some(p), 0.01),
        p_value: Some(p),
        statistic: chi2,
        details: format!("bins={bins}, samples={m}"),
        grade: TestResult::grade_from_p(Some(p)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 4. PAIRWISE ORDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Test 4: Pairwise order -- every ordered pair of options should keep its
/// original relative order in half the shuffles. Worst pair z-score,
/// Bonferroni-corrected.
pub fn pairwise_order(samples: &[Vec<usize>]) -> TestResult {
    let name = "Pairwise Order";
    let n = match sample_width(samples) {
        Ok(n) => n,
        Err(msg) => return malformed(name, msg),
    };
    if n < 2 {
        return malformed(name, format!("need at least 2 options, got {n}"));
    }
    let m = samples.len();
    if m < 100 {
        return insufficient(name, 100, m);
    }

    let normal = Normal::standard();
    let mut worst_z = 0.0f64;
    let mut worst_pair = (0usize, 0usize);
    let n_pairs = n * (n - 1) / 2;

    for a in 0..n {
        for b in (a + 1)..n {
            let mut preserved = 0u64;
            for sample in samples {
                // display positions of originals a and b
                let mut pos_a = 0;
                let mut pos_b = 0;
                for (display, &original) in sample.iter().enumerate() {
                    if original == a {
                        pos_a = display;
                    } else if original == b {
                        pos_b = display;
                    }
                }
                if pos_a < pos_b {
                    preserved += 1;
                }
            }
            let z = (preserved as f64 - m as f64 / 2.0) / (m as f64 / 4.0).sqrt();
            if z.abs() > worst_z {
                worst_z = z.abs();
                worst_pair = (a, b);
            }
        }
    }

    let p_single = 2.0 * (1.0 - normal.cdf(worst_z));
    let p = (p_single * n_pairs as f64).min(1.0);
    TestResult {
        name: name.to_string(),
        passed: TestResult::pass_from_p(Some(p), 0.01),
        p_value: Some(p),
        statistic: worst_z,
        details: format!(
            "worst pair ({}, {}): |z|={worst_z:.3} over {n_pairs} pairs",
            worst_pair.0, worst_pair.1
        ),
        grade: TestResult::grade_from_p(Some(p)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 5. FIXED POINT RATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Test 5: Fixed point rate -- a uniform random permutation has on average
/// exactly one fixed point (and variance 1), independent of n. Z-test on the
/// sample mean.
pub fn fixed_point_rate(samples: &[Vec<usize>]) -> TestResult {
    let name = "Fixed Point Rate";
    let n = match sample_width(samples) {
        Ok(n) => n,
        Err(msg) => return malformed(name, msg),
    };
    if n < 2 {
        return malformed(name, format!("need at least 2 options, got {n}"));
    }
    let m = samples.len();
    if m < 100 {
        return insufficient(name, 100, m);
    }

    let total_fixed: u64 = samples
        .iter()
        .map(|sample| {
            sample
                .iter()
                .enumerate()
                .filter(|&(display, &original)| display == original)
                .count() as u64
        })
        .sum();
    let mean = total_fixed as f64 / m as f64;

    // Small n deviates slightly from the asymptotic mean/variance of 1;
    // exact values for n >= 2 stay close enough for a screening test.
    let z = (mean - 1.0) / (1.0 / m as f64).sqrt();
    let normal = Normal::standard();
    let p = 2.0 * (1.0 - normal.cdf(z.abs()));
    TestResult {
        name: name.to_string(),
        passed: TestResult::pass_from_p(Some(p), 0.01),
        p_value: Some(p),
        statistic: mean,
        details: format!("mean_fixed_points={mean:.4}, expected=1.0"),
        grade: TestResult::grade_from_p(Some(p)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Test battery
// ═══════════════════════════════════════════════════════════════════════════════

/// Run the complete battery on a permutation sample.
pub fn run_all_tests(samples: &[Vec<usize>]) -> Vec<TestResult> {
    let tests: Vec<fn(&[Vec<usize>]) -> TestResult> = vec![
        position_frequency,
        first_position_occupancy,
        permutation_frequency,
        pairwise_order,
        fixed_point_rate,
    ];
    tests.iter().map(|test_fn| test_fn(samples)).collect()
}

/// Calculate overall quality score (0-100) from test results.
///
/// Each grade maps to a score: A=100, B=75, C=50, D=25, F=0.
/// Returns the average across all tests.
pub fn calculate_quality_score(results: &[TestResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let total: f64 = results
        .iter()
        .map(|r| match r.grade {
            'A' => 100.0,
            'B' => 75.0,
            'C' => 50.0,
            'D' => 25.0,
            _ => 0.0,
        })
        .sum();
    total / results.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small deterministic LCG, enough to drive a Fisher–Yates for fixtures.
    struct Lcg(u64);

    impl Lcg {
        fn next_below(&mut self, n: usize) -> usize {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((self.0 >> 33) % n as u64) as usize
        }
    }

    fn uniform_samples(n: usize, m: usize, seed: u64) -> Vec<Vec<usize>> {
        let mut lcg = Lcg(seed);
        (0..m)
            .map(|_| {
                let mut perm: Vec<usize> = (0..n).collect();
                for i in (1..n).rev() {
                    let j = lcg.next_below(i + 1);
                    perm.swap(i, j);
                }
                perm
            })
            .collect()
    }

    /// Generator rigged to keep original option 0 at display position 0
    /// eighty percent of the time.
    fn rigged_samples(n: usize, m: usize, seed: u64) -> Vec<Vec<usize>> {
        let mut lcg = Lcg(seed);
        (0..m)
            .map(|i| {
                let mut perm: Vec<usize> = (0..n).collect();
                for k in (1..n).rev() {
                    let j = lcg.next_below(k + 1);
                    perm.swap(k, j);
                }
                if i % 10 < 8 {
                    let zero_at = perm.iter().position(|&p| p == 0).unwrap();
                    perm.swap(0, zero_at);
                }
                perm
            })
            .collect()
    }

    #[test]
    fn test_permutation_index_covers_all_orderings() {
        let mut seen = vec![false; 6];
        let perms: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for perm in &perms {
            let idx = permutation_index(perm);
            assert!(idx < 6);
            assert!(!seen[idx], "index {idx} assigned twice");
            seen[idx] = true;
        }
        assert_eq!(permutation_index(&[0, 1, 2]), 0);
        assert_eq!(permutation_index(&[2, 1, 0]), 5);
    }

    #[test]
    fn test_grade_from_p() {
        assert_eq!(TestResult::grade_from_p(Some(0.5)), 'A');
        assert_eq!(TestResult::grade_from_p(Some(0.05)), 'B');
        assert_eq!(TestResult::grade_from_p(Some(0.005)), 'C');
        assert_eq!(TestResult::grade_from_p(Some(0.00005)), 'F');
        assert_eq!(TestResult::grade_from_p(None), 'F');
    }

    #[test]
    fn test_sample_width_validation() {
        assert_eq!(sample_width(&[vec![0, 1, 2], vec![2, 1, 0]]), Ok(3));
        assert!(sample_width(&[]).is_err());
        assert!(sample_width(&[vec![0, 1], vec![0, 1, 2]]).is_err());
        assert!(sample_width(&[vec![0, 0, 2]]).is_err());
        assert!(sample_width(&[vec![0, 1, 3]]).is_err());
    }

    #[test]
    fn test_uniform_generator_passes_battery() {
        let samples = uniform_samples(4, 5000, 0xdead_beef);
        let results = run_all_tests(&samples);
        assert_eq!(results.len(), 5);
        let passed = results.iter().filter(|r| r.passed).count();
        assert!(
            passed >= results.len() - 1,
            "failed: {:?}",
            results
                .iter()
                .filter(|r| !r.passed)
                .map(|r| format!("{} p={:?} ({})", r.name, r.p_value, r.details))
                .collect::<Vec<_>>()
        );
        assert!(calculate_quality_score(&results) >= 75.0);
    }

    #[test]
    fn test_rigged_generator_fails_battery() {
        let samples = rigged_samples(4, 2000, 0xcafe_babe);
        let first = first_position_occupancy(&samples);
        assert!(!first.passed, "rigged first position not caught");
        assert_eq!(first.grade, 'F');
        let freq = position_frequency(&samples);
        assert!(!freq.passed);
        let score = calculate_quality_score(&run_all_tests(&samples));
        assert!(score < 75.0, "score {score} too generous for rigged data");
    }

    #[test]
    fn test_insufficient_samples_reported() {
        let samples = uniform_samples(4, 10, 1);
        let result = position_frequency(&samples);
        assert!(!result.passed);
        assert!(result.details.contains("Insufficient"));
    }

    #[test]
    fn test_malformed_samples_reported() {
        let result = position_frequency(&[vec![0, 0, 1]]);
        assert!(!result.passed);
        assert!(result.details.contains("not a permutation"));
    }

    #[test]
    fn test_permutation_frequency_skips_large_n() {
        let samples = uniform_samples(5, 1000, 3);
        let result = permutation_frequency(&samples);
        assert!(result.passed);
        assert!(result.details.contains("skipped"));
    }

    #[test]
    fn test_fixed_point_rate_on_identity_stream_fails() {
        let samples: Vec<Vec<usize>> = (0..500).map(|_| vec![0, 1, 2, 3]).collect();
        let result = fixed_point_rate(&samples);
        assert!(!result.passed);
        assert!(result.statistic > 3.9); // every sample has 4 fixed points
    }

    #[test]
    fn test_quality_score_empty() {
        assert_eq!(calculate_quality_score(&[]), 0.0);
    }
}
