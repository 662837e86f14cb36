//! Seeded, strategy-driven option shuffling.
//!
//! A [`Shuffler`] is a pure function of `(seed, strategy)`: reconstructing it
//! from a stored seed reproduces every past shuffle bit for bit. Per-question
//! sub-seeds are derived from the master seed and a stable hash of the
//! question id, so one master seed reproduces a whole exam's shuffle and the
//! same question always shuffles the same way regardless of render order.
//!
//! The PRNG is [`Pcg64Mcg`], a small, fast generator with a published, stable
//! algorithm. All randomness flows through it — nothing on the shuffle path
//! may touch a platform RNG.

use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

use crate::analyzer::chi_square_test;
use crate::error::ShuffleError;
use crate::question::{AnswerOption, MAX_POSITIONS, PermutationRecord, Question, ShuffledQuestion};

/// Upper bound on redraws for the constrained strategy before the constraint
/// is forced by a swap.
const MAX_CONSTRAINT_RETRIES: usize = 16;

/// Named shuffling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Uniform Fisher–Yates permutation of all options.
    FullRandom,
    /// Fisher–Yates, redrawn so the correct option never lands at display
    /// position 0. Redraws are bounded; an exhausted bound forces the
    /// constraint with a swap drawn from the same stream.
    ConstrainedRandom,
    /// Pinned trailing options ("all of the above") keep their place;
    /// only the leading block is shuffled.
    BlockRandom,
}

impl Strategy {
    /// All strategies, in configuration order.
    pub const ALL: [Strategy; 3] = [
        Strategy::FullRandom,
        Strategy::ConstrainedRandom,
        Strategy::BlockRandom,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::FullRandom => "full_random",
            Self::ConstrainedRandom => "constrained_random",
            Self::BlockRandom => "block_random",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = ShuffleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full_random" | "full" => Ok(Self::FullRandom),
            "constrained_random" | "constrained" => Ok(Self::ConstrainedRandom),
            "block_random" | "block" => Ok(Self::BlockRandom),
            other => Err(ShuffleError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Generate a fresh master seed from the OS CSPRNG.
///
/// # Panics
/// Panics if the OS CSPRNG fails — this indicates a fatal platform issue.
pub fn generate_seed() -> u64 {
    let mut buf = [0u8; 8];
    getrandom::fill(&mut buf).expect("OS CSPRNG failed");
    u64::from_le_bytes(buf)
}

/// Result of a positional-uniformity self-test.
#[derive(Debug, Clone, Serialize)]
pub struct UniformityCheck {
    pub passed: bool,
    pub statistic: f64,
    pub p_value: f64,
    pub samples: usize,
    pub positions: usize,
}

/// Deterministic permutation generator for answer options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shuffler {
    seed: u64,
    strategy: Strategy,
}

impl Shuffler {
    /// Reconstruct a shuffler whose output is identical to any previous run
    /// with the same seed and strategy.
    pub fn from_seed(seed: u64, strategy: Strategy) -> Self {
        Self { seed, strategy }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Produce a permuted copy of a question's options.
    ///
    /// The input order is canonical and recoverable through the returned
    /// record. Zero- and one-option questions pass through unchanged with an
    /// identity record — a permutation of 0 or 1 elements is unique.
    pub fn randomize_question_options(
        &self,
        question: &Question,
    ) -> Result<ShuffledQuestion, ShuffleError> {
        let n = question.options.len();
        if n > MAX_POSITIONS {
            return Err(ShuffleError::TooManyOptions {
                question_id: question.question_id.clone(),
                count: n,
            });
        }
        if n < 2 {
            return Ok(ShuffledQuestion {
                question_id: question.question_id.clone(),
                options: question.options.clone(),
                record: PermutationRecord::identity(n),
            });
        }

        let mut rng = Pcg64Mcg::seed_from_u64(derive_question_seed(
            self.seed,
            &question.question_id,
        ));
        let positions = match self.strategy {
            Strategy::FullRandom => draw_permutation(&mut rng, n),
            Strategy::ConstrainedRandom => constrained_permutation(&mut rng, &question.options),
            Strategy::BlockRandom => block_permutation(&mut rng, &question.options),
        };
        let record = PermutationRecord::from_positions(positions);
        Ok(ShuffledQuestion {
            question_id: question.question_id.clone(),
            options: record.apply(&question.options),
            record,
        })
    }

    /// Apply the per-question shuffle across a whole exam.
    ///
    /// Each question gets its own derived sub-seed, so the master seed alone
    /// reproduces the entire exam's shuffle.
    pub fn randomize_exam_questions(
        &self,
        questions: &[Question],
    ) -> Result<Vec<ShuffledQuestion>, ShuffleError> {
        questions
            .iter()
            .map(|q| self.randomize_question_options(q))
            .collect()
    }

    /// Self-test: shuffle `samples` synthetic questions and check that the
    /// first canonical option's display position is uniformly distributed.
    ///
    /// This is the same chi-square check the bias analyzer runs in production
    /// against accumulated counters, exposed here so the shuffler can be
    /// validated in isolation.
    pub fn test_uniformity(
        &self,
        n_options: usize,
        samples: usize,
    ) -> Result<UniformityCheck, ShuffleError> {
        if !(2..=MAX_POSITIONS).contains(&n_options) {
            return Err(ShuffleError::InvalidPosition {
                position: n_options,
                positions_used: MAX_POSITIONS,
            });
        }

        let mut counts = vec![0u64; n_options];
        for i in 0..samples {
            let question = probe_question(n_options, i);
            let shuffled = self.randomize_question_options(&question)?;
            if let Some(pos) = shuffled.record.display_position(0) {
                counts[pos] += 1;
            }
        }

        let expected = samples as f64 / n_options as f64;
        let result = chi_square_test(&counts, expected);
        Ok(UniformityCheck {
            passed: result.p_value > 0.01,
            statistic: result.statistic,
            p_value: result.p_value,
            samples,
            positions: n_options,
        })
    }
}

/// Derive a per-question sub-seed from the master seed.
///
/// FNV-1a over the question id, mixed with the master seed and spread with a
/// golden-ratio multiply. Stable across versions: changing this function
/// invalidates every stored seed's replay.
fn derive_question_seed(master: u64, question_id: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in question_id.as_bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (master ^ h).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

/// Uniform Fisher–Yates draw of a display→original mapping.
fn draw_permutation(rng: &mut Pcg64Mcg, n: usize) -> Vec<usize> {
    let mut positions: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let j = rng.random_range(0..=i);
        positions.swap(i, j);
    }
    positions
}

/// Fisher–Yates with the placement rule: the correct option must not occupy
/// display position 0.
///
/// Questions with no correct option, or where every option is correct, are
/// unconstrainable and fall back to the uniform draw.
fn constrained_permutation(rng: &mut Pcg64Mcg, options: &[AnswerOption]) -> Vec<usize> {
    let n = options.len();
    let any_correct = options.iter().any(|o| o.correct);
    let all_correct = options.iter().all(|o| o.correct);
    let mut positions = draw_permutation(rng, n);
    if !any_correct || all_correct {
        return positions;
    }

    for _ in 0..MAX_CONSTRAINT_RETRIES {
        if !options[positions[0]].correct {
            return positions;
        }
        positions = draw_permutation(rng, n);
    }

    // Retry bound exhausted: force the constraint with a drawn swap target.
    if options[positions[0]].correct {
        let start = rng.random_range(1..n);
        for offset in 0..n - 1 {
            let j = 1 + (start - 1 + offset) % (n - 1);
            if !options[positions[j]].correct {
                positions.swap(0, j);
                break;
            }
        }
    }
    positions
}

/// Shuffle the leading block only; the maximal trailing run of pinned
/// options keeps its place.
fn block_permutation(rng: &mut Pcg64Mcg, options: &[AnswerOption]) -> Vec<usize> {
    let n = options.len();
    let mut cut = n;
    while cut > 0 && options[cut - 1].pinned {
        cut -= 1;
    }
    let mut positions: Vec<usize> = (0..n).collect();
    for i in (1..cut).rev() {
        let j = rng.random_range(0..=i);
        positions.swap(i, j);
    }
    positions
}

/// Synthetic unconstrained question used by the uniformity self-test.
fn probe_question(n_options: usize, index: usize) -> Question {
    Question {
        question_id: format!("uniformity_probe_{index}"),
        options: (0..n_options)
            .map(|i| AnswerOption::new(format!("probe_opt_{i}"), format!("{i}"), false))
            .collect(),
    }
}
