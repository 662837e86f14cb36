//! # fairshuffle-core
//!
//! **Shuffled answers you can replay, and shuffles you can audit.**
//!
//! `fairshuffle-core` is the core library for deterministic answer-option
//! randomization in exam platforms: seeded, strategy-driven permutation of
//! multiple-choice options, with per-option position counters and a
//! chi-square bias analyzer that flags options whose display position is not
//! uniformly distributed.
//!
//! ## Quick Start
//!
//! ```
//! use fairshuffle_core::{Question, SessionRandomizer, Strategy};
//!
//! let question = Question::new(
//!     "q1",
//!     vec![("a", "①", true), ("b", "②", false), ("c", "③", false), ("d", "④", false)],
//! );
//!
//! // Start a session: fresh seed, shuffling enabled.
//! let mut session = SessionRandomizer::new();
//! session.initialize_randomization(Strategy::FullRandom).unwrap();
//!
//! // Same question, same session: same shuffle every time.
//! let first = session.randomize_question(&question).unwrap();
//! let again = session.randomize_question(&question).unwrap();
//! assert_eq!(first.options, again.options);
//!
//! // Scoring maps a display position back to the original option.
//! let original = first.record.original_index(0).unwrap();
//! assert_eq!(question.options[original].option_id, first.options[0].option_id);
//! ```
//!
//! ## Architecture
//!
//! Question → Shuffler (seeded by session state) → permuted options
//! → Stat Store (one counter increment per placement)
//! → Bias Analyzer (periodic batch: chi-square + bias score → report)
//!
//! The shuffler is pure and synchronous; it runs on the question-rendering
//! path and must never block. The analyzer is a batch consumer of the stat
//! store and may run concurrently with live traffic; it reads an
//! eventually-consistent snapshot and writes only the derived statistic
//! fields.
//!
//! Every shuffle is reproducible: the session records a single master seed,
//! per-question sub-seeds are derived from it, and the PRNG
//! ([`rand_pcg::Pcg64Mcg`]) is a stable published algorithm. Reviewing a past
//! exam attempt shows the exact options the user saw.

pub mod analyzer;
pub mod error;
pub mod question;
pub mod session;
pub mod shuffler;
pub mod stats;

pub use analyzer::{
    AnalyzerConfig, BatchSummary, BiasAnalyzer, BiasFinding, BiasReport, ChiSquareResult,
    OptionAnalysis, QualityRating, bias_score_for_distribution, chi_square_test,
};
pub use error::ShuffleError;
pub use question::{AnswerOption, MAX_POSITIONS, PermutationRecord, Question, ShuffledQuestion};
pub use session::{RandomizationState, RandomizationSummary, SessionRandomizer};
pub use shuffler::{Shuffler, Strategy, UniformityCheck, generate_seed};
pub use stats::{JsonStatStore, MemoryStatStore, RandomizationStat, StatStore};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
