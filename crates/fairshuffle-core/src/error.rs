//! Error types for shuffling, session state, and stat persistence.
//!
//! Configuration errors (unknown strategy, out-of-range positions) are fatal
//! at setup time and propagate synchronously to the caller — a misconfigured
//! session must fail to start rather than silently serve unshuffled
//! questions. Data-integrity errors surface per stat row and are handled by
//! the analyzer batch (logged and skipped), never aborting a whole run.

use std::fmt;

use crate::question::MAX_POSITIONS;

/// Errors produced by the shuffling and auditing pipeline.
#[derive(Debug)]
pub enum ShuffleError {
    /// Strategy name did not match any known strategy.
    UnknownStrategy(String),
    /// A session operation was called before `initialize_randomization`.
    NotInitialized,
    /// `initialize_randomization` was called on an already-active session.
    AlreadyInitialized,
    /// A question carries more options than the tracked position slots.
    TooManyOptions { question_id: String, count: usize },
    /// A placement event referenced an impossible position.
    InvalidPosition { position: usize, positions_used: usize },
    /// A restore was requested for a question this session never shuffled.
    UnknownQuestion { question_id: String },
    /// A stat row whose counters do not sum to its recorded total.
    CorruptStatRow {
        option_id: String,
        total: u64,
        counted: u64,
    },
    /// Stat store file I/O failure.
    Io(std::io::Error),
    /// Stat store (de)serialization failure.
    Serde(serde_json::Error),
}

impl fmt::Display for ShuffleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownStrategy(name) => {
                write!(
                    f,
                    "unknown randomization strategy: {name:?} (expected full_random, constrained_random, or block_random)"
                )
            }
            Self::NotInitialized => write!(f, "session randomization has not been initialized"),
            Self::AlreadyInitialized => {
                write!(f, "session randomization is already initialized")
            }
            Self::TooManyOptions { question_id, count } => write!(
                f,
                "question {question_id} has {count} options, at most {MAX_POSITIONS} are supported"
            ),
            Self::InvalidPosition {
                position,
                positions_used,
            } => write!(
                f,
                "placement position {position} out of range for {positions_used} positions"
            ),
            Self::UnknownQuestion { question_id } => write!(
                f,
                "no recorded shuffle for question {question_id} in this session"
            ),
            Self::CorruptStatRow {
                option_id,
                total,
                counted,
            } => write!(
                f,
                "stat row for option {option_id} is inconsistent: total={total}, position counters sum to {counted}"
            ),
            Self::Io(err) => write!(f, "stat store I/O error: {err}"),
            Self::Serde(err) => write!(f, "stat store serialization error: {err}"),
        }
    }
}

impl std::error::Error for ShuffleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Serde(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ShuffleError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for ShuffleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err)
    }
}
