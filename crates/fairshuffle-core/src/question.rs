//! Question and answer-option data model.
//!
//! An [`AnswerOption`] has a stable identity (`option_id`) that is
//! independent of where it is displayed; the [`Question`] stores options in
//! canonical (original) order. Every shuffle produces a
//! [`PermutationRecord`] mapping display positions back to original indices,
//! which is what answer scoring uses — a submitted "position 0" resolves to
//! whichever option was displayed there, never to the nominal first option.

use serde::{Deserialize, Serialize};

/// Maximum number of answer slots tracked per question.
///
/// Stat counters are a fixed-size array indexed by display position, bounded
/// by this constant. Questions with more options are a configuration error.
pub const MAX_POSITIONS: usize = 5;

/// One selectable answer belonging to a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    /// Stable identity, independent of display position.
    pub option_id: String,
    /// Display label, e.g. `"①"`.
    pub label: String,
    /// Whether this is the correct answer. Drives the constrained strategy
    /// and answer scoring.
    #[serde(default)]
    pub correct: bool,
    /// Pinned options keep their place under the block strategy
    /// ("all of the above"-style options that only make sense last).
    #[serde(default)]
    pub pinned: bool,
}

impl AnswerOption {
    pub fn new(option_id: impl Into<String>, label: impl Into<String>, correct: bool) -> Self {
        Self {
            option_id: option_id.into(),
            label: label.into(),
            correct,
            pinned: false,
        }
    }

    /// Mark this option as pinned in place for the block strategy.
    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }
}

/// A question with its options in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: String,
    pub options: Vec<AnswerOption>,
}

impl Question {
    /// Build a question from `(option_id, label, correct)` triples.
    pub fn new(
        question_id: impl Into<String>,
        options: Vec<(impl Into<String>, impl Into<String>, bool)>,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            options: options
                .into_iter()
                .map(|(id, label, correct)| AnswerOption::new(id, label, correct))
                .collect(),
        }
    }

    pub fn option_count(&self) -> usize {
        self.options.len()
    }
}

/// Display-order record of a single shuffle.
///
/// `positions[d]` is the original index of the option shown at display
/// position `d`. The record is what makes a shuffle invertible and a past
/// attempt re-scorable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermutationRecord {
    positions: Vec<usize>,
}

impl PermutationRecord {
    /// Build a record from a display→original mapping.
    ///
    /// The mapping must be a permutation of `0..n`; anything else is a bug in
    /// the shuffler, not recoverable data.
    pub(crate) fn from_positions(positions: Vec<usize>) -> Self {
        debug_assert!(is_permutation(&positions));
        Self { positions }
    }

    /// The identity record for `n` options (unshuffled display).
    pub fn identity(n: usize) -> Self {
        Self {
            positions: (0..n).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn is_identity(&self) -> bool {
        self.positions.iter().enumerate().all(|(d, &o)| d == o)
    }

    /// Original index of the option displayed at `display_pos`.
    pub fn original_index(&self, display_pos: usize) -> Option<usize> {
        self.positions.get(display_pos).copied()
    }

    /// Display position where the option with original index `orig` landed.
    pub fn display_position(&self, orig: usize) -> Option<usize> {
        self.positions.iter().position(|&o| o == orig)
    }

    /// Display→original mapping as a slice.
    pub fn as_slice(&self) -> &[usize] {
        &self.positions
    }

    /// Apply the record to options in canonical order, producing display order.
    pub fn apply(&self, options: &[AnswerOption]) -> Vec<AnswerOption> {
        self.positions
            .iter()
            .filter_map(|&o| options.get(o).cloned())
            .collect()
    }

    /// Invert a displayed list back to canonical order.
    ///
    /// Inverse of [`apply`](Self::apply): element at display position `d`
    /// returns to original index `positions[d]`.
    pub fn restore(&self, shuffled: &[AnswerOption]) -> Vec<AnswerOption> {
        let mut original: Vec<Option<AnswerOption>> = vec![None; self.positions.len()];
        for (d, option) in shuffled.iter().enumerate() {
            if let Some(&o) = self.positions.get(d) {
                original[o] = Some(option.clone());
            }
        }
        original.into_iter().flatten().collect()
    }
}

/// A question after shuffling: display-order options plus the record needed
/// to restore canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffledQuestion {
    pub question_id: String,
    pub options: Vec<AnswerOption>,
    pub record: PermutationRecord,
}

impl ShuffledQuestion {
    /// Canonical-order options, recovered from the record.
    pub fn restore_original_order(&self) -> Vec<AnswerOption> {
        self.record.restore(&self.options)
    }
}

fn is_permutation(positions: &[usize]) -> bool {
    let mut seen = vec![false; positions.len()];
    for &p in positions {
        if p >= positions.len() || seen[p] {
            return false;
        }
        seen[p] = true;
    }
    true
}
