//! Per-session randomization state and lifecycle.
//!
//! A [`SessionRandomizer`] owns one exam attempt's [`RandomizationState`]:
//! the seed, the strategy, and the enabled flag. It memoizes one
//! [`Shuffler`] and the permutation record of every question it has
//! shuffled, so re-rendering a question within a session always shows the
//! same order and scoring can invert any displayed position.
//!
//! State machine: uninitialized → active via `initialize_randomization`;
//! active ⇄ disabled via the enable/disable toggles (re-enabling REUSES the
//! stored seed, so earlier shuffles stay valid); active → active with a
//! fresh seed via `change_strategy`, which discards the memoized records —
//! an explicit, irreversible transition. The lifecycle ends when the value
//! drops with the session.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ShuffleError;
use crate::question::{AnswerOption, PermutationRecord, Question, ShuffledQuestion};
use crate::shuffler::{Shuffler, Strategy, generate_seed};
use crate::stats::StatStore;

/// Reproducible randomization state for one exam session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomizationState {
    pub seed: u64,
    pub strategy: Strategy,
    pub enabled: bool,
}

/// Read-only projection of the session state for display and debugging.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RandomizationSummary {
    pub seed: u64,
    pub strategy: Strategy,
    pub enabled: bool,
    pub questions_shuffled: usize,
}

/// Lifecycle owner of per-session randomization.
pub struct SessionRandomizer {
    state: Option<RandomizationState>,
    shuffler: Option<Shuffler>,
    records: HashMap<String, PermutationRecord>,
    stats: Option<Arc<dyn StatStore>>,
}

impl Default for SessionRandomizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRandomizer {
    /// An uninitialized session. Every shuffle operation fails until
    /// [`initialize_randomization`](Self::initialize_randomization) runs.
    pub fn new() -> Self {
        Self {
            state: None,
            shuffler: None,
            records: HashMap::new(),
            stats: None,
        }
    }

    /// Attach a stat store; every fresh shuffle then records one placement
    /// per displayed option.
    pub fn with_stats(mut self, stats: Arc<dyn StatStore>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Create state with a freshly generated seed and the given strategy.
    /// Shuffling starts enabled.
    pub fn initialize_randomization(&mut self, strategy: Strategy) -> Result<(), ShuffleError> {
        self.initialize_with_seed(generate_seed(), strategy)
    }

    /// Create state with an explicit seed — replaying a recorded session, or
    /// deterministic tests.
    pub fn initialize_with_seed(
        &mut self,
        seed: u64,
        strategy: Strategy,
    ) -> Result<(), ShuffleError> {
        if self.state.is_some() {
            return Err(ShuffleError::AlreadyInitialized);
        }
        self.state = Some(RandomizationState {
            seed,
            strategy,
            enabled: true,
        });
        log::debug!("session randomization initialized: seed={seed}, strategy={strategy}");
        Ok(())
    }

    /// Rebuild a session from persisted state. The shuffles it produced
    /// before are reproduced exactly.
    pub fn resume(state: RandomizationState) -> Self {
        Self {
            state: Some(state),
            shuffler: None,
            records: HashMap::new(),
            stats: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    fn state(&self) -> Result<&RandomizationState, ShuffleError> {
        self.state.as_ref().ok_or(ShuffleError::NotInitialized)
    }

    /// The session's shuffler, constructed lazily from the stored seed and
    /// memoized for the session's lifetime.
    pub fn randomizer(&mut self) -> Result<&Shuffler, ShuffleError> {
        let state = *self.state()?;
        if self.shuffler.is_none() {
            self.shuffler = Some(Shuffler::from_seed(state.seed, state.strategy));
        }
        Ok(self.shuffler.as_ref().unwrap())
    }

    /// Shuffle one question, idempotently within the session.
    ///
    /// The first render draws the permutation (and records stat placements);
    /// every later render replays the memoized record. When randomization is
    /// disabled the options pass through in canonical order and nothing is
    /// recorded — an unshuffled display is not a randomization event.
    pub fn randomize_question(
        &mut self,
        question: &Question,
    ) -> Result<ShuffledQuestion, ShuffleError> {
        let state = *self.state()?;

        if !state.enabled {
            return Ok(ShuffledQuestion {
                question_id: question.question_id.clone(),
                options: question.options.clone(),
                record: PermutationRecord::identity(question.options.len()),
            });
        }

        if let Some(record) = self.records.get(&question.question_id) {
            return Ok(ShuffledQuestion {
                question_id: question.question_id.clone(),
                options: record.apply(&question.options),
                record: record.clone(),
            });
        }

        let shuffled = self.randomizer()?.randomize_question_options(question)?;
        self.records
            .insert(question.question_id.clone(), shuffled.record.clone());
        self.record_placements(&shuffled);
        Ok(shuffled)
    }

    /// Shuffle a whole exam through the per-question path, so memoization
    /// and stat recording behave identically either way.
    pub fn randomize_all_questions(
        &mut self,
        questions: &[Question],
    ) -> Result<Vec<ShuffledQuestion>, ShuffleError> {
        questions
            .iter()
            .map(|q| self.randomize_question(q))
            .collect()
    }

    /// Invert a displayed option list back to canonical order for scoring.
    pub fn restore_question_order(
        &self,
        question_id: &str,
        shuffled: &[AnswerOption],
    ) -> Result<Vec<AnswerOption>, ShuffleError> {
        self.state()?;
        match self.records.get(question_id) {
            Some(record) => Ok(record.restore(shuffled)),
            // Never shuffled in this session: either disabled at render time
            // or never rendered. Canonical order is display order.
            None => Ok(shuffled.to_vec()),
        }
    }

    /// Original index of the option the user picked at `display_pos`.
    pub fn score_submission(
        &self,
        question_id: &str,
        display_pos: usize,
    ) -> Result<usize, ShuffleError> {
        self.state()?;
        let record = self
            .records
            .get(question_id)
            .ok_or_else(|| ShuffleError::UnknownQuestion {
                question_id: question_id.to_string(),
            })?;
        record
            .original_index(display_pos)
            .ok_or(ShuffleError::InvalidPosition {
                position: display_pos,
                positions_used: record.len(),
            })
    }

    /// Turn shuffling back on, reusing the stored seed so earlier memoized
    /// shuffles remain valid.
    pub fn enable_randomization(&mut self) -> Result<(), ShuffleError> {
        match self.state.as_mut() {
            Some(state) => {
                state.enabled = true;
                Ok(())
            }
            None => Err(ShuffleError::NotInitialized),
        }
    }

    /// Turn shuffling off; questions render in canonical order until
    /// re-enabled.
    pub fn disable_randomization(&mut self) -> Result<(), ShuffleError> {
        match self.state.as_mut() {
            Some(state) => {
                state.enabled = false;
                Ok(())
            }
            None => Err(ShuffleError::NotInitialized),
        }
    }

    /// Switch strategy with a fresh seed.
    ///
    /// Prior shuffles for this session are no longer reproducible: the
    /// memoized records are discarded and questions re-shuffle under the new
    /// state on next render.
    pub fn change_strategy(&mut self, strategy: Strategy) -> Result<(), ShuffleError> {
        match self.state.as_mut() {
            Some(state) => {
                state.strategy = strategy;
                state.seed = generate_seed();
                self.shuffler = None;
                self.records.clear();
                log::debug!(
                    "session strategy changed to {strategy}, new seed={}",
                    state.seed
                );
                Ok(())
            }
            None => Err(ShuffleError::NotInitialized),
        }
    }

    /// Read-only `{seed, strategy, enabled}` projection.
    pub fn randomization_summary(&self) -> Result<RandomizationSummary, ShuffleError> {
        let state = self.state()?;
        Ok(RandomizationSummary {
            seed: state.seed,
            strategy: state.strategy,
            enabled: state.enabled,
            questions_shuffled: self.records.len(),
        })
    }

    /// The persistable state, for storage alongside the session.
    pub fn state_snapshot(&self) -> Option<RandomizationState> {
        self.state
    }

    fn record_placements(&self, shuffled: &ShuffledQuestion) {
        let Some(stats) = &self.stats else {
            return;
        };
        let n = shuffled.options.len();
        if n < 2 {
            return;
        }
        for (position, option) in shuffled.options.iter().enumerate() {
            // Rendering outranks accounting: a store failure loses one
            // counter tick, never a question.
            if let Err(err) =
                stats.record_placement(&option.option_id, &option.label, position, n)
            {
                log::warn!("failed to record placement for {}: {err}", option.option_id);
            }
        }
    }
}
