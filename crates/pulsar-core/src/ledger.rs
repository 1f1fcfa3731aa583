//! # Attempt Ledger
//!
//! Storage for progression pointers, puzzle and quiz attempts, cycle quizzes
//! and personas.
//!
//! This module defines the `LedgerStore` trait and its in-memory
//! implementation. Reads are individual; writes are submitted as a batch of
//! [`LedgerWrite`]s and applied all-or-nothing, so one engine operation is
//! one commit.

use crate::progression::ProgressionState;
use crate::{
    Cycle, CycleQuiz, Persona, PulsarError, PuzzleAttempt, PuzzleKey, QuizAttempt, QuizId, UserId,
};
use std::collections::BTreeMap;

// =============================================================================
// WRITE BATCH
// =============================================================================

/// One mutation inside a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerWrite {
    /// Create or replace a user's progression pointer.
    PutProgression(UserId, ProgressionState),
    /// Create a puzzle attempt. Fails the whole batch with
    /// `DuplicatePuzzle` if the key is taken.
    InsertPuzzle(PuzzleAttempt),
    /// Create or replace a puzzle attempt.
    PutPuzzle(PuzzleAttempt),
    /// Remove a puzzle attempt if present.
    DeletePuzzle(PuzzleKey),
    /// Create or replace a quiz attempt.
    PutQuiz(QuizAttempt),
    /// Create a cycle quiz. Fails the whole batch with
    /// `DuplicateCycleQuiz` if one exists for the user and cycle.
    InsertCycleQuiz(CycleQuiz),
    /// Create or replace a user's persona.
    PutPersona(UserId, Persona),
}

// =============================================================================
// LEDGERSTORE TRAIT
// =============================================================================

/// The LedgerStore trait defines the ledger operations.
///
/// All fallible operations return `Result<T, PulsarError>` to support both
/// in-memory and persistent storage backends uniformly.
pub trait LedgerStore {
    /// Progression pointer of a user, if one was ever stored.
    fn progression(&self, user: UserId) -> Result<Option<ProgressionState>, PulsarError>;

    /// Puzzle attempt for a key.
    fn puzzle(&self, key: &PuzzleKey) -> Result<Option<PuzzleAttempt>, PulsarError>;

    /// Quiz attempt by id.
    fn quiz(&self, id: QuizId) -> Result<Option<QuizAttempt>, PulsarError>;

    /// All puzzle attempts of a user, ordered by (cycle, gate).
    fn puzzles_for(&self, user: UserId) -> Result<Vec<PuzzleAttempt>, PulsarError>;

    /// All quiz attempts of a user, ordered by id.
    fn quizzes_for(&self, user: UserId) -> Result<Vec<QuizAttempt>, PulsarError>;

    /// Cycle quiz of a user for one cycle.
    fn cycle_quiz(&self, user: UserId, cycle: Cycle) -> Result<Option<CycleQuiz>, PulsarError>;

    /// All cycle quizzes of a user, ordered by cycle.
    fn cycle_quizzes_for(&self, user: UserId) -> Result<Vec<CycleQuiz>, PulsarError>;

    /// Persona of a user, if one was saved.
    fn persona(&self, user: UserId) -> Result<Option<Persona>, PulsarError>;

    /// Reserve the next quiz id. Ids are never handed out twice, even if the
    /// attempt using them is never committed.
    fn allocate_quiz_id(&mut self) -> Result<QuizId, PulsarError>;

    /// Apply a batch of writes atomically.
    fn commit(&mut self, batch: Vec<LedgerWrite>) -> Result<(), PulsarError>;
}

// =============================================================================
// IN-MEMORY LEDGER
// =============================================================================

/// Volatile ledger backed by `BTreeMap`s.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    progression: BTreeMap<UserId, ProgressionState>,
    puzzles: BTreeMap<PuzzleKey, PuzzleAttempt>,
    quizzes: BTreeMap<QuizId, QuizAttempt>,
    cycle_quizzes: BTreeMap<(UserId, Cycle), CycleQuiz>,
    personas: BTreeMap<UserId, Persona>,
    next_quiz_id: u64,
}

impl Ledger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored puzzle attempts (all users).
    #[must_use]
    pub fn puzzle_count(&self) -> usize {
        self.puzzles.len()
    }

    /// Number of stored quiz attempts (all users).
    #[must_use]
    pub fn quiz_count(&self) -> usize {
        self.quizzes.len()
    }

    /// Reject the batch before touching any map if an insert would collide,
    /// accounting for inserts and deletes earlier in the same batch.
    fn check_batch(&self, batch: &[LedgerWrite]) -> Result<(), PulsarError> {
        let mut overlay: BTreeMap<PuzzleKey, bool> = BTreeMap::new();
        let mut new_cycle_quizzes: Vec<(UserId, Cycle)> = Vec::new();
        for write in batch {
            match write {
                LedgerWrite::InsertPuzzle(attempt) => {
                    let present = overlay
                        .get(&attempt.key)
                        .copied()
                        .unwrap_or_else(|| self.puzzles.contains_key(&attempt.key));
                    if present {
                        return Err(PulsarError::DuplicatePuzzle(attempt.key));
                    }
                    overlay.insert(attempt.key, true);
                }
                LedgerWrite::PutPuzzle(attempt) => {
                    overlay.insert(attempt.key, true);
                }
                LedgerWrite::DeletePuzzle(key) => {
                    overlay.insert(*key, false);
                }
                LedgerWrite::InsertCycleQuiz(quiz) => {
                    let slot = (quiz.user, quiz.cycle);
                    if self.cycle_quizzes.contains_key(&slot) || new_cycle_quizzes.contains(&slot)
                    {
                        return Err(PulsarError::DuplicateCycleQuiz(quiz.user, quiz.cycle));
                    }
                    new_cycle_quizzes.push(slot);
                }
                LedgerWrite::PutProgression(..)
                | LedgerWrite::PutQuiz(_)
                | LedgerWrite::PutPersona(..) => {}
            }
        }
        Ok(())
    }
}

impl LedgerStore for Ledger {
    fn progression(&self, user: UserId) -> Result<Option<ProgressionState>, PulsarError> {
        Ok(self.progression.get(&user).copied())
    }

    fn puzzle(&self, key: &PuzzleKey) -> Result<Option<PuzzleAttempt>, PulsarError> {
        Ok(self.puzzles.get(key).cloned())
    }

    fn quiz(&self, id: QuizId) -> Result<Option<QuizAttempt>, PulsarError> {
        Ok(self.quizzes.get(&id).cloned())
    }

    fn puzzles_for(&self, user: UserId) -> Result<Vec<PuzzleAttempt>, PulsarError> {
        Ok(self
            .puzzles
            .values()
            .filter(|p| p.key.user == user)
            .cloned()
            .collect())
    }

    fn quizzes_for(&self, user: UserId) -> Result<Vec<QuizAttempt>, PulsarError> {
        Ok(self
            .quizzes
            .values()
            .filter(|q| q.user == user)
            .cloned()
            .collect())
    }

    fn cycle_quiz(&self, user: UserId, cycle: Cycle) -> Result<Option<CycleQuiz>, PulsarError> {
        Ok(self.cycle_quizzes.get(&(user, cycle)).cloned())
    }

    fn cycle_quizzes_for(&self, user: UserId) -> Result<Vec<CycleQuiz>, PulsarError> {
        Ok(self
            .cycle_quizzes
            .range((user, Cycle(0))..=(user, Cycle(u32::MAX)))
            .map(|(_, quiz)| quiz.clone())
            .collect())
    }

    fn persona(&self, user: UserId) -> Result<Option<Persona>, PulsarError> {
        Ok(self.personas.get(&user).cloned())
    }

    fn allocate_quiz_id(&mut self) -> Result<QuizId, PulsarError> {
        self.next_quiz_id = self.next_quiz_id.saturating_add(1);
        Ok(QuizId(self.next_quiz_id))
    }

    fn commit(&mut self, batch: Vec<LedgerWrite>) -> Result<(), PulsarError> {
        self.check_batch(&batch)?;
        for write in batch {
            match write {
                LedgerWrite::PutProgression(user, state) => {
                    self.progression.insert(user, state);
                }
                LedgerWrite::InsertPuzzle(attempt) | LedgerWrite::PutPuzzle(attempt) => {
                    self.puzzles.insert(attempt.key, attempt);
                }
                LedgerWrite::DeletePuzzle(key) => {
                    self.puzzles.remove(&key);
                }
                LedgerWrite::PutQuiz(quiz) => {
                    self.quizzes.insert(quiz.id, quiz);
                }
                LedgerWrite::InsertCycleQuiz(quiz) => {
                    self.cycle_quizzes.insert((quiz.user, quiz.cycle), quiz);
                }
                LedgerWrite::PutPersona(user, persona) => {
                    self.personas.insert(user, persona);
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::fallback_cycle_quiz;
    use crate::{Avatar, Gate, PuzzleSpec};
    use chrono::Utc;

    fn key(user: u64, gate: u8) -> PuzzleKey {
        PuzzleKey::new(
            UserId(user),
            Cycle::FIRST,
            Gate::new(gate).expect("valid gate"),
        )
    }

    #[test]
    fn insert_puzzle_is_unique_per_key() {
        let mut ledger = Ledger::new();
        let attempt = PuzzleAttempt::new(key(1, 1), PuzzleSpec::ManualVerification);

        ledger
            .commit(vec![LedgerWrite::InsertPuzzle(attempt.clone())])
            .expect("first insert");
        let second = ledger.commit(vec![LedgerWrite::InsertPuzzle(attempt)]);

        assert!(matches!(second, Err(PulsarError::DuplicatePuzzle(_))));
        assert_eq!(ledger.puzzle_count(), 1);
    }

    #[test]
    fn failed_batch_applies_nothing() {
        let mut ledger = Ledger::new();
        let attempt = PuzzleAttempt::new(key(1, 1), PuzzleSpec::ManualVerification);
        ledger
            .commit(vec![LedgerWrite::InsertPuzzle(attempt.clone())])
            .expect("insert");

        let result = ledger.commit(vec![
            LedgerWrite::PutProgression(UserId(1), ProgressionState::new()),
            LedgerWrite::InsertPuzzle(attempt),
        ]);

        assert!(result.is_err());
        assert!(ledger.progression(UserId(1)).expect("read").is_none());
    }

    #[test]
    fn delete_then_insert_in_one_batch() {
        let mut ledger = Ledger::new();
        let attempt = PuzzleAttempt::new(key(1, 2), PuzzleSpec::ManualVerification);
        ledger
            .commit(vec![LedgerWrite::InsertPuzzle(attempt.clone())])
            .expect("insert");

        ledger
            .commit(vec![
                LedgerWrite::DeletePuzzle(attempt.key),
                LedgerWrite::InsertPuzzle(attempt),
            ])
            .expect("delete then insert");
        assert_eq!(ledger.puzzle_count(), 1);
    }

    #[test]
    fn puzzles_for_filters_by_user() {
        let mut ledger = Ledger::new();
        ledger
            .commit(vec![
                LedgerWrite::InsertPuzzle(PuzzleAttempt::new(
                    key(1, 1),
                    PuzzleSpec::ManualVerification,
                )),
                LedgerWrite::InsertPuzzle(PuzzleAttempt::new(
                    key(2, 1),
                    PuzzleSpec::ManualVerification,
                )),
                LedgerWrite::InsertPuzzle(PuzzleAttempt::new(
                    key(1, 2),
                    PuzzleSpec::ManualVerification,
                )),
            ])
            .expect("insert");

        let mine = ledger.puzzles_for(UserId(1)).expect("read");
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|p| p.key.user == UserId(1)));
        assert!(mine[0].key.gate < mine[1].key.gate);
    }

    #[test]
    fn quiz_ids_are_sequential() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.allocate_quiz_id().expect("id"), QuizId(1));
        assert_eq!(ledger.allocate_quiz_id().expect("id"), QuizId(2));
    }

    fn cycle_quiz(user: u64) -> CycleQuiz {
        CycleQuiz {
            user: UserId(user),
            cycle: Cycle::FIRST,
            questions: fallback_cycle_quiz(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn cycle_quiz_is_unique_per_user_and_cycle() {
        let mut ledger = Ledger::new();
        ledger
            .commit(vec![
                LedgerWrite::InsertCycleQuiz(cycle_quiz(1)),
                LedgerWrite::InsertCycleQuiz(cycle_quiz(2)),
            ])
            .expect("insert");

        let again = ledger.commit(vec![
            LedgerWrite::PutProgression(UserId(1), ProgressionState::new()),
            LedgerWrite::InsertCycleQuiz(cycle_quiz(1)),
        ]);
        assert!(matches!(again, Err(PulsarError::DuplicateCycleQuiz(..))));
        assert!(ledger.progression(UserId(1)).expect("read").is_none());

        let twice_in_one_batch = ledger.commit(vec![
            LedgerWrite::InsertCycleQuiz(cycle_quiz(3)),
            LedgerWrite::InsertCycleQuiz(cycle_quiz(3)),
        ]);
        assert!(twice_in_one_batch.is_err());
        assert!(ledger.cycle_quiz(UserId(3), Cycle::FIRST).expect("read").is_none());

        assert_eq!(ledger.cycle_quizzes_for(UserId(1)).expect("read").len(), 1);
    }

    #[test]
    fn persona_is_replaced_on_save() {
        let mut ledger = Ledger::new();
        let first = Persona::new("Vega", Avatar::default(), Utc::now()).expect("persona");
        let second = Persona::new("Altair", Avatar::default(), Utc::now()).expect("persona");

        ledger
            .commit(vec![LedgerWrite::PutPersona(UserId(1), first)])
            .expect("save");
        ledger
            .commit(vec![LedgerWrite::PutPersona(UserId(1), second.clone())])
            .expect("replace");

        assert_eq!(ledger.persona(UserId(1)).expect("read"), Some(second));
        assert!(ledger.persona(UserId(2)).expect("read").is_none());
    }
}
