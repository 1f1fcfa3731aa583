//! # redb-backed Attempt Ledger
//!
//! A disk-backed ledger using the redb embedded database, providing:
//! - ACID transactions (one write transaction per engine operation)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! ## Layout
//!
//! | Table | Key | Value |
//! |-------|-----|-------|
//! | `progression` | user id | postcard `ProgressionState` |
//! | `puzzles` | (user id, cycle, gate) | postcard `PuzzleAttempt` |
//! | `quizzes` | quiz id | postcard `QuizAttempt` |
//! | `cycle_quizzes` | (user id, cycle) | postcard `CycleQuiz` |
//! | `personas` | user id | postcard `Persona` |
//! | `metadata` | name | counter |

use crate::ledger::{LedgerStore, LedgerWrite};
use crate::progression::ProgressionState;
use crate::{
    Cycle, CycleQuiz, Persona, PulsarError, PuzzleAttempt, PuzzleKey, QuizAttempt, QuizId, UserId,
};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Table for progression pointers: UserId(u64) -> serialized ProgressionState
const PROGRESSION: TableDefinition<u64, &[u8]> = TableDefinition::new("progression");

/// Table for puzzle attempts: (user, cycle, gate) -> serialized PuzzleAttempt
/// The composite key is the uniqueness constraint and enables per-user ranges.
const PUZZLES: TableDefinition<(u64, u32, u8), &[u8]> = TableDefinition::new("puzzles");

/// Table for quiz attempts: QuizId(u64) -> serialized QuizAttempt
const QUIZZES: TableDefinition<u64, &[u8]> = TableDefinition::new("quizzes");

/// Table for cycle quizzes: (user, cycle) -> serialized CycleQuiz
const CYCLE_QUIZZES: TableDefinition<(u64, u32), &[u8]> = TableDefinition::new("cycle_quizzes");

/// Table for personas: UserId(u64) -> serialized Persona
const PERSONAS: TableDefinition<u64, &[u8]> = TableDefinition::new("personas");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_QUIZ_ID: &str = "next_quiz_id";

fn io(e: impl std::fmt::Display) -> PulsarError {
    PulsarError::IoError(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, PulsarError> {
    postcard::to_allocvec(value).map_err(|e| PulsarError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PulsarError> {
    postcard::from_bytes(bytes).map_err(|e| PulsarError::SerializationError(e.to_string()))
}

fn puzzle_key(key: &PuzzleKey) -> (u64, u32, u8) {
    (key.user.0, key.cycle.value(), key.gate.number())
}

/// A disk-backed ledger using redb.
pub struct RedbLedger {
    /// The redb database handle.
    db: Database,
    /// Last allocated quiz id, mirrored from the metadata table.
    last_quiz_id: u64,
}

impl std::fmt::Debug for RedbLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbLedger")
            .field("last_quiz_id", &self.last_quiz_id)
            .finish_non_exhaustive()
    }
}

impl RedbLedger {
    /// Open or create a ledger database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PulsarError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io)?;
            let _ = write_txn.open_table(PROGRESSION).map_err(io)?;
            let _ = write_txn.open_table(PUZZLES).map_err(io)?;
            let _ = write_txn.open_table(QUIZZES).map_err(io)?;
            let _ = write_txn.open_table(CYCLE_QUIZZES).map_err(io)?;
            let _ = write_txn.open_table(PERSONAS).map_err(io)?;
            let _ = write_txn.open_table(METADATA).map_err(io)?;
            write_txn.commit().map_err(io)?;
        }

        let last_quiz_id = {
            let read_txn = db.begin_read().map_err(io)?;
            let table = read_txn.open_table(METADATA).map_err(io)?;
            table
                .get(NEXT_QUIZ_ID)
                .map_err(io)?
                .map(|v| v.value())
                .unwrap_or(0)
        };

        Ok(Self { db, last_quiz_id })
    }

    /// Number of stored puzzle attempts (all users).
    pub fn puzzle_count(&self) -> Result<usize, PulsarError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(PUZZLES).map_err(io)?;
        Ok(table.len().map_err(io)? as usize)
    }

    /// Number of stored quiz attempts (all users).
    pub fn quiz_count(&self) -> Result<usize, PulsarError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(QUIZZES).map_err(io)?;
        Ok(table.len().map_err(io)? as usize)
    }

    /// Apply every write of a batch inside an open transaction.
    ///
    /// On error the caller aborts the transaction, so nothing is applied.
    fn apply_batch(write_txn: &WriteTransaction, batch: &[LedgerWrite]) -> Result<(), PulsarError> {
        let mut progression = write_txn.open_table(PROGRESSION).map_err(io)?;
        let mut puzzles = write_txn.open_table(PUZZLES).map_err(io)?;
        let mut quizzes = write_txn.open_table(QUIZZES).map_err(io)?;
        let mut cycle_quizzes = write_txn.open_table(CYCLE_QUIZZES).map_err(io)?;
        let mut personas = write_txn.open_table(PERSONAS).map_err(io)?;

        for write in batch {
            match write {
                LedgerWrite::PutProgression(user, state) => {
                    let bytes = encode(state)?;
                    progression
                        .insert(user.0, bytes.as_slice())
                        .map_err(io)?;
                }
                LedgerWrite::InsertPuzzle(attempt) => {
                    let key = puzzle_key(&attempt.key);
                    if puzzles.get(key).map_err(io)?.is_some() {
                        return Err(PulsarError::DuplicatePuzzle(attempt.key));
                    }
                    let bytes = encode(attempt)?;
                    puzzles.insert(key, bytes.as_slice()).map_err(io)?;
                }
                LedgerWrite::PutPuzzle(attempt) => {
                    let bytes = encode(attempt)?;
                    puzzles
                        .insert(puzzle_key(&attempt.key), bytes.as_slice())
                        .map_err(io)?;
                }
                LedgerWrite::DeletePuzzle(key) => {
                    puzzles.remove(puzzle_key(key)).map_err(io)?;
                }
                LedgerWrite::PutQuiz(quiz) => {
                    let bytes = encode(quiz)?;
                    quizzes.insert(quiz.id.0, bytes.as_slice()).map_err(io)?;
                }
                LedgerWrite::InsertCycleQuiz(quiz) => {
                    let key = (quiz.user.0, quiz.cycle.value());
                    if cycle_quizzes.get(key).map_err(io)?.is_some() {
                        return Err(PulsarError::DuplicateCycleQuiz(quiz.user, quiz.cycle));
                    }
                    let bytes = encode(quiz)?;
                    cycle_quizzes.insert(key, bytes.as_slice()).map_err(io)?;
                }
                LedgerWrite::PutPersona(user, persona) => {
                    let bytes = encode(persona)?;
                    personas.insert(user.0, bytes.as_slice()).map_err(io)?;
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// LEDGERSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl LedgerStore for RedbLedger {
    fn progression(&self, user: UserId) -> Result<Option<ProgressionState>, PulsarError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(PROGRESSION).map_err(io)?;
        match table.get(user.0).map_err(io)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn puzzle(&self, key: &PuzzleKey) -> Result<Option<PuzzleAttempt>, PulsarError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(PUZZLES).map_err(io)?;
        match table.get(puzzle_key(key)).map_err(io)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn quiz(&self, id: QuizId) -> Result<Option<QuizAttempt>, PulsarError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(QUIZZES).map_err(io)?;
        match table.get(id.0).map_err(io)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn puzzles_for(&self, user: UserId) -> Result<Vec<PuzzleAttempt>, PulsarError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(PUZZLES).map_err(io)?;

        let mut attempts = Vec::new();
        for entry in table
            .range((user.0, 0u32, 0u8)..=(user.0, u32::MAX, u8::MAX))
            .map_err(io)?
        {
            let (_, value) = entry.map_err(io)?;
            attempts.push(decode(value.value())?);
        }
        Ok(attempts)
    }

    fn quizzes_for(&self, user: UserId) -> Result<Vec<QuizAttempt>, PulsarError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(QUIZZES).map_err(io)?;

        let mut quizzes = Vec::new();
        for entry in table.iter().map_err(io)? {
            let (_, value) = entry.map_err(io)?;
            let quiz: QuizAttempt = decode(value.value())?;
            if quiz.user == user {
                quizzes.push(quiz);
            }
        }
        Ok(quizzes)
    }

    fn cycle_quiz(&self, user: UserId, cycle: Cycle) -> Result<Option<CycleQuiz>, PulsarError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(CYCLE_QUIZZES).map_err(io)?;
        match table.get((user.0, cycle.value())).map_err(io)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn cycle_quizzes_for(&self, user: UserId) -> Result<Vec<CycleQuiz>, PulsarError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(CYCLE_QUIZZES).map_err(io)?;

        let mut quizzes = Vec::new();
        for entry in table
            .range((user.0, 0u32)..=(user.0, u32::MAX))
            .map_err(io)?
        {
            let (_, value) = entry.map_err(io)?;
            quizzes.push(decode(value.value())?);
        }
        Ok(quizzes)
    }

    fn persona(&self, user: UserId) -> Result<Option<Persona>, PulsarError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(PERSONAS).map_err(io)?;
        match table.get(user.0).map_err(io)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn allocate_quiz_id(&mut self) -> Result<QuizId, PulsarError> {
        let next = self.last_quiz_id.saturating_add(1);
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut meta = write_txn.open_table(METADATA).map_err(io)?;
            meta.insert(NEXT_QUIZ_ID, next).map_err(io)?;
        }
        write_txn.commit().map_err(io)?;

        // Update in-memory state only after successful commit.
        self.last_quiz_id = next;
        Ok(QuizId(next))
    }

    fn commit(&mut self, batch: Vec<LedgerWrite>) -> Result<(), PulsarError> {
        if batch.is_empty() {
            return Ok(());
        }

        let write_txn = self.db.begin_write().map_err(io)?;
        match Self::apply_batch(&write_txn, &batch) {
            Ok(()) => write_txn.commit().map_err(io),
            Err(e) => {
                write_txn.abort().map_err(io)?;
                Err(e)
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cycle, Difficulty, Gate, HanoiPuzzle, PuzzleSpec, content::fallback_quiz};
    use chrono::Utc;
    use tempfile::tempdir;

    fn key(user: u64, gate: u8) -> PuzzleKey {
        PuzzleKey::new(
            UserId(user),
            Cycle::FIRST,
            Gate::new(gate).expect("valid gate"),
        )
    }

    fn hanoi(gate: u8) -> PuzzleSpec {
        PuzzleSpec::TowerOfHanoi(HanoiPuzzle::for_gate(Gate::new(gate).expect("valid gate")))
    }

    #[test]
    fn progression_round_trip() {
        let temp = tempdir().expect("temp dir");
        let mut ledger = RedbLedger::open(temp.path().join("test.redb")).expect("open db");

        let mut state = ProgressionState::new();
        state.advance(Gate::FIRST);
        ledger
            .commit(vec![LedgerWrite::PutProgression(UserId(7), state)])
            .expect("commit");

        assert_eq!(ledger.progression(UserId(7)).expect("read"), Some(state));
        assert_eq!(ledger.progression(UserId(8)).expect("read"), None);
    }

    #[test]
    fn duplicate_insert_aborts_batch() {
        let temp = tempdir().expect("temp dir");
        let mut ledger = RedbLedger::open(temp.path().join("test.redb")).expect("open db");
        let attempt = PuzzleAttempt::new(key(1, 1), hanoi(1));

        ledger
            .commit(vec![LedgerWrite::InsertPuzzle(attempt.clone())])
            .expect("first insert");

        let result = ledger.commit(vec![
            LedgerWrite::PutProgression(UserId(1), ProgressionState::new()),
            LedgerWrite::InsertPuzzle(attempt),
        ]);

        assert!(matches!(result, Err(PulsarError::DuplicatePuzzle(_))));
        assert!(ledger.progression(UserId(1)).expect("read").is_none());
        assert_eq!(ledger.puzzle_count().expect("count"), 1);
    }

    #[test]
    fn delete_puzzle() {
        let temp = tempdir().expect("temp dir");
        let mut ledger = RedbLedger::open(temp.path().join("test.redb")).expect("open db");
        let attempt = PuzzleAttempt::new(key(1, 3), hanoi(3));

        ledger
            .commit(vec![LedgerWrite::InsertPuzzle(attempt.clone())])
            .expect("insert");
        ledger
            .commit(vec![LedgerWrite::DeletePuzzle(attempt.key)])
            .expect("delete");

        assert!(ledger.puzzle(&attempt.key).expect("read").is_none());
    }

    #[test]
    fn puzzles_for_uses_user_range() {
        let temp = tempdir().expect("temp dir");
        let mut ledger = RedbLedger::open(temp.path().join("test.redb")).expect("open db");

        ledger
            .commit(vec![
                LedgerWrite::InsertPuzzle(PuzzleAttempt::new(key(1, 2), hanoi(2))),
                LedgerWrite::InsertPuzzle(PuzzleAttempt::new(key(2, 1), hanoi(1))),
                LedgerWrite::InsertPuzzle(PuzzleAttempt::new(key(1, 1), hanoi(1))),
            ])
            .expect("insert");

        let mine = ledger.puzzles_for(UserId(1)).expect("read");
        let gates: Vec<u8> = mine.iter().map(|p| p.key.gate.number()).collect();
        assert_eq!(gates, vec![1, 2]);
    }

    #[test]
    fn persistence() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let quiz_id;

        // Create and populate
        {
            let mut ledger = RedbLedger::open(&db_path).expect("open db");
            quiz_id = ledger.allocate_quiz_id().expect("id");
            let mut solved = PuzzleAttempt::new(key(3, 1), hanoi(1));
            solved.mark_solved(Utc::now());
            ledger
                .commit(vec![
                    LedgerWrite::PutPuzzle(solved),
                    LedgerWrite::PutQuiz(QuizAttempt {
                        id: quiz_id,
                        user: UserId(3),
                        cycle: Cycle::FIRST,
                        gate: Some(Gate::FIRST),
                        difficulty: Difficulty::Beginner,
                        questions: fallback_quiz(),
                        score: 0,
                        submitted: false,
                        created_at: Utc::now(),
                        submitted_at: None,
                    }),
                ])
                .expect("commit");
        }

        // Reopen and verify
        {
            let mut ledger = RedbLedger::open(&db_path).expect("open db");
            let puzzle = ledger.puzzle(&key(3, 1)).expect("read").expect("stored");
            assert!(puzzle.solved);
            assert!(puzzle.solved_at.is_some());

            let quiz = ledger.quiz(quiz_id).expect("read").expect("stored");
            assert_eq!(quiz.questions, fallback_quiz());
            assert_eq!(quiz.difficulty, Difficulty::Beginner);

            // Quiz ids keep counting after reopen
            assert_eq!(ledger.allocate_quiz_id().expect("id"), QuizId(quiz_id.0 + 1));
        }
    }

    #[test]
    fn cycle_quiz_and_persona_survive_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        // Whole seconds: records store millisecond timestamps.
        let stamp = chrono::DateTime::<Utc>::from_timestamp(1_700_000_000, 0).expect("timestamp");
        let quiz = CycleQuiz {
            user: UserId(4),
            cycle: Cycle::FIRST,
            questions: crate::content::fallback_cycle_quiz(),
            created_at: stamp,
        };
        let persona = Persona::new("Vega", crate::Avatar::default(), stamp).expect("persona");

        {
            let mut ledger = RedbLedger::open(&db_path).expect("open db");
            ledger
                .commit(vec![
                    LedgerWrite::InsertCycleQuiz(quiz.clone()),
                    LedgerWrite::PutPersona(UserId(4), persona.clone()),
                ])
                .expect("commit");

            let again = ledger.commit(vec![
                LedgerWrite::PutPersona(UserId(5), persona.clone()),
                LedgerWrite::InsertCycleQuiz(quiz.clone()),
            ]);
            assert!(matches!(again, Err(PulsarError::DuplicateCycleQuiz(..))));
            assert!(ledger.persona(UserId(5)).expect("read").is_none());
        }

        let ledger = RedbLedger::open(&db_path).expect("reopen");
        assert_eq!(
            ledger.cycle_quiz(UserId(4), Cycle::FIRST).expect("read"),
            Some(quiz)
        );
        assert_eq!(ledger.cycle_quizzes_for(UserId(4)).expect("read").len(), 1);
        assert!(ledger.cycle_quizzes_for(UserId(5)).expect("read").is_empty());
        assert_eq!(ledger.persona(UserId(4)).expect("read"), Some(persona));
    }
}
