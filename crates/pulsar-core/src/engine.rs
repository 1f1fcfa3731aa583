//! # Gate Progression Engine
//!
//! Combines a ledger backend with a [`ContentSource`] and applies the
//! progression rules.
//!
//! ## Storage Backends
//!
//! The engine supports two storage backends:
//! - `InMemory`: Uses the in-memory `Ledger` (fast, volatile)
//! - `Persistent`: Uses `RedbLedger` for disk-backed ACID storage
//!
//! ## Atomicity
//!
//! Each operation reads what it needs, decides, and then commits a single
//! batch of ledger writes. A refusal (`GateLocked`, `NotFound`,
//! `InvalidInput`) commits nothing.
//!
//! ## Generated content
//!
//! Get-or-create content is split in three steps so generation never runs
//! while the engine is borrowed mutably:
//!
//! 1. `*_slot` (`&self`) checks the lock and returns the stored row or
//!    [`Slot::Vacant`] with the cycle to generate for.
//! 2. The caller asks [`GateEngine::content`] for content, holding no lock.
//! 3. `record_*` (`&mut self`) re-checks the lock and inserts. If another
//!    request inserted first, the stored row wins and is returned.
//!
//! The one-call forms (`request_puzzle`, `start_quiz`, `cycle_quiz`,
//! `puzzle_hint`) chain the steps for callers that own the engine.

use crate::content::{ContentGenerator, ContentSource, validate_quiz};
use crate::ledger::{Ledger, LedgerStore, LedgerWrite};
use crate::primitives::{PASS_THRESHOLD, POINTS_PER_CORRECT};
use crate::progression::ProgressionState;
use crate::storage::RedbLedger;
use crate::{
    Avatar, Cycle, CycleQuiz, Difficulty, Gate, History, NextTarget, Persona, PulsarError,
    PuzzleAttempt, PuzzleKey, PuzzleKind, PuzzleSpec, Question, QuizAttempt, QuizId, QuizOutcome,
    SolveOutcome, UserId,
};
use chrono::{DateTime, SubsecRound, Utc};
use std::path::Path;
use std::sync::Arc;

/// Storage backend for the engine.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory ledger (fast, volatile).
    InMemory(Ledger),
    /// Disk-backed ledger using redb (ACID, persistent).
    Persistent(RedbLedger),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(Ledger::new())
    }
}

impl StorageBackend {
    fn store(&self) -> &dyn LedgerStore {
        match self {
            Self::InMemory(ledger) => ledger,
            Self::Persistent(redb) => redb,
        }
    }

    fn store_mut(&mut self) -> &mut dyn LedgerStore {
        match self {
            Self::InMemory(ledger) => ledger,
            Self::Persistent(redb) => redb,
        }
    }
}

/// Lookup result for get-or-create content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot<T> {
    /// Already stored.
    Stored(T),
    /// Nothing stored yet; generate for this cycle, then record.
    Vacant(Cycle),
}

/// Score answers against a question set.
///
/// Each matching answer is worth [`POINTS_PER_CORRECT`]. Missing answers
/// count as wrong; answers beyond the question count are rejected.
pub fn score_answers(questions: &[Question], answers: &[i64]) -> Result<u32, PulsarError> {
    if answers.len() > questions.len() {
        return Err(PulsarError::InvalidInput(format!(
            "{} answers for {} questions",
            answers.len(),
            questions.len()
        )));
    }
    let correct = questions
        .iter()
        .zip(answers)
        .filter(|(q, a)| q.is_correct(**a))
        .count() as u32;
    Ok(correct.saturating_mul(POINTS_PER_CORRECT))
}

/// Whether a score passes. Independent of the question count.
#[must_use]
pub const fn is_passing(score: u32) -> bool {
    score >= PASS_THRESHOLD
}

/// Current time at the millisecond precision the ledger stores.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Question sets handed to `record_*` must already be complete.
fn check_questions(questions: &[Question]) -> Result<(), PulsarError> {
    validate_quiz(questions).map_err(|e| PulsarError::InvalidInput(e.to_string()))
}

/// The gate progression engine.
pub struct GateEngine {
    /// The storage backend (in-memory or persistent).
    backend: StorageBackend,
    /// Injected content with fallbacks applied.
    content: ContentSource,
}

impl std::fmt::Debug for GateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateEngine")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl GateEngine {
    /// Create an engine with in-memory storage.
    #[must_use]
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self::with_backend(StorageBackend::default(), generator)
    }

    /// Create an engine with persistent redb storage at `path`.
    pub fn with_redb(
        path: impl AsRef<Path>,
        generator: Arc<dyn ContentGenerator>,
    ) -> Result<Self, PulsarError> {
        let redb = RedbLedger::open(path)?;
        Ok(Self::with_backend(StorageBackend::Persistent(redb), generator))
    }

    /// Create an engine over an existing backend.
    #[must_use]
    pub fn with_backend(backend: StorageBackend, generator: Arc<dyn ContentGenerator>) -> Self {
        Self {
            backend,
            content: ContentSource::new(generator),
        }
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// Get a reference to the storage backend.
    #[must_use]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    /// The content source. Cloning it is cheap and detaches it from the
    /// engine, so generation can run without access to the ledger.
    #[must_use]
    pub fn content(&self) -> &ContentSource {
        &self.content
    }

    // =========================================================================
    // PROGRESSION
    // =========================================================================

    /// Stored pointer, or a fresh default plus a flag saying it must be
    /// persisted with the operation's batch.
    fn load_progression(&self, user: UserId) -> Result<(ProgressionState, bool), PulsarError> {
        match self.backend.store().progression(user)? {
            Some(state) => Ok((state, false)),
            None => Ok((ProgressionState::new(), true)),
        }
    }

    fn commit(&mut self, batch: Vec<LedgerWrite>) -> Result<(), PulsarError> {
        self.backend.store_mut().commit(batch)
    }

    /// Read a user's progression, creating it on first access.
    pub fn progression(&mut self, user: UserId) -> Result<ProgressionState, PulsarError> {
        let (state, created) = self.load_progression(user)?;
        if created {
            self.commit(vec![LedgerWrite::PutProgression(user, state)])?;
            tracing::debug!(user = user.0, "progression created");
        }
        Ok(state)
    }

    /// Put the user back on gate 1 of cycle 1. Attempt history is kept.
    pub fn reset_progress(&mut self, user: UserId) -> Result<ProgressionState, PulsarError> {
        let state = ProgressionState::new();
        self.commit(vec![LedgerWrite::PutProgression(user, state)])?;
        tracing::info!(user = user.0, "progress reset");
        Ok(state)
    }

    // =========================================================================
    // PUZZLES
    // =========================================================================

    /// Look up the current cycle's puzzle for `gate`.
    pub fn puzzle_slot(&self, user: UserId, gate: Gate) -> Result<Slot<PuzzleAttempt>, PulsarError> {
        let (state, _) = self.load_progression(user)?;
        state.ensure_unlocked(gate)?;

        let key = PuzzleKey::new(user, state.current_cycle, gate);
        Ok(match self.backend.store().puzzle(&key)? {
            Some(existing) => Slot::Stored(existing),
            None => Slot::Vacant(state.current_cycle),
        })
    }

    /// Store a generated puzzle for `gate`, unless one was stored meanwhile,
    /// in which case the stored one is returned.
    pub fn record_puzzle(
        &mut self,
        user: UserId,
        gate: Gate,
        puzzle: PuzzleSpec,
    ) -> Result<PuzzleAttempt, PulsarError> {
        let (state, created) = self.load_progression(user)?;
        state.ensure_unlocked(gate)?;

        let attempt = PuzzleAttempt::new(PuzzleKey::new(user, state.current_cycle, gate), puzzle);
        let mut batch = Vec::with_capacity(2);
        if created {
            batch.push(LedgerWrite::PutProgression(user, state));
        }
        batch.push(LedgerWrite::InsertPuzzle(attempt.clone()));

        match self.commit(batch) {
            Ok(()) => {
                tracing::info!(
                    user = user.0,
                    gate = gate.number(),
                    cycle = state.current_cycle.value(),
                    kind = %attempt.puzzle.kind(),
                    "puzzle generated"
                );
                Ok(attempt)
            }
            Err(PulsarError::DuplicatePuzzle(key)) => {
                tracing::debug!(user = user.0, gate = gate.number(), "puzzle already stored");
                self.backend.store().puzzle(&key)?.ok_or_else(|| {
                    PulsarError::NotFound(format!("puzzle for gate {}", gate.number()))
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Get the puzzle for `gate` in the current cycle, generating it on first
    /// request. Repeated calls return the same puzzle until it is rebooted.
    pub fn request_puzzle(
        &mut self,
        user: UserId,
        gate: Gate,
    ) -> Result<PuzzleAttempt, PulsarError> {
        match self.puzzle_slot(user, gate)? {
            Slot::Stored(existing) => Ok(existing),
            Slot::Vacant(cycle) => {
                let puzzle = self.content.puzzle(gate, cycle);
                self.record_puzzle(user, gate, puzzle)
            }
        }
    }

    /// Discard the current cycle's puzzle for `gate` so the next request
    /// generates a fresh one. Returns whether an attempt was removed.
    pub fn reboot_puzzle(&mut self, user: UserId, gate: Gate) -> Result<bool, PulsarError> {
        let (state, _) = self.load_progression(user)?;
        let key = PuzzleKey::new(user, state.current_cycle, gate);
        if self.backend.store().puzzle(&key)?.is_none() {
            return Ok(false);
        }
        self.commit(vec![LedgerWrite::DeletePuzzle(key)])?;
        tracing::info!(user = user.0, gate = gate.number(), "puzzle rebooted");
        Ok(true)
    }

    /// Record a solve of `gate` and advance the pointer if `gate` is the
    /// current gate.
    pub fn solve_puzzle(&mut self, user: UserId, gate: Gate) -> Result<SolveOutcome, PulsarError> {
        let (mut state, created) = self.load_progression(user)?;
        let key = PuzzleKey::new(user, state.current_cycle, gate);

        let mut attempt = self
            .backend
            .store()
            .puzzle(&key)?
            .unwrap_or_else(|| PuzzleAttempt::new(key, PuzzleSpec::ManualVerification));
        attempt.mark_solved(now());

        let advance = state.advance(gate);

        let mut batch = vec![LedgerWrite::PutPuzzle(attempt)];
        if advance.moved() || created {
            batch.push(LedgerWrite::PutProgression(user, state));
        }
        self.commit(batch)?;

        if advance.moved() {
            tracing::info!(
                user = user.0,
                solved = gate.number(),
                gate = state.current_gate.number(),
                cycle_complete = state.cycle_complete,
                "gate advanced"
            );
        } else {
            tracing::debug!(
                user = user.0,
                solved = gate.number(),
                gate = state.current_gate.number(),
                "solve recorded without advancing"
            );
        }

        Ok(SolveOutcome {
            advanced: advance.moved(),
            progression: state,
            next_target: NextTarget::after_puzzle(gate),
        })
    }

    /// Kind of the stored puzzle of `gate`, or the default kind if none is
    /// stored yet. Refuses locked gates.
    pub fn hint_kind(&self, user: UserId, gate: Gate) -> Result<PuzzleKind, PulsarError> {
        let (state, _) = self.load_progression(user)?;
        state.ensure_unlocked(gate)?;

        let key = PuzzleKey::new(user, state.current_cycle, gate);
        Ok(self
            .backend
            .store()
            .puzzle(&key)?
            .map(|p| p.puzzle.kind())
            .unwrap_or(PuzzleKind::TowerOfHanoi))
    }

    /// A hint on the stored puzzle of `gate`.
    pub fn puzzle_hint(&self, user: UserId, gate: Gate) -> Result<String, PulsarError> {
        let kind = self.hint_kind(user, gate)?;
        Ok(self.content.hint(gate, kind))
    }

    // =========================================================================
    // QUIZZES
    // =========================================================================

    /// Store a new quiz attempt over `questions`. Always creates a new record.
    pub fn record_quiz(
        &mut self,
        user: UserId,
        gate: Option<Gate>,
        difficulty: Difficulty,
        questions: Vec<Question>,
    ) -> Result<QuizId, PulsarError> {
        check_questions(&questions)?;
        let (state, created) = self.load_progression(user)?;

        let id = self.backend.store_mut().allocate_quiz_id()?;
        let quiz = QuizAttempt {
            id,
            user,
            cycle: state.current_cycle,
            gate,
            difficulty,
            questions,
            score: 0,
            submitted: false,
            created_at: now(),
            submitted_at: None,
        };

        let mut batch = Vec::with_capacity(2);
        if created {
            batch.push(LedgerWrite::PutProgression(user, state));
        }
        batch.push(LedgerWrite::PutQuiz(quiz));
        self.commit(batch)?;

        tracing::info!(
            user = user.0,
            quiz_id = id.0,
            gate = gate.map(Gate::number),
            difficulty = %difficulty,
            "quiz started"
        );
        Ok(id)
    }

    /// Generate and store a new quiz attempt.
    pub fn start_quiz(
        &mut self,
        user: UserId,
        gate: Option<Gate>,
        difficulty: Difficulty,
    ) -> Result<QuizId, PulsarError> {
        let questions = self.content.quiz(difficulty, gate);
        self.record_quiz(user, gate, difficulty, questions)
    }

    /// Fetch a quiz owned by `user`.
    pub fn quiz(&self, user: UserId, id: QuizId) -> Result<QuizAttempt, PulsarError> {
        self.backend
            .store()
            .quiz(id)?
            .filter(|q| q.user == user)
            .ok_or_else(|| PulsarError::NotFound(format!("quiz {}", id.0)))
    }

    /// Score a submission and decide where to go next.
    ///
    /// The stored score is overwritten on every submission. The target gate
    /// is `gate` if given, otherwise the user's current gate.
    pub fn submit_quiz(
        &mut self,
        user: UserId,
        id: QuizId,
        answers: &[i64],
        gate: Option<Gate>,
    ) -> Result<QuizOutcome, PulsarError> {
        let mut quiz = self.quiz(user, id)?;
        let score = score_answers(&quiz.questions, answers)?;
        let passed = is_passing(score);

        let (state, created) = self.load_progression(user)?;
        let target_gate = gate.unwrap_or(state.current_gate);

        quiz.score = score;
        quiz.submitted = true;
        quiz.submitted_at = Some(now());
        let max_score = quiz.max_score();

        let mut batch = vec![LedgerWrite::PutQuiz(quiz)];
        if created {
            batch.push(LedgerWrite::PutProgression(user, state));
        }
        self.commit(batch)?;

        tracing::info!(
            user = user.0,
            quiz_id = id.0,
            score,
            passed,
            gate = target_gate.number(),
            "quiz scored"
        );

        Ok(QuizOutcome {
            quiz_id: id,
            passed,
            score,
            max_score,
            next_target: NextTarget::after_quiz(target_gate, passed),
        })
    }

    // =========================================================================
    // CYCLE QUIZ
    // =========================================================================

    /// Look up the cycle quiz. Refused until all six gates are cleared.
    pub fn cycle_quiz_slot(&self, user: UserId) -> Result<Slot<CycleQuiz>, PulsarError> {
        let (state, _) = self.load_progression(user)?;
        state.ensure_cycle_complete()?;

        Ok(
            match self.backend.store().cycle_quiz(user, state.current_cycle)? {
                Some(existing) => Slot::Stored(existing),
                None => Slot::Vacant(state.current_cycle),
            },
        )
    }

    /// Store the generated cycle quiz, unless one was stored meanwhile, in
    /// which case the stored one is returned.
    pub fn record_cycle_quiz(
        &mut self,
        user: UserId,
        questions: Vec<Question>,
    ) -> Result<CycleQuiz, PulsarError> {
        check_questions(&questions)?;
        let (state, _) = self.load_progression(user)?;
        state.ensure_cycle_complete()?;

        let quiz = CycleQuiz {
            user,
            cycle: state.current_cycle,
            questions,
            created_at: now(),
        };
        match self.commit(vec![LedgerWrite::InsertCycleQuiz(quiz.clone())]) {
            Ok(()) => {
                tracing::info!(
                    user = user.0,
                    cycle = state.current_cycle.value(),
                    "cycle quiz created"
                );
                Ok(quiz)
            }
            Err(PulsarError::DuplicateCycleQuiz(owner, cycle)) => {
                self.backend
                    .store()
                    .cycle_quiz(owner, cycle)?
                    .ok_or_else(|| PulsarError::NotFound(format!("cycle quiz {}", cycle.value())))
            }
            Err(e) => Err(e),
        }
    }

    /// The end-of-cycle quiz, created on first request and reused after.
    pub fn cycle_quiz(&mut self, user: UserId) -> Result<CycleQuiz, PulsarError> {
        match self.cycle_quiz_slot(user)? {
            Slot::Stored(existing) => Ok(existing),
            Slot::Vacant(cycle) => {
                let questions = self.content.cycle_quiz(cycle);
                self.record_cycle_quiz(user, questions)
            }
        }
    }

    // =========================================================================
    // PERSONA
    // =========================================================================

    /// The user's persona, if saved.
    pub fn persona(&self, user: UserId) -> Result<Option<Persona>, PulsarError> {
        self.backend.store().persona(user)
    }

    /// Create or replace the user's persona.
    pub fn save_persona(
        &mut self,
        user: UserId,
        name: &str,
        avatar: Avatar,
    ) -> Result<Persona, PulsarError> {
        let persona = Persona::new(name, avatar, now())?;
        self.commit(vec![LedgerWrite::PutPersona(user, persona.clone())])?;
        tracing::info!(user = user.0, "persona saved");
        Ok(persona)
    }

    // =========================================================================
    // HISTORY
    // =========================================================================

    /// All attempts owned by `user`.
    pub fn history(&self, user: UserId) -> Result<History, PulsarError> {
        let store = self.backend.store();
        Ok(History {
            puzzles: store.puzzles_for(user)?,
            quizzes: store.quizzes_for(user)?,
            cycle_quizzes: store.cycle_quizzes_for(user)?,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
