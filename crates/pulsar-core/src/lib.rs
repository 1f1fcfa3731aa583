//! # pulsar-core
//!
//! The gate progression engine for Pulsar.
//!
//! A user walks through six gates, each made of a knowledge quiz followed by
//! a logic puzzle. Clearing the sixth gate completes the cycle and unlocks
//! the cycle quiz. This crate owns the progression rules, the attempt ledger
//! and the content generator contract.
//!
//! ## Architectural Constraints
//!
//! - Every decision (lock checks, scoring, advancement) lives here
//! - Content comes from an injected [`ContentGenerator`]; the engine never
//!   talks to the network itself
//! - Has NO async (pure Rust); callers serialize access per engine
//! - Each operation is one all-or-nothing ledger commit

// =============================================================================
// MODULES
// =============================================================================

pub mod content;
pub mod engine;
pub mod ledger;
pub mod primitives;
pub mod progression;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Avatar, Cycle, CycleQuiz, Difficulty, Gate, HanoiPuzzle, History, NextTarget, Persona,
    PulsarError, PuzzleAttempt, PuzzleKey, PuzzleKind, PuzzleSpec, Question, QuizAttempt, QuizId,
    QuizOutcome, SolveOutcome, UserId,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use content::{
    BuiltinGenerator, ContentGenerator, ContentSource, fallback_cycle_quiz, fallback_quiz,
    parse_quiz_reply,
};
pub use engine::{GateEngine, Slot, StorageBackend, is_passing, score_answers};
pub use ledger::{Ledger, LedgerStore, LedgerWrite};
pub use progression::{Advance, GateStatus, ProgressionState};
pub use storage::RedbLedger;
