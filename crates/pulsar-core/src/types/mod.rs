//! # Core Type Definitions
//!
//! This module contains all core types for the Pulsar gate progression engine:
//! - Identifiers (`UserId`, `QuizId`, `Cycle`, `Gate`, `PuzzleKey`)
//! - Puzzle content (`PuzzleSpec`, `PuzzleKind`, `HanoiPuzzle`)
//! - Quiz content (`Question`, `Difficulty`)
//! - Ledger records (`PuzzleAttempt`, `QuizAttempt`, `CycleQuiz`, `Persona`)
//! - Engine verdicts (`NextTarget`, `SolveOutcome`, `QuizOutcome`)
//! - Error types (`PulsarError`)
//!
//! ## Storage Compatibility
//!
//! Ledger records are postcard-encoded by the redb backend. Postcard is not
//! self-describing, so stored types avoid `untagged`, internally tagged enums,
//! `flatten` and `skip_serializing_if`. JSON shaping for the HTTP surface
//! happens in the app layer.

use crate::primitives::{
    GATE_COUNT, MAX_AVATAR_FIELD_LENGTH, MAX_PERSONA_NAME_LENGTH, OPTIONS_PER_QUESTION,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of an authenticated user.
///
/// Identity is owned by the external authentication service; the engine
/// only ever sees the resolved id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

/// Identifier of a quiz attempt. Allocated by the ledger, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuizId(pub u64);

/// A full run through all six gates. Cycles start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cycle(pub u32);

impl Cycle {
    /// The first cycle.
    pub const FIRST: Cycle = Cycle(1);

    /// Get the raw cycle number.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl Default for Cycle {
    fn default() -> Self {
        Self::FIRST
    }
}

/// One of the six sequential gates.
///
/// A `Gate` can only be constructed through [`Gate::new`] (or the
/// `TryFrom` impls), so every value in circulation is within `1..=6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Gate(u8);

impl Gate {
    /// Gate 1, where every cycle starts.
    pub const FIRST: Gate = Gate(1);

    /// Gate 6, the last gate of a cycle.
    pub const LAST: Gate = Gate(GATE_COUNT);

    /// Create a gate, rejecting numbers outside `1..=6`.
    pub fn new(number: u8) -> Result<Self, PulsarError> {
        if (1..=GATE_COUNT).contains(&number) {
            Ok(Self(number))
        } else {
            Err(PulsarError::InvalidInput(format!(
                "gate must be between 1 and {}, got {}",
                GATE_COUNT, number
            )))
        }
    }

    /// Get the gate number.
    #[must_use]
    pub const fn number(self) -> u8 {
        self.0
    }

    /// The gate after this one, or `None` for the last gate.
    #[must_use]
    pub fn next(self) -> Option<Gate> {
        if self.0 < GATE_COUNT {
            Some(Gate(self.0 + 1))
        } else {
            None
        }
    }

    /// Whether this is the final gate of a cycle.
    #[must_use]
    pub const fn is_last(self) -> bool {
        self.0 == GATE_COUNT
    }

    /// All gates in order.
    pub fn all() -> impl Iterator<Item = Gate> {
        (1..=GATE_COUNT).map(Gate)
    }
}

impl TryFrom<u8> for Gate {
    type Error = PulsarError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<i64> for Gate {
    type Error = PulsarError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| {
                PulsarError::InvalidInput(format!(
                    "gate must be between 1 and {}, got {}",
                    GATE_COUNT, value
                ))
            })
            .and_then(Self::new)
    }
}

impl From<Gate> for u8 {
    fn from(gate: Gate) -> Self {
        gate.0
    }
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GATE {}", self.0)
    }
}

/// Unique key of a puzzle attempt: at most one attempt per user, cycle and gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PuzzleKey {
    pub user: UserId,
    pub cycle: Cycle,
    pub gate: Gate,
}

impl PuzzleKey {
    #[must_use]
    pub const fn new(user: UserId, cycle: Cycle, gate: Gate) -> Self {
        Self { user, cycle, gate }
    }
}

// =============================================================================
// PUZZLES
// =============================================================================

/// Tower of Hanoi parameters for a single gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HanoiPuzzle {
    pub title: String,
    pub description: String,
    pub disks: u8,
    pub min_moves: u32,
    pub rods: u8,
}

impl HanoiPuzzle {
    /// Build the puzzle for a gate: gate `g` has `g + 1` disks.
    #[must_use]
    pub fn for_gate(gate: Gate) -> Self {
        let disks = gate.number() + 1;
        let min_moves = Self::minimum_moves(disks);
        Self {
            title: format!(
                "GATE {}: TOWER OF HANOI (L{})",
                gate.number(),
                gate.number()
            ),
            description: format!(
                "Move the stack to the last rod. {} disks. {} move minimum.",
                disks, min_moves
            ),
            disks,
            min_moves,
            rods: 3,
        }
    }

    /// Minimum number of moves for `disks` disks: `2^disks - 1`.
    #[must_use]
    pub const fn minimum_moves(disks: u8) -> u32 {
        (1u32 << disks) - 1
    }
}

/// The closed set of puzzle kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PuzzleKind {
    TowerOfHanoi,
    ManualVerification,
}

impl PuzzleKind {
    /// Wire name of the kind, as clients know it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TowerOfHanoi => "tower-of-hanoi",
            Self::ManualVerification => "manual_verification",
        }
    }
}

impl std::fmt::Display for PuzzleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Puzzle content: each kind carries its own payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PuzzleSpec {
    /// A generated Tower of Hanoi.
    TowerOfHanoi(HanoiPuzzle),
    /// Placeholder recorded when a solve arrives for a puzzle that was never
    /// requested. Carries no payload.
    ManualVerification,
}

impl PuzzleSpec {
    /// The kind discriminator of this puzzle.
    #[must_use]
    pub const fn kind(&self) -> PuzzleKind {
        match self {
            Self::TowerOfHanoi(_) => PuzzleKind::TowerOfHanoi,
            Self::ManualVerification => PuzzleKind::ManualVerification,
        }
    }
}

// =============================================================================
// QUIZZES
// =============================================================================

/// Quiz difficulty requested by the player.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl Difficulty {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "Beginner",
            Self::Intermediate => "Intermediate",
            Self::Advanced => "Advanced",
        }
    }
}

impl FromStr for Difficulty {
    type Err = PulsarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(PulsarError::InvalidInput(format!(
                "unknown difficulty '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A multiple-choice question.
///
/// Older generator paths emitted the answer index under `answer`; it is
/// accepted as an alias and always stored as `correct_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    #[serde(alias = "answer")]
    pub correct_index: u8,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl Question {
    /// Create a question without an explanation.
    #[must_use]
    pub fn new(question: impl Into<String>, options: [&str; 4], correct_index: u8) -> Self {
        Self {
            question: question.into(),
            options: options.iter().map(|o| (*o).to_string()).collect(),
            correct_index,
            explanation: None,
        }
    }

    /// Check that the question is answerable: non-empty text, exactly four
    /// options, and an answer index pointing at one of them.
    pub fn validate(&self) -> Result<(), PulsarError> {
        if self.question.trim().is_empty() {
            return Err(PulsarError::InvalidInput("empty question text".to_string()));
        }
        if self.options.len() != OPTIONS_PER_QUESTION {
            return Err(PulsarError::InvalidInput(format!(
                "expected {} options, got {}",
                OPTIONS_PER_QUESTION,
                self.options.len()
            )));
        }
        if usize::from(self.correct_index) >= self.options.len() {
            return Err(PulsarError::InvalidInput(format!(
                "correct_index {} out of range",
                self.correct_index
            )));
        }
        Ok(())
    }

    /// Whether a submitted answer matches this question's key.
    #[must_use]
    pub fn is_correct(&self, answer: i64) -> bool {
        i64::from(self.correct_index) == answer
    }
}

// =============================================================================
// LEDGER RECORDS
// =============================================================================

/// A puzzle attempt, unique per [`PuzzleKey`].
///
/// `solved` only ever moves from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleAttempt {
    pub key: PuzzleKey,
    pub puzzle: PuzzleSpec,
    pub solved: bool,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub solved_at: Option<DateTime<Utc>>,
}

impl PuzzleAttempt {
    /// Create an unsolved attempt.
    #[must_use]
    pub fn new(key: PuzzleKey, puzzle: PuzzleSpec) -> Self {
        Self {
            key,
            puzzle,
            solved: false,
            solved_at: None,
        }
    }

    /// Mark the attempt solved. The first solve time is kept.
    pub fn mark_solved(&mut self, now: DateTime<Utc>) {
        if !self.solved {
            self.solved = true;
            self.solved_at = Some(now);
        }
    }
}

/// A quiz attempt. A new one is created on every quiz start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: QuizId,
    pub user: UserId,
    pub cycle: Cycle,
    pub gate: Option<Gate>,
    pub difficulty: Difficulty,
    pub questions: Vec<Question>,
    pub score: u32,
    pub submitted: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl QuizAttempt {
    /// Highest achievable score for this attempt.
    #[must_use]
    pub fn max_score(&self) -> u32 {
        crate::primitives::POINTS_PER_CORRECT.saturating_mul(self.questions.len() as u32)
    }
}

/// The end-of-cycle quiz: one per user and cycle, created on first request
/// and reused afterwards. Questions carry explanations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleQuiz {
    pub user: UserId,
    pub cycle: Cycle,
    pub questions: Vec<Question>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Appearance choices of a persona. Free-form labels picked by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    pub style: String,
    pub gender: String,
}

/// The player's in-game persona. At most one per user; saving replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub avatar: Avatar,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Persona {
    /// Build a persona from client input, trimming every field.
    ///
    /// The name must be non-empty; all fields are length-bounded.
    pub fn new(name: &str, avatar: Avatar, now: DateTime<Utc>) -> Result<Self, PulsarError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PulsarError::InvalidInput("persona name is empty".to_string()));
        }
        if name.chars().count() > MAX_PERSONA_NAME_LENGTH {
            return Err(PulsarError::InvalidInput(format!(
                "persona name longer than {} characters",
                MAX_PERSONA_NAME_LENGTH
            )));
        }
        let avatar = Avatar {
            style: avatar.style.trim().to_string(),
            gender: avatar.gender.trim().to_string(),
        };
        for (field, value) in [("style", &avatar.style), ("gender", &avatar.gender)] {
            if value.chars().count() > MAX_AVATAR_FIELD_LENGTH {
                return Err(PulsarError::InvalidInput(format!(
                    "avatar {} longer than {} characters",
                    field, MAX_AVATAR_FIELD_LENGTH
                )));
            }
        }
        Ok(Self {
            name: name.to_string(),
            avatar,
            updated_at: now,
        })
    }
}

// =============================================================================
// ENGINE VERDICTS
// =============================================================================

/// Where the player should go next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextTarget {
    /// Quiz setup for a gate (next gate after a solve, or a retry).
    QuizSetup(Gate),
    /// The puzzle of a gate, after passing its quiz.
    Puzzle(Gate),
    /// Back to the dashboard: all six gates of the cycle are cleared.
    Dashboard,
}

impl NextTarget {
    /// Target after solving the puzzle of `gate`.
    #[must_use]
    pub fn after_puzzle(gate: Gate) -> Self {
        match gate.next() {
            Some(next) => Self::QuizSetup(next),
            None => Self::Dashboard,
        }
    }

    /// Target after a quiz on `gate` was scored.
    #[must_use]
    pub const fn after_quiz(gate: Gate, passed: bool) -> Self {
        if passed {
            Self::Puzzle(gate)
        } else {
            Self::QuizSetup(gate)
        }
    }

    /// Client navigation path for this target.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::QuizSetup(gate) => format!("quiz_setup.html?step={}", gate.number()),
            Self::Puzzle(gate) => format!("puzzle.html?step={}", gate.number()),
            Self::Dashboard => "game_dashboard.html".to_string(),
        }
    }

    /// The gate referenced by the target, if any.
    #[must_use]
    pub const fn gate(&self) -> Option<Gate> {
        match self {
            Self::QuizSetup(gate) | Self::Puzzle(gate) => Some(*gate),
            Self::Dashboard => None,
        }
    }
}

/// Result of solving a puzzle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveOutcome {
    pub advanced: bool,
    pub progression: crate::progression::ProgressionState,
    pub next_target: NextTarget,
}

/// Result of scoring a quiz submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizOutcome {
    pub quiz_id: QuizId,
    pub passed: bool,
    pub score: u32,
    pub max_score: u32,
    pub next_target: NextTarget,
}

/// Every ledger row owned by one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    pub puzzles: Vec<PuzzleAttempt>,
    pub quizzes: Vec<QuizAttempt>,
    pub cycle_quizzes: Vec<CycleQuiz>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Pulsar engine.
///
/// - No silent failures
/// - Use `Result<T, PulsarError>` for fallible operations
/// - `ContentGenerator` never leaves the engine; it is absorbed by fallbacks
#[derive(Debug, Error)]
pub enum PulsarError {
    /// The requested gate is beyond the player's current gate.
    #[error("Gate locked: requested gate {requested}, current gate {current}")]
    GateLocked { requested: u8, current: u8 },

    /// The referenced record is absent or owned by another user.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request values. Nothing was mutated.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The content generator failed (timeout, bad payload, disabled).
    #[error("Content generator failure: {0}")]
    ContentGenerator(String),

    /// A puzzle attempt already exists for the key.
    #[error("Puzzle attempt already exists: {0:?}")]
    DuplicatePuzzle(PuzzleKey),

    /// A cycle quiz already exists for the user and cycle.
    #[error("Cycle quiz already exists for user {0:?}, cycle {1:?}")]
    DuplicateCycleQuiz(UserId, Cycle),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O or storage error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_bounds() {
        assert!(Gate::new(0).is_err());
        assert!(Gate::new(7).is_err());
        assert_eq!(Gate::new(1).expect("gate").number(), 1);
        assert_eq!(Gate::new(6).expect("gate"), Gate::LAST);
        assert!(Gate::try_from(-1i64).is_err());
        assert!(Gate::try_from(300i64).is_err());
    }

    #[test]
    fn gate_next_stops_at_last() {
        assert_eq!(Gate::FIRST.next(), Gate::new(2).ok());
        assert_eq!(Gate::LAST.next(), None);
        assert_eq!(Gate::all().count(), 6);
    }

    #[test]
    fn gate_deserialization_validates() {
        let gate: Gate = serde_json::from_str("3").expect("valid gate");
        assert_eq!(gate.number(), 3);
        assert!(serde_json::from_str::<Gate>("9").is_err());
    }

    #[test]
    fn hanoi_scales_with_gate() {
        let first = HanoiPuzzle::for_gate(Gate::FIRST);
        assert_eq!(first.disks, 2);
        assert_eq!(first.min_moves, 3);
        assert_eq!(first.title, "GATE 1: TOWER OF HANOI (L1)");

        let last = HanoiPuzzle::for_gate(Gate::LAST);
        assert_eq!(last.disks, 7);
        assert_eq!(last.min_moves, 127);
    }

    #[test]
    fn question_accepts_legacy_answer_key() {
        let json = r#"{"question":"q","options":["a","b","c","d"],"answer":2}"#;
        let q: Question = serde_json::from_str(json).expect("legacy question");
        assert_eq!(q.correct_index, 2);
        assert!(q.explanation.is_none());
    }

    #[test]
    fn question_validation() {
        let good = Question::new("q", ["a", "b", "c", "d"], 3);
        assert!(good.validate().is_ok());

        let mut bad_index = good.clone();
        bad_index.correct_index = 4;
        assert!(bad_index.validate().is_err());

        let mut few_options = good;
        few_options.options.pop();
        assert!(few_options.validate().is_err());
    }

    #[test]
    fn difficulty_parses_case_insensitively() {
        assert_eq!(
            "beginner".parse::<Difficulty>().expect("parse"),
            Difficulty::Beginner
        );
        assert_eq!(
            " ADVANCED ".parse::<Difficulty>().expect("parse"),
            Difficulty::Advanced
        );
        assert!("expert".parse::<Difficulty>().is_err());
        assert_eq!(Difficulty::default(), Difficulty::Intermediate);
    }

    #[test]
    fn next_target_paths() {
        let g5 = Gate::new(5).expect("gate");
        assert_eq!(
            NextTarget::after_puzzle(g5),
            NextTarget::QuizSetup(Gate::LAST)
        );
        assert_eq!(NextTarget::after_puzzle(Gate::LAST), NextTarget::Dashboard);
        assert_eq!(
            NextTarget::after_quiz(g5, true).path(),
            "puzzle.html?step=5"
        );
        assert_eq!(
            NextTarget::after_quiz(g5, false).path(),
            "quiz_setup.html?step=5"
        );
        assert_eq!(NextTarget::Dashboard.path(), "game_dashboard.html");
    }

    #[test]
    fn persona_input_is_trimmed_and_bounded() {
        let now = Utc::now();
        let avatar = Avatar {
            style: " nebula ".to_string(),
            gender: "any".to_string(),
        };
        let persona = Persona::new("  Vega ", avatar.clone(), now).expect("persona");
        assert_eq!(persona.name, "Vega");
        assert_eq!(persona.avatar.style, "nebula");

        assert!(Persona::new("   ", avatar.clone(), now).is_err());
        assert!(Persona::new(&"x".repeat(65), avatar, now).is_err());

        let long_style = Avatar {
            style: "s".repeat(65),
            gender: String::new(),
        };
        assert!(Persona::new("Vega", long_style, now).is_err());
    }

    #[test]
    fn mark_solved_keeps_first_timestamp() {
        let key = PuzzleKey::new(UserId(1), Cycle::FIRST, Gate::FIRST);
        let mut attempt = PuzzleAttempt::new(key, PuzzleSpec::ManualVerification);
        let first = DateTime::<Utc>::from_timestamp(1_000, 0).expect("timestamp");
        let later = DateTime::<Utc>::from_timestamp(2_000, 0).expect("timestamp");

        attempt.mark_solved(first);
        attempt.mark_solved(later);

        assert!(attempt.solved);
        assert_eq!(attempt.solved_at, Some(first));
    }
}
