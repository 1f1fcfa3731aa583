//! # Innate Primitives
//!
//! Fixed game constants for the Pulsar engine.
//!
//! These are compiled into the binary and are immutable at runtime.
//! Pass/fail thresholds are fixed and do not scale with question count.

/// Number of sequential gates in one cycle.
pub const GATE_COUNT: u8 = 6;

/// Points awarded per correctly answered question.
pub const POINTS_PER_CORRECT: u32 = 10;

/// Minimum score needed to pass a quiz (3 of 5 correct).
pub const PASS_THRESHOLD: u32 = 30;

/// Number of questions in a quiz.
pub const QUIZ_QUESTION_COUNT: usize = 5;

/// Number of options per question.
pub const OPTIONS_PER_QUESTION: usize = 4;

/// Hint returned when the content generator cannot produce one.
pub const FALLBACK_HINT: &str = "I cannot assist with that right now.";

/// Maximum hint length (characters) accepted from a generator.
///
/// Longer replies are truncated rather than rejected.
pub const MAX_HINT_LENGTH: usize = 280;

/// Maximum persona name length (characters).
pub const MAX_PERSONA_NAME_LENGTH: usize = 64;

/// Maximum length of each avatar field (characters).
pub const MAX_AVATAR_FIELD_LENGTH: usize = 64;
