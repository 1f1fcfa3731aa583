//! # Content Generator Contract
//!
//! Puzzles, quiz questions and hints come from an injected
//! [`ContentGenerator`]. The engine treats it as a black box that either
//! returns complete content or fails; it never sees partial success.
//!
//! [`BuiltinGenerator`] is the deterministic implementation used when no
//! remote generator is configured, and in tests.
//!
//! [`ContentSource`] wraps a generator with the fallback policy. Its methods
//! never fail, so callers can run them without holding any ledger lock.

use crate::primitives::{FALLBACK_HINT, MAX_HINT_LENGTH, QUIZ_QUESTION_COUNT};
use crate::{Cycle, Difficulty, Gate, HanoiPuzzle, PuzzleKind, PuzzleSpec, PulsarError, Question};
use std::sync::Arc;

// =============================================================================
// CONTENT GENERATOR TRAIT
// =============================================================================

/// Source of puzzle, quiz and hint content.
///
/// Implementations must be stateless from the engine's point of view and
/// `Send + Sync` so one instance can be shared by every request.
/// Failures are reported as `PulsarError::ContentGenerator`.
pub trait ContentGenerator: Send + Sync {
    /// Puzzle for a gate. Difficulty must scale monotonically with `gate`.
    fn generate_puzzle(&self, gate: Gate, cycle: Cycle) -> Result<PuzzleSpec, PulsarError>;

    /// Exactly [`QUIZ_QUESTION_COUNT`] questions.
    fn generate_quiz(
        &self,
        difficulty: Difficulty,
        gate: Option<Gate>,
    ) -> Result<Vec<Question>, PulsarError>;

    /// Exactly [`QUIZ_QUESTION_COUNT`] explained questions closing a cycle.
    fn generate_cycle_quiz(&self, cycle: Cycle) -> Result<Vec<Question>, PulsarError>;

    /// A short hint for a puzzle.
    fn generate_hint(&self, gate: Gate, kind: PuzzleKind) -> Result<String, PulsarError>;
}

// =============================================================================
// BUILTIN GENERATOR
// =============================================================================

/// Deterministic content: Tower of Hanoi puzzles, the fallback question set,
/// and one canned hint per puzzle kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinGenerator;

impl BuiltinGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ContentGenerator for BuiltinGenerator {
    fn generate_puzzle(&self, gate: Gate, _cycle: Cycle) -> Result<PuzzleSpec, PulsarError> {
        Ok(PuzzleSpec::TowerOfHanoi(HanoiPuzzle::for_gate(gate)))
    }

    fn generate_quiz(
        &self,
        _difficulty: Difficulty,
        _gate: Option<Gate>,
    ) -> Result<Vec<Question>, PulsarError> {
        Ok(fallback_quiz())
    }

    fn generate_cycle_quiz(&self, _cycle: Cycle) -> Result<Vec<Question>, PulsarError> {
        Ok(fallback_cycle_quiz())
    }

    fn generate_hint(&self, _gate: Gate, kind: PuzzleKind) -> Result<String, PulsarError> {
        let hint = match kind {
            PuzzleKind::TowerOfHanoi => {
                "Free the largest disk first; the small ones will follow its path."
            }
            PuzzleKind::ManualVerification => "Trust what you already proved.",
        };
        Ok(hint.to_string())
    }
}

// =============================================================================
// FALLBACKS & VALIDATION
// =============================================================================

/// The fixed question set used whenever the generator fails.
#[must_use]
pub fn fallback_quiz() -> Vec<Question> {
    vec![
        Question::new(
            "Which of the following is a supervised learning algorithm?",
            ["K-Means", "Linear Regression", "PCA", "Apriori"],
            1,
        ),
        Question::new(
            "What does CNN stand for in Deep Learning?",
            [
                "Central Neural Network",
                "Convolutional Neural Network",
                "Computer Neural Node",
                "Cybernetic Network",
            ],
            1,
        ),
        Question::new(
            "Which library is primarily used for Deep Learning in Python?",
            ["Pandas", "NumPy", "TensorFlow", "Matplotlib"],
            2,
        ),
        Question::new(
            "What is the primary goal of Generative AI?",
            [
                "To classify data",
                "To generate new data instances",
                "To cluster data",
                "To reduce dimensions",
            ],
            1,
        ),
        Question::new(
            "In Python, which keyword is used to define a function?",
            ["func", "def", "definition", "function"],
            1,
        ),
    ]
}

fn explained(question: Question, explanation: &str) -> Question {
    Question {
        explanation: Some(explanation.to_string()),
        ..question
    }
}

/// The fixed end-of-cycle question set, one per topic of the rotation.
#[must_use]
pub fn fallback_cycle_quiz() -> Vec<Question> {
    vec![
        explained(
            Question::new(
                "What does LLM stand for?",
                [
                    "Large Logic Model",
                    "Large Language Model",
                    "Little Learn Machine",
                    "Long Logic Module",
                ],
                1,
            ),
            "LLM stands for Large Language Model.",
        ),
        explained(
            Question::new(
                "Which Python construct produces values lazily, one at a time?",
                ["A list", "A generator", "A tuple", "A dict"],
                1,
            ),
            "Generators yield values on demand instead of building them all up front.",
        ),
        explained(
            Question::new(
                "A model that scores well on training data but poorly on new data is...",
                ["Underfitting", "Overfitting", "Regularized", "Converged"],
                1,
            ),
            "Overfitting means the model memorized the training set instead of generalizing.",
        ),
        explained(
            Question::new(
                "Which algorithm computes gradients through a neural network?",
                ["Backpropagation", "K-Means", "Beam search", "Bagging"],
                0,
            ),
            "Backpropagation applies the chain rule layer by layer to get every gradient.",
        ),
        explained(
            Question::new(
                "A support bot must answer from private manuals. The usual approach is...",
                [
                    "Training a model from scratch",
                    "Retrieval-augmented generation",
                    "Raising the temperature",
                    "Removing the system prompt",
                ],
                1,
            ),
            "Retrieval-augmented generation feeds relevant manual passages to the model.",
        ),
    ]
}

/// Accept a generated question set only if it has exactly
/// [`QUIZ_QUESTION_COUNT`] valid questions.
pub fn validate_quiz(questions: &[Question]) -> Result<(), PulsarError> {
    if questions.len() != QUIZ_QUESTION_COUNT {
        return Err(PulsarError::ContentGenerator(format!(
            "expected {} questions, got {}",
            QUIZ_QUESTION_COUNT,
            questions.len()
        )));
    }
    for (i, q) in questions.iter().enumerate() {
        q.validate()
            .map_err(|e| PulsarError::ContentGenerator(format!("question {}: {}", i, e)))?;
    }
    Ok(())
}

/// Extract a question set from free-form model output.
///
/// Takes the span from the first `[` to the last `]`, parses it as a JSON
/// array, keeps the first five questions and validates them. Both
/// `correct_index` and the legacy `answer` key are accepted.
pub fn parse_quiz_reply(reply: &str) -> Result<Vec<Question>, PulsarError> {
    let (Some(start), Some(end)) = (reply.find('['), reply.rfind(']')) else {
        return Err(PulsarError::ContentGenerator(
            "no JSON array in reply".to_string(),
        ));
    };
    if end <= start {
        return Err(PulsarError::ContentGenerator(
            "no JSON array in reply".to_string(),
        ));
    }

    let mut questions: Vec<Question> = serde_json::from_str(&reply[start..=end])
        .map_err(|e| PulsarError::ContentGenerator(format!("malformed quiz JSON: {}", e)))?;
    questions.truncate(QUIZ_QUESTION_COUNT);
    validate_quiz(&questions)?;
    Ok(questions)
}

/// Trim a generated hint to one bounded line.
pub fn clean_hint(reply: &str) -> Result<String, PulsarError> {
    let line = reply.lines().map(str::trim).find(|l| !l.is_empty());
    match line {
        Some(l) => Ok(l.chars().take(MAX_HINT_LENGTH).collect()),
        None => Err(PulsarError::ContentGenerator("empty hint".to_string())),
    }
}

// =============================================================================
// CONTENT SOURCE
// =============================================================================

/// A generator plus the fallback policy.
///
/// Puzzles fall back to the builtin Tower of Hanoi, quizzes to the fixed
/// question sets, hints to [`FALLBACK_HINT`]. Failures are logged at `warn`
/// and never returned.
#[derive(Clone)]
pub struct ContentSource {
    generator: Arc<dyn ContentGenerator>,
}

impl std::fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentSource").finish_non_exhaustive()
    }
}

impl ContentSource {
    #[must_use]
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }

    /// Puzzle for `gate`, or the builtin puzzle if generation fails.
    #[must_use]
    pub fn puzzle(&self, gate: Gate, cycle: Cycle) -> PuzzleSpec {
        self.generator
            .generate_puzzle(gate, cycle)
            .unwrap_or_else(|e| {
                tracing::warn!(
                    gate = gate.number(),
                    error = %e,
                    "puzzle generation failed, using builtin puzzle"
                );
                PuzzleSpec::TowerOfHanoi(HanoiPuzzle::for_gate(gate))
            })
    }

    /// A validated question set, or [`fallback_quiz`].
    #[must_use]
    pub fn quiz(&self, difficulty: Difficulty, gate: Option<Gate>) -> Vec<Question> {
        self.generator
            .generate_quiz(difficulty, gate)
            .and_then(|q| validate_quiz(&q).map(|()| q))
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "quiz generation failed, using fallback set");
                fallback_quiz()
            })
    }

    /// A validated cycle question set, or [`fallback_cycle_quiz`].
    #[must_use]
    pub fn cycle_quiz(&self, cycle: Cycle) -> Vec<Question> {
        self.generator
            .generate_cycle_quiz(cycle)
            .and_then(|q| validate_quiz(&q).map(|()| q))
            .unwrap_or_else(|e| {
                tracing::warn!(
                    cycle = cycle.value(),
                    error = %e,
                    "cycle quiz generation failed, using fallback set"
                );
                fallback_cycle_quiz()
            })
    }

    /// A hint for a puzzle kind, or [`FALLBACK_HINT`].
    #[must_use]
    pub fn hint(&self, gate: Gate, kind: PuzzleKind) -> String {
        self.generator
            .generate_hint(gate, kind)
            .unwrap_or_else(|e| {
                tracing::warn!(gate = gate.number(), error = %e, "hint generation failed");
                FALLBACK_HINT.to_string()
            })
    }
}

// =============================================================================
// TESTS
// =============================================================================
