//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.
//!
//! Requests accept `step` as an alias of `gate` for older clients.

use pulsar_core::{
    CycleQuiz, Gate, GateStatus, NextTarget, Persona, ProgressionState, PuzzleAttempt, PuzzleSpec,
    Question, QuizAttempt, QuizOutcome, SolveOutcome,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// SHARED PIECES
// =============================================================================

/// Generic acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    pub message: String,
}

impl AckResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Error body for every non-2xx response produced by a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: msg.into(),
        }
    }
}

/// Navigation target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextTargetJson {
    /// `quiz_setup`, `puzzle` or `dashboard`.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gate: Option<u8>,
    pub path: String,
}

impl From<NextTarget> for NextTargetJson {
    fn from(target: NextTarget) -> Self {
        let kind = match target {
            NextTarget::QuizSetup(_) => "quiz_setup",
            NextTarget::Puzzle(_) => "puzzle",
            NextTarget::Dashboard => "dashboard",
        };
        Self {
            kind: kind.to_string(),
            gate: target.gate().map(Gate::number),
            path: target.path(),
        }
    }
}

/// Body carrying a single gate number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateRequest {
    #[serde(alias = "step")]
    pub gate: i64,
}

// =============================================================================
// PROGRESSION
// =============================================================================

/// One gate on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateJson {
    pub id: u8,
    pub label: String,
    pub status: GateStatus,
}

/// Progression pointer with the status of every gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionResponse {
    pub success: bool,
    pub current_gate: u8,
    pub current_cycle: u32,
    /// All six gates cleared; the cycle quiz is open.
    pub cycle_complete: bool,
    pub gates: Vec<GateJson>,
}

impl From<ProgressionState> for ProgressionResponse {
    fn from(state: ProgressionState) -> Self {
        Self {
            success: true,
            current_gate: state.current_gate.number(),
            current_cycle: state.current_cycle.value(),
            cycle_complete: state.cycle_complete,
            gates: state
                .gates()
                .into_iter()
                .map(|(gate, status)| GateJson {
                    id: gate.number(),
                    label: gate.to_string(),
                    status,
                })
                .collect(),
        }
    }
}

// =============================================================================
// PUZZLES
// =============================================================================

/// Puzzle of one gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PuzzleResponse {
    pub success: bool,
    pub step: u8,
    pub cycle: u32,
    pub puzzle_type: String,
    pub puzzle_data: serde_json::Value,
    pub solved: bool,
}

/// Kind-specific payload as a JSON object.
pub fn puzzle_data(spec: &PuzzleSpec) -> serde_json::Value {
    match spec {
        PuzzleSpec::TowerOfHanoi(hanoi) => serde_json::json!({
            "title": hanoi.title,
            "description": hanoi.description,
            "disks": hanoi.disks,
            "min_moves": hanoi.min_moves,
            "rods": hanoi.rods,
        }),
        PuzzleSpec::ManualVerification => serde_json::json!({}),
    }
}

impl From<&PuzzleAttempt> for PuzzleResponse {
    fn from(attempt: &PuzzleAttempt) -> Self {
        Self {
            success: true,
            step: attempt.key.gate.number(),
            cycle: attempt.key.cycle.value(),
            puzzle_type: attempt.puzzle.kind().as_str().to_string(),
            puzzle_data: puzzle_data(&attempt.puzzle),
            solved: attempt.solved,
        }
    }
}

/// Result of a solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveResponse {
    pub success: bool,
    pub advanced: bool,
    pub current_gate: u8,
    pub current_cycle: u32,
    pub cycle_complete: bool,
    pub next_target: NextTargetJson,
}

impl From<SolveOutcome> for SolveResponse {
    fn from(outcome: SolveOutcome) -> Self {
        Self {
            success: true,
            advanced: outcome.advanced,
            current_gate: outcome.progression.current_gate.number(),
            current_cycle: outcome.progression.current_cycle.value(),
            cycle_complete: outcome.progression.cycle_complete,
            next_target: outcome.next_target.into(),
        }
    }
}

/// Reboot acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebootResponse {
    pub success: bool,
    /// Whether a stored puzzle was discarded.
    pub rebooted: bool,
}

/// Hint for a puzzle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintResponse {
    pub success: bool,
    pub hint: String,
}

// =============================================================================
// QUIZZES
// =============================================================================

/// Quiz start request. Difficulty defaults to `Intermediate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartQuizRequest {
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default, alias = "step")]
    pub gate: Option<i64>,
}

/// Quiz start response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartQuizResponse {
    pub success: bool,
    pub quiz_id: u64,
}

/// One question as served to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionJson {
    pub question: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub correct_index: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub explanation: Option<String>,
}

impl QuestionJson {
    pub fn from_question(question: &Question, expose_answer_key: bool) -> Self {
        Self {
            question: question.question.clone(),
            options: question.options.clone(),
            correct_index: expose_answer_key.then_some(question.correct_index),
            explanation: question.explanation.clone(),
        }
    }
}

/// A stored quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizResponse {
    pub success: bool,
    pub quiz_id: u64,
    pub difficulty: String,
    #[serde(default)]
    pub gate: Option<u8>,
    pub submitted: bool,
    pub score: u32,
    pub questions: Vec<QuestionJson>,
}

impl QuizResponse {
    pub fn from_attempt(quiz: &QuizAttempt, expose_answer_keys: bool) -> Self {
        Self {
            success: true,
            quiz_id: quiz.id.0,
            difficulty: quiz.difficulty.to_string(),
            gate: quiz.gate.map(Gate::number),
            submitted: quiz.submitted,
            score: quiz.score,
            questions: quiz
                .questions
                .iter()
                .map(|q| QuestionJson::from_question(q, expose_answer_keys))
                .collect(),
        }
    }
}

/// The end-of-cycle quiz.
///
/// It is never submitted to the server, so answers and explanations are
/// always included for the client to grade locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleQuizResponse {
    pub success: bool,
    pub cycle: u32,
    pub questions: Vec<QuestionJson>,
}

impl From<&CycleQuiz> for CycleQuizResponse {
    fn from(quiz: &CycleQuiz) -> Self {
        Self {
            success: true,
            cycle: quiz.cycle.value(),
            questions: quiz
                .questions
                .iter()
                .map(|q| QuestionJson::from_question(q, true))
                .collect(),
        }
    }
}

/// Quiz submission.
///
/// Answers are raw option indices; out-of-range values simply score zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitQuizRequest {
    pub quiz_id: u64,
    #[serde(default)]
    pub answers: Vec<i64>,
    #[serde(default, alias = "step")]
    pub gate: Option<i64>,
}

/// Quiz verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitQuizResponse {
    pub success: bool,
    pub quiz_id: u64,
    pub passed: bool,
    pub score: u32,
    pub max_score: u32,
    pub next_target: NextTargetJson,
}

impl From<QuizOutcome> for SubmitQuizResponse {
    fn from(outcome: QuizOutcome) -> Self {
        Self {
            success: true,
            quiz_id: outcome.quiz_id.0,
            passed: outcome.passed,
            score: outcome.score,
            max_score: outcome.max_score,
            next_target: outcome.next_target.into(),
        }
    }
}

// =============================================================================
// PERSONA
// =============================================================================

/// Avatar choices as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarJson {
    pub style: String,
    pub gender: String,
}

/// The caller's persona. `name` and `avatar_data` are absent until saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaResponse {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub avatar_data: Option<AvatarJson>,
}

impl From<Option<Persona>> for PersonaResponse {
    fn from(persona: Option<Persona>) -> Self {
        match persona {
            Some(p) => Self {
                exists: true,
                name: Some(p.name),
                avatar_data: Some(AvatarJson {
                    style: p.avatar.style,
                    gender: p.avatar.gender,
                }),
            },
            None => Self {
                exists: false,
                name: None,
                avatar_data: None,
            },
        }
    }
}

/// Persona save request. Missing avatar fields are stored empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePersonaRequest {
    pub name: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub gender: String,
}

// =============================================================================
// HISTORY
// =============================================================================

/// Puzzle attempt summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PuzzleHistoryJson {
    pub cycle: u32,
    pub gate: u8,
    pub puzzle_type: String,
    pub solved: bool,
    #[serde(default)]
    pub solved_at: Option<String>,
}

/// Quiz attempt summary (questions omitted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizHistoryJson {
    pub quiz_id: u64,
    pub cycle: u32,
    #[serde(default)]
    pub gate: Option<u8>,
    pub difficulty: String,
    pub score: u32,
    pub max_score: u32,
    pub submitted: bool,
    pub created_at: String,
    #[serde(default)]
    pub submitted_at: Option<String>,
}

/// Cycle quiz summary (questions omitted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleQuizHistoryJson {
    pub cycle: u32,
    pub question_count: usize,
    pub created_at: String,
}

/// All attempts of the calling player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub puzzles: Vec<PuzzleHistoryJson>,
    pub quizzes: Vec<QuizHistoryJson>,
    #[serde(default)]
    pub cycle_quizzes: Vec<CycleQuizHistoryJson>,
}

impl From<pulsar_core::History> for HistoryResponse {
    fn from(history: pulsar_core::History) -> Self {
        Self {
            success: true,
            puzzles: history
                .puzzles
                .iter()
                .map(|p| PuzzleHistoryJson {
                    cycle: p.key.cycle.value(),
                    gate: p.key.gate.number(),
                    puzzle_type: p.puzzle.kind().as_str().to_string(),
                    solved: p.solved,
                    solved_at: p.solved_at.map(|t| t.to_rfc3339()),
                })
                .collect(),
            quizzes: history
                .quizzes
                .iter()
                .map(|q| QuizHistoryJson {
                    quiz_id: q.id.0,
                    cycle: q.cycle.value(),
                    gate: q.gate.map(Gate::number),
                    difficulty: q.difficulty.to_string(),
                    score: q.score,
                    max_score: q.max_score(),
                    submitted: q.submitted,
                    created_at: q.created_at.to_rfc3339(),
                    submitted_at: q.submitted_at.map(|t| t.to_rfc3339()),
                })
                .collect(),
            cycle_quizzes: history
                .cycle_quizzes
                .iter()
                .map(|q| CycleQuizHistoryJson {
                    cycle: q.cycle.value(),
                    question_count: q.questions.len(),
                    created_at: q.created_at.to_rfc3339(),
                })
                .collect(),
        }
    }
}
