//! # API Endpoint Handlers
//!
//! Thin glue: parse the request, run engine operations on the blocking
//! pool, shape the response. Every rule lives in `pulsar-core`.
//!
//! Get-or-create handlers read a [`Slot`] under the read lock, generate with
//! no lock held, and record under the write lock.

use super::{
    AppState,
    error::ApiError,
    identity::Player,
    types::{
        AckResponse, CycleQuizResponse, GateRequest, HealthResponse, HintResponse,
        HistoryResponse, PersonaResponse, ProgressionResponse, PuzzleResponse, QuizResponse,
        RebootResponse, SavePersonaRequest, SolveResponse, StartQuizRequest, StartQuizResponse,
        SubmitQuizRequest, SubmitQuizResponse,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use pulsar_core::{Avatar, Difficulty, Gate, PulsarError, QuizId, Slot};

/// Parse an optional gate number from a request body.
fn optional_gate(raw: Option<i64>) -> Result<Option<Gate>, PulsarError> {
    raw.map(Gate::try_from).transpose()
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// PROGRESSION HANDLERS
// =============================================================================

/// Current gate and cycle, creating the pointer on first access.
pub async fn progression_handler(
    State(state): State<AppState>,
    Player(user): Player,
) -> Result<Json<ProgressionResponse>, ApiError> {
    let progression = state
        .with_engine(move |engine| engine.progression(user))
        .await?;
    Ok(Json(progression.into()))
}

/// Back to gate 1 of cycle 1.
pub async fn reset_handler(
    State(state): State<AppState>,
    Player(user): Player,
) -> Result<Json<AckResponse>, ApiError> {
    state
        .with_engine(move |engine| engine.reset_progress(user))
        .await?;
    Ok(Json(AckResponse::ok("Progress reset to Gate 1")))
}

// =============================================================================
// PUZZLE HANDLERS
// =============================================================================

/// Puzzle of a gate, generated on first request.
pub async fn puzzle_handler(
    State(state): State<AppState>,
    Player(user): Player,
    Path(gate): Path<i64>,
) -> Result<Json<PuzzleResponse>, ApiError> {
    let gate = Gate::try_from(gate)?;
    let slot = state
        .with_engine_ref(move |engine| engine.puzzle_slot(user, gate))
        .await?;
    let attempt = match slot {
        Slot::Stored(existing) => existing,
        Slot::Vacant(cycle) => {
            let puzzle = state
                .generate(move |content| content.puzzle(gate, cycle))
                .await?;
            state
                .with_engine(move |engine| engine.record_puzzle(user, gate, puzzle))
                .await?
        }
    };
    Ok(Json(PuzzleResponse::from(&attempt)))
}

/// Discard the stored puzzle so the next request regenerates it.
pub async fn reboot_handler(
    State(state): State<AppState>,
    Player(user): Player,
    Json(request): Json<GateRequest>,
) -> Result<Json<RebootResponse>, ApiError> {
    let gate = Gate::try_from(request.gate)?;
    let rebooted = state
        .with_engine(move |engine| engine.reboot_puzzle(user, gate))
        .await?;
    Ok(Json(RebootResponse {
        success: true,
        rebooted,
    }))
}

/// Record a solve.
pub async fn solve_handler(
    State(state): State<AppState>,
    Player(user): Player,
    Json(request): Json<GateRequest>,
) -> Result<Json<SolveResponse>, ApiError> {
    let gate = Gate::try_from(request.gate)?;
    let outcome = state
        .with_engine(move |engine| engine.solve_puzzle(user, gate))
        .await?;
    Ok(Json(outcome.into()))
}

/// Hint for the stored puzzle of a gate.
pub async fn hint_handler(
    State(state): State<AppState>,
    Player(user): Player,
    Json(request): Json<GateRequest>,
) -> Result<Json<HintResponse>, ApiError> {
    let gate = Gate::try_from(request.gate)?;
    let kind = state
        .with_engine_ref(move |engine| engine.hint_kind(user, gate))
        .await?;
    let hint = state
        .generate(move |content| content.hint(gate, kind))
        .await?;
    Ok(Json(HintResponse {
        success: true,
        hint,
    }))
}

// =============================================================================
// QUIZ HANDLERS
// =============================================================================

/// Start a new quiz attempt.
pub async fn start_quiz_handler(
    State(state): State<AppState>,
    Player(user): Player,
    Json(request): Json<StartQuizRequest>,
) -> Result<Json<StartQuizResponse>, ApiError> {
    let difficulty = match request.difficulty.as_deref() {
        Some(raw) => raw.parse::<Difficulty>()?,
        None => Difficulty::default(),
    };
    let gate = optional_gate(request.gate)?;

    let questions = state
        .generate(move |content| content.quiz(difficulty, gate))
        .await?;
    let quiz_id = state
        .with_engine(move |engine| engine.record_quiz(user, gate, difficulty, questions))
        .await?;
    Ok(Json(StartQuizResponse {
        success: true,
        quiz_id: quiz_id.0,
    }))
}

/// A quiz owned by the caller.
pub async fn quiz_handler(
    State(state): State<AppState>,
    Player(user): Player,
    Path(quiz_id): Path<u64>,
) -> Result<Json<QuizResponse>, ApiError> {
    let expose = state.expose_answer_keys;
    let quiz = state
        .with_engine_ref(move |engine| engine.quiz(user, QuizId(quiz_id)))
        .await?;
    Ok(Json(QuizResponse::from_attempt(&quiz, expose)))
}

/// Score a submission.
pub async fn submit_quiz_handler(
    State(state): State<AppState>,
    Player(user): Player,
    Json(request): Json<SubmitQuizRequest>,
) -> Result<Json<SubmitQuizResponse>, ApiError> {
    let gate = optional_gate(request.gate)?;
    let quiz_id = QuizId(request.quiz_id);
    let answers = request.answers;

    let outcome = state
        .with_engine(move |engine| engine.submit_quiz(user, quiz_id, &answers, gate))
        .await?;
    Ok(Json(outcome.into()))
}

/// The end-of-cycle quiz, created on first request once the cycle is
/// complete.
pub async fn cycle_quiz_handler(
    State(state): State<AppState>,
    Player(user): Player,
) -> Result<Json<CycleQuizResponse>, ApiError> {
    let slot = state
        .with_engine_ref(move |engine| engine.cycle_quiz_slot(user))
        .await?;
    let quiz = match slot {
        Slot::Stored(existing) => existing,
        Slot::Vacant(cycle) => {
            let questions = state
                .generate(move |content| content.cycle_quiz(cycle))
                .await?;
            state
                .with_engine(move |engine| engine.record_cycle_quiz(user, questions))
                .await?
        }
    };
    Ok(Json(CycleQuizResponse::from(&quiz)))
}

// =============================================================================
// PERSONA HANDLERS
// =============================================================================

/// The caller's persona, or `exists: false`.
pub async fn persona_handler(
    State(state): State<AppState>,
    Player(user): Player,
) -> Result<Json<PersonaResponse>, ApiError> {
    let persona = state
        .with_engine_ref(move |engine| engine.persona(user))
        .await?;
    Ok(Json(persona.into()))
}

/// Create or replace the caller's persona.
pub async fn save_persona_handler(
    State(state): State<AppState>,
    Player(user): Player,
    Json(request): Json<SavePersonaRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let avatar = Avatar {
        style: request.style,
        gender: request.gender,
    };
    let name = request.name;
    state
        .with_engine(move |engine| engine.save_persona(user, &name, avatar))
        .await?;
    Ok(Json(AckResponse::ok("Persona saved.")))
}

// =============================================================================
// HISTORY HANDLER
// =============================================================================

/// Every attempt of the caller.
pub async fn history_handler(
    State(state): State<AppState>,
    Player(user): Player,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = state
        .with_engine_ref(move |engine| engine.history(user))
        .await?;
    Ok(Json(history.into()))
}
