//! # Progression Scenarios
//!
//! End-to-end walks through the six gates on both storage backends.

use pulsar_core::{
    Avatar, BuiltinGenerator, ContentGenerator, Cycle, Difficulty, Gate, GateEngine, HanoiPuzzle,
    NextTarget, ProgressionState, PulsarError, PuzzleKind, PuzzleSpec, Question, QuizId, UserId,
    fallback_cycle_quiz, fallback_quiz,
};
use std::sync::Arc;
use tempfile::TempDir;

fn gate(n: u8) -> Gate {
    Gate::new(n).expect("valid gate")
}

fn builtin() -> Arc<dyn ContentGenerator> {
    Arc::new(BuiltinGenerator::new())
}

fn answer_key(engine: &GateEngine, user: UserId, id: QuizId) -> Vec<i64> {
    engine
        .quiz(user, id)
        .expect("quiz")
        .questions
        .iter()
        .map(|q| i64::from(q.correct_index))
        .collect()
}

/// Pass the quiz and solve the puzzle of `n`, checking every verdict.
fn clear_gate(engine: &mut GateEngine, user: UserId, n: u8) {
    let id = engine
        .start_quiz(user, Some(gate(n)), Difficulty::Beginner)
        .expect("start quiz");
    let answers = answer_key(engine, user, id);
    let verdict = engine
        .submit_quiz(user, id, &answers, Some(gate(n)))
        .expect("submit");
    assert!(verdict.passed);
    assert_eq!(verdict.next_target, NextTarget::Puzzle(gate(n)));

    engine.request_puzzle(user, gate(n)).expect("puzzle");
    let outcome = engine.solve_puzzle(user, gate(n)).expect("solve");
    assert!(outcome.advanced);
}

fn walk_all_gates(engine: &mut GateEngine) {
    let user = UserId(42);
    for n in 1..=5 {
        clear_gate(engine, user, n);
        let state = engine.progression(user).expect("state");
        assert_eq!(state.current_gate, gate(n + 1));
        assert_eq!(state.current_cycle, Cycle::FIRST);
    }

    let id = engine
        .start_quiz(user, Some(gate(6)), Difficulty::Advanced)
        .expect("start quiz");
    let answers = answer_key(engine, user, id);
    engine
        .submit_quiz(user, id, &answers, Some(gate(6)))
        .expect("submit");
    engine.request_puzzle(user, gate(6)).expect("puzzle");
    let last = engine.solve_puzzle(user, gate(6)).expect("solve");

    assert_eq!(last.next_target, NextTarget::Dashboard);
    assert_eq!(last.next_target.path(), "game_dashboard.html");
    assert_eq!(last.progression.current_gate, Gate::LAST);
    assert_eq!(last.progression.current_cycle, Cycle::FIRST);
    assert!(last.progression.cycle_complete);

    // Replaying the last gate after completion changes nothing.
    let replay = engine.solve_puzzle(user, gate(6)).expect("replay");
    assert!(!replay.advanced);
    assert_eq!(replay.progression, last.progression);

    let oracle = engine.cycle_quiz(user).expect("cycle quiz");
    assert_eq!(oracle.cycle, Cycle::FIRST);
    assert_eq!(oracle.questions.len(), 5);
    assert_eq!(engine.cycle_quiz(user).expect("cycle quiz"), oracle);

    let history = engine.history(user).expect("history");
    assert_eq!(history.puzzles.len(), 6);
    assert!(history.puzzles.iter().all(|p| p.solved && p.solved_at.is_some()));
    assert_eq!(history.quizzes.len(), 6);
    assert!(history.quizzes.iter().all(|q| q.submitted && q.score == 50));
    assert_eq!(history.cycle_quizzes, vec![oracle]);
}

// =============================================================================
// FULL WALK
// =============================================================================

#[test]
fn full_walk_in_memory() {
    let mut engine = GateEngine::new(builtin());
    walk_all_gates(&mut engine);
}

#[test]
fn full_walk_on_redb() {
    let dir = TempDir::new().expect("temp dir");
    let mut engine = GateEngine::with_redb(dir.path().join("pulsar.redb"), builtin()).expect("open");
    assert!(engine.is_persistent());
    walk_all_gates(&mut engine);
}

// =============================================================================
// QUIZ VERDICTS
// =============================================================================

#[test]
fn two_correct_answers_fail_and_retry_same_gate() {
    let mut engine = GateEngine::new(builtin());
    let user = UserId(1);

    let id = engine
        .start_quiz(user, Some(gate(1)), Difficulty::Intermediate)
        .expect("start");
    let mut answers = answer_key(&engine, user, id);
    answers.truncate(2);

    let verdict = engine
        .submit_quiz(user, id, &answers, Some(gate(1)))
        .expect("submit");
    assert_eq!(verdict.score, 20);
    assert!(!verdict.passed);
    assert_eq!(verdict.next_target, NextTarget::QuizSetup(gate(1)));
    assert_eq!(verdict.next_target.path(), "quiz_setup.html?step=1");

    // Failing never touches the pointer.
    assert_eq!(
        engine.progression(user).expect("state"),
        ProgressionState::new()
    );
}

#[test]
fn resubmission_overwrites_score() {
    let mut engine = GateEngine::new(builtin());
    let user = UserId(1);
    let id = engine
        .start_quiz(user, None, Difficulty::default())
        .expect("start");
    let answers = answer_key(&engine, user, id);

    engine.submit_quiz(user, id, &answers, None).expect("first");
    let second = engine.submit_quiz(user, id, &[], None).expect("second");

    assert_eq!(second.score, 0);
    assert_eq!(engine.quiz(user, id).expect("quiz").score, 0);
}

#[test]
fn out_of_range_answers_are_wrong_not_errors() {
    let mut engine = GateEngine::new(builtin());
    let user = UserId(1);
    let id = engine
        .start_quiz(user, None, Difficulty::default())
        .expect("start");

    let verdict = engine
        .submit_quiz(user, id, &[-1, 9, 4, 100, -50], None)
        .expect("submit");
    assert_eq!(verdict.score, 0);
}

// =============================================================================
// LOCKS AND RESET
// =============================================================================

#[test]
fn locked_gates_are_refused() {
    let mut engine = GateEngine::new(builtin());
    let user = UserId(1);
    clear_gate(&mut engine, user, 1);

    for n in 3..=6 {
        let result = engine.request_puzzle(user, gate(n));
        assert!(
            matches!(result, Err(PulsarError::GateLocked { current: 2, .. })),
            "gate {n} should be locked"
        );
    }
    // Earlier gates stay open for replay.
    assert!(engine.request_puzzle(user, gate(1)).is_ok());
}

#[test]
fn reset_after_gate_four_returns_to_start() {
    let mut engine = GateEngine::new(builtin());
    let user = UserId(9);
    for n in 1..=3 {
        clear_gate(&mut engine, user, n);
    }
    assert_eq!(
        engine.progression(user).expect("state").current_gate,
        gate(4)
    );

    let state = engine.reset_progress(user).expect("reset");
    assert_eq!(state.current_gate, Gate::FIRST);
    assert_eq!(state.current_cycle, Cycle::FIRST);
    assert!(matches!(
        engine.request_puzzle(user, gate(2)),
        Err(PulsarError::GateLocked { .. })
    ));

    let history = engine.history(user).expect("history");
    assert_eq!(history.puzzles.len(), 3);
    assert_eq!(history.quizzes.len(), 3);
}

#[test]
fn reset_after_completion_relocks_cycle_quiz() {
    let mut engine = GateEngine::new(builtin());
    let user = UserId(4);
    for n in 1..=6 {
        engine.solve_puzzle(user, gate(n)).expect("solve");
    }
    let oracle = engine.cycle_quiz(user).expect("cycle quiz");

    let state = engine.reset_progress(user).expect("reset");
    assert!(!state.cycle_complete);
    assert!(matches!(
        engine.cycle_quiz(user),
        Err(PulsarError::GateLocked { requested: 7, current: 1 })
    ));

    // History keeps the earlier quiz; completing again serves the same one.
    for n in 1..=6 {
        engine.solve_puzzle(user, gate(n)).expect("solve");
    }
    assert_eq!(engine.cycle_quiz(user).expect("cycle quiz"), oracle);
}

#[test]
fn users_are_isolated() {
    let mut engine = GateEngine::new(builtin());
    clear_gate(&mut engine, UserId(1), 1);

    assert_eq!(
        engine.progression(UserId(2)).expect("state"),
        ProgressionState::new()
    );
    assert!(engine.history(UserId(2)).expect("history").puzzles.is_empty());
}

// =============================================================================
// GENERATOR FALLBACKS
// =============================================================================

struct OfflineGenerator;

impl ContentGenerator for OfflineGenerator {
    fn generate_puzzle(&self, _gate: Gate, _cycle: Cycle) -> Result<PuzzleSpec, PulsarError> {
        Err(PulsarError::ContentGenerator("timeout".to_string()))
    }

    fn generate_quiz(
        &self,
        _difficulty: Difficulty,
        _gate: Option<Gate>,
    ) -> Result<Vec<Question>, PulsarError> {
        Err(PulsarError::ContentGenerator("timeout".to_string()))
    }

    fn generate_hint(&self, _gate: Gate, _kind: PuzzleKind) -> Result<String, PulsarError> {
        Err(PulsarError::ContentGenerator("timeout".to_string()))
    }

    fn generate_cycle_quiz(&self, _cycle: Cycle) -> Result<Vec<Question>, PulsarError> {
        Err(PulsarError::ContentGenerator("timeout".to_string()))
    }
}

#[test]
fn offline_generator_still_serves_content() {
    let mut engine = GateEngine::new(Arc::new(OfflineGenerator));
    let user = UserId(3);

    let id = engine
        .start_quiz(user, Some(gate(1)), Difficulty::Advanced)
        .expect("start");
    let quiz = engine.quiz(user, id).expect("quiz");
    assert_eq!(quiz.questions, fallback_quiz());

    // The fallback answer key is [1, 1, 2, 1, 1].
    let verdict = engine
        .submit_quiz(user, id, &[1, 1, 2, 1, 1], Some(gate(1)))
        .expect("submit");
    assert_eq!(verdict.score, 50);

    let puzzle = engine.request_puzzle(user, gate(1)).expect("puzzle");
    assert_eq!(
        puzzle.puzzle,
        PuzzleSpec::TowerOfHanoi(HanoiPuzzle::for_gate(gate(1)))
    );

    for n in 1..=6 {
        engine.solve_puzzle(user, gate(n)).expect("solve");
    }
    let oracle = engine.cycle_quiz(user).expect("cycle quiz");
    assert_eq!(oracle.questions, fallback_cycle_quiz());
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[test]
fn redb_state_survives_reopen() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("pulsar.redb");
    let user = UserId(5);

    let (puzzle, quiz_id) = {
        let mut engine = GateEngine::with_redb(&path, builtin()).expect("open");
        clear_gate(&mut engine, user, 1);
        let puzzle = engine.request_puzzle(user, gate(2)).expect("puzzle");
        let quiz_id = engine
            .start_quiz(user, Some(gate(2)), Difficulty::Beginner)
            .expect("start");
        engine
            .save_persona(user, "Vega", Avatar::default())
            .expect("persona");
        (puzzle, quiz_id)
    };

    let mut engine = GateEngine::with_redb(&path, builtin()).expect("reopen");
    assert_eq!(
        engine.progression(user).expect("state").current_gate,
        gate(2)
    );
    assert_eq!(
        engine.persona(user).expect("persona").map(|p| p.name),
        Some("Vega".to_string())
    );
    assert_eq!(engine.request_puzzle(user, gate(2)).expect("puzzle"), puzzle);
    assert!(!engine.quiz(user, quiz_id).expect("quiz").submitted);

    let next = engine
        .start_quiz(user, None, Difficulty::Beginner)
        .expect("start");
    assert!(next > quiz_id);
}
