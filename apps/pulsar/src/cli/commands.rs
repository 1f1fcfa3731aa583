//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use pulsar::api::{self, AppState, HistoryResponse, ProgressionResponse};
use pulsar::config::PulsarConfig;
use pulsar::generator;
use pulsar_core::{
    BuiltinGenerator, ContentGenerator, GateEngine, PulsarError, StorageBackend, UserId,
};
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    db_path: &Path,
    backend: &str,
    config_path: &Path,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), PulsarError> {
    let mut config = PulsarConfig::load(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let content = generator::from_config(&config.generator, tokio::runtime::Handle::current());
    let engine = open_engine(db_path, backend, content)?;
    let state = AppState::new(engine).with_answer_keys(config.server.expose_answer_keys);

    println!("Pulsar Gateway Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.server.host);
    println!("  Port:     {}", config.server.port);
    println!("  Backend:  {}", backend);
    println!("  Database: {:?}", db_path);
    println!();
    println!("Endpoints:");
    println!("  GET  /progression        - Current gate and cycle");
    println!("  GET  /puzzle/{{gate}}      - Puzzle of a gate");
    println!("  POST /puzzle/solve       - Record a solve");
    println!("  POST /quiz/start         - Start a quiz");
    println!("  POST /quiz/submit        - Score a quiz");
    println!("  GET  /health             - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    api::run_server(&addr, state).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show a player's progression.
pub fn cmd_status(
    db_path: &Path,
    backend: &str,
    json_mode: bool,
    user: u64,
) -> Result<(), PulsarError> {
    let mut engine = open_offline_engine(db_path, backend)?;
    let state = engine.progression(UserId(user))?;

    if json_mode {
        print_json(&ProgressionResponse::from(state));
        return Ok(());
    }

    println!("Pulsar Progression");
    println!("==================");
    println!("Database: {:?}", db_path);
    println!("Player:   {}", user);
    if let Some(persona) = engine.persona(UserId(user))? {
        println!("Persona:  {}", persona.name);
    }
    println!();
    println!("Cycle: {}", state.current_cycle.value());
    println!("Gate:  {}", state.current_gate.number());
    if state.cycle_complete {
        println!("Cycle complete: cycle quiz unlocked");
    }
    println!();
    for (gate, status) in state.gates() {
        println!("  {:<8} {:?}", gate.to_string(), status);
    }

    let (puzzles, quizzes) = ledger_counts(engine.backend())?;
    println!();
    println!("Ledger (all players): {} puzzles, {} quizzes", puzzles, quizzes);

    Ok(())
}

// =============================================================================
// RESET COMMAND
// =============================================================================

/// Reset a player to gate 1 of cycle 1. History is kept.
pub fn cmd_reset(
    db_path: &Path,
    backend: &str,
    json_mode: bool,
    user: u64,
) -> Result<(), PulsarError> {
    let mut engine = open_offline_engine(db_path, backend)?;
    let state = engine.reset_progress(UserId(user))?;

    if json_mode {
        print_json(&ProgressionResponse::from(state));
    } else {
        println!("Player {} reset to Gate 1, cycle 1", user);
    }
    Ok(())
}

// =============================================================================
// HISTORY COMMAND
// =============================================================================

/// List a player's attempts.
pub fn cmd_history(
    db_path: &Path,
    backend: &str,
    json_mode: bool,
    user: u64,
) -> Result<(), PulsarError> {
    let engine = open_offline_engine(db_path, backend)?;
    let history = HistoryResponse::from(engine.history(UserId(user))?);

    if json_mode {
        print_json(&history);
        return Ok(());
    }

    println!("Pulsar History (player {})", user);
    println!("==========================");
    println!();
    println!("Puzzles: {}", history.puzzles.len());
    for p in &history.puzzles {
        println!(
            "  cycle {:>3}  gate {}  {:<20} {}",
            p.cycle,
            p.gate,
            p.puzzle_type,
            if p.solved { "solved" } else { "open" }
        );
    }
    println!();
    println!("Quizzes: {}", history.quizzes.len());
    for q in &history.quizzes {
        let gate = q.gate.map_or_else(|| "-".to_string(), |g| g.to_string());
        println!(
            "  #{:<5} cycle {:>3}  gate {}  {:<12} {:>2}/{}  {}",
            q.quiz_id,
            q.cycle,
            gate,
            q.difficulty,
            q.score,
            q.max_score,
            if q.submitted { "submitted" } else { "pending" }
        );
    }

    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(db_path: &Path, backend: &str, force: bool) -> Result<(), PulsarError> {
    if backend != "redb" {
        return Err(PulsarError::InvalidInput(format!(
            "init only applies to the redb backend, got '{}'",
            backend
        )));
    }

    if db_path.exists() {
        if !force {
            return Err(PulsarError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| PulsarError::IoError(format!("Remove db: {}", e)))?;
    }

    let _engine = open_offline_engine(db_path, backend)?;
    println!("Initialized new redb database at {:?}", db_path);
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open an engine over the selected backend.
pub fn open_engine(
    db_path: &Path,
    backend: &str,
    content: Arc<dyn ContentGenerator>,
) -> Result<GateEngine, PulsarError> {
    match backend {
        "redb" => GateEngine::with_redb(db_path, content),
        "memory" => {
            tracing::warn!("Using in-memory ledger: progress is lost on exit");
            Ok(GateEngine::new(content))
        }
        other => Err(PulsarError::InvalidInput(format!(
            "unknown backend '{}' (expected redb or memory)",
            other
        ))),
    }
}

/// Engine for commands that never generate content.
fn open_offline_engine(db_path: &Path, backend: &str) -> Result<GateEngine, PulsarError> {
    open_engine(db_path, backend, Arc::new(BuiltinGenerator::new()))
}

fn ledger_counts(backend: &StorageBackend) -> Result<(usize, usize), PulsarError> {
    match backend {
        StorageBackend::InMemory(ledger) => Ok((ledger.puzzle_count(), ledger.quiz_count())),
        StorageBackend::Persistent(redb) => Ok((redb.puzzle_count()?, redb.quiz_count()?)),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

// =============================================================================
// TESTS
// =============================================================================
