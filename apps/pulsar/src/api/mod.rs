//! # Pulsar HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check (no player required)
//! - `GET /progression` - Current gate, cycle and gate statuses
//! - `POST /progression/reset` - Back to gate 1 of cycle 1
//! - `GET /puzzle/{gate}` - Puzzle of a gate (generated on first request)
//! - `POST /puzzle/reboot` - Discard a gate's puzzle
//! - `POST /puzzle/solve` - Record a solve
//! - `POST /puzzle/hint` - Hint for a gate's puzzle
//! - `POST /quiz/start` - Start a quiz attempt
//! - `GET /quiz/{quiz_id}` - Read a quiz attempt
//! - `POST /quiz/submit` - Score a quiz attempt
//! - `GET /quiz/cycle` - End-of-cycle quiz (once all six gates are cleared)
//! - `GET /persona` - The player's persona
//! - `POST /persona` - Create or replace the persona
//! - `GET /history` - All attempts of the player
//!
//! Player routes require the `X-Pulsar-User` header.
//!
//! ## Locking
//!
//! The engine sits behind one `RwLock`. Generated content is produced with
//! no lock held: handlers read a slot, generate through
//! [`AppState::generate`], then take the write lock only to record.
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `PULSAR_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `PULSAR_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `PULSAR_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod error;
mod handlers;
mod identity;
mod middleware;
mod types;

pub use auth::get_api_key_from_env;
pub use error::ApiError;
pub use identity::{Player, USER_HEADER};
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    AckResponse, AvatarJson, CycleQuizHistoryJson, CycleQuizResponse, ErrorResponse, GateJson,
    GateRequest, HealthResponse, HintResponse, HistoryResponse, NextTargetJson, PersonaResponse,
    ProgressionResponse, PuzzleHistoryJson, PuzzleResponse, QuestionJson, QuizHistoryJson,
    QuizResponse, RebootResponse, SavePersonaRequest, SolveResponse, StartQuizRequest,
    StartQuizResponse, SubmitQuizRequest, SubmitQuizResponse, puzzle_data,
};

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use pulsar_core::{ContentSource, GateEngine, PulsarError};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the engine.
#[derive(Clone)]
pub struct AppState {
    /// The progression engine.
    pub engine: Arc<RwLock<GateEngine>>,
    /// The engine's content source, usable without the engine lock.
    pub content: ContentSource,
    /// Serve quiz answer keys to players.
    pub expose_answer_keys: bool,
}

impl AppState {
    /// Create new app state with an engine.
    #[must_use]
    pub fn new(engine: GateEngine) -> Self {
        Self {
            content: engine.content().clone(),
            engine: Arc::new(RwLock::new(engine)),
            expose_answer_keys: true,
        }
    }

    /// Set whether quiz answer keys are served.
    #[must_use]
    pub fn with_answer_keys(mut self, expose: bool) -> Self {
        self.expose_answer_keys = expose;
        self
    }

    /// Produce generated content on the blocking pool without touching the
    /// engine lock. The generator may block on network I/O.
    pub async fn generate<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&ContentSource) -> T + Send + 'static,
        T: Send + 'static,
    {
        let content = self.content.clone();
        tokio::task::spawn_blocking(move || op(&content))
            .await
            .map_err(|e| ApiError::Internal(format!("generator task failed: {}", e)))
    }

    /// Run a mutating engine operation on the blocking pool.
    ///
    /// Storage is synchronous, so engine calls never run on the async
    /// workers.
    pub async fn with_engine<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut GateEngine) -> Result<T, PulsarError> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || {
            let mut guard = engine.blocking_write();
            op(&mut guard)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("engine task failed: {}", e)))?
        .map_err(ApiError::from)
    }

    /// Run a read-only engine operation on the blocking pool.
    pub async fn with_engine_ref<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&GateEngine) -> Result<T, PulsarError> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || {
            let guard = engine.blocking_read();
            op(&guard)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("engine task failed: {}", e)))?
        .map_err(ApiError::from)
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

fn allowed_headers() -> [HeaderName; 3] {
    [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        HeaderName::from_static(USER_HEADER),
    ]
}

/// Build CORS layer from `PULSAR_CORS_ORIGINS`.
///
/// - `*`: allows all origins (development only)
/// - unset: localhost only
/// - otherwise: comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("PULSAR_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (PULSAR_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in PULSAR_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers(allowed_headers())
            }
        }
        None => {
            tracing::info!("CORS: No PULSAR_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(allowed_headers())
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Rate Limiting - global quota (if enabled)
/// 4. Authentication - validates the service API key (if configured)
pub fn create_router(state: AppState) -> Router {
    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - the service trusts the X-Pulsar-User header \
             from any caller. Set PULSAR_API_KEY to require a shared key."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/progression", get(handlers::progression_handler))
        .route("/progression/reset", post(handlers::reset_handler))
        .route("/puzzle/{gate}", get(handlers::puzzle_handler))
        .route("/puzzle/reboot", post(handlers::reboot_handler))
        .route("/puzzle/solve", post(handlers::solve_handler))
        .route("/puzzle/hint", post(handlers::hint_handler))
        .route("/quiz/start", post(handlers::start_quiz_handler))
        .route("/quiz/submit", post(handlers::submit_quiz_handler))
        .route("/quiz/cycle", get(handlers::cycle_quiz_handler))
        .route("/quiz/{quiz_id}", get(handlers::quiz_handler))
        .route(
            "/persona",
            get(handlers::persona_handler).post(handlers::save_persona_handler),
        )
        .route("/history", get(handlers::history_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(64 * 1024))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer()),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), PulsarError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PulsarError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("Pulsar HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| PulsarError::IoError(format!("Server error: {}", e)))
}
