//! # Remote Content Generator
//!
//! [`ContentGenerator`] backed by an OpenAI-compatible chat-completions API.
//!
//! The engine is synchronous, so each call drives the async `reqwest` client
//! to completion on the server's runtime handle. Calls must therefore come
//! from a blocking thread (`spawn_blocking`), never from an async worker.
//!
//! Puzzles always use the builtin Tower of Hanoi scaling; quizzes, the
//! cycle quiz and hints go over the network.

use crate::config::GeneratorConfig;
use pulsar_core::content::{clean_hint, parse_quiz_reply};
use pulsar_core::{
    BuiltinGenerator, ContentGenerator, Cycle, Difficulty, Gate, PulsarError, PuzzleKind,
    PuzzleSpec, Question,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

impl ChatResponse {
    fn into_content(self) -> Result<String, PulsarError> {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| PulsarError::ContentGenerator("empty completion".to_string()))
    }
}

fn failure(e: impl std::fmt::Display) -> PulsarError {
    PulsarError::ContentGenerator(e.to_string())
}

// =============================================================================
// PROMPTS
// =============================================================================

fn quiz_prompt(difficulty: Difficulty, gate: Option<Gate>) -> String {
    let context = match gate {
        Some(gate) => format!("for Gate {}", gate.number()),
        None => "General Knowledge".to_string(),
    };
    format!(
        "Generate 5 unique, non-repeating quiz questions about AI, ML, Deep Learning, \
         Python, and GenAI.\n\
         Context: {context}.\n\
         Difficulty: {difficulty}.\n\
         Format: JSON Array of objects with keys: 'question', 'options' (list of 4 strings), \
         'correct_index' (0-3).\n\
         Ensure questions are conceptual and engaging."
    )
}

fn cycle_quiz_prompt(cycle: Cycle) -> String {
    let level = cycle.value().min(10);
    format!(
        "You are the Galactic Oracle, a super-intelligence at the center of the Pulsar Gateway.\n\
         Generate 5 multiple-choice questions for a traveler navigating Star System {}.\n\
         Topic rotation:\n\
         1. Generative AI (cosmic metaphors)\n\
         2. Python (gateway protocols)\n\
         3. Machine Learning (stellar patterns)\n\
         4. Deep Learning (nebula networks)\n\
         5. Applied AI Scenario (interstellar mission)\n\
         Difficulty Level: {level}\n\
         Return ONLY a JSON array of objects with keys: 'question', 'options' (list of 4 strings), \
         'answer' (0-3, index of the correct option), 'explanation'.",
        cycle.value()
    )
}

fn hint_prompt(gate: Gate, kind: PuzzleKind) -> String {
    format!(
        "Provide a short, cryptic hint for a {} puzzle (Step {}). Max 15 words.",
        kind,
        gate.number()
    )
}

// =============================================================================
// REMOTE GENERATOR
// =============================================================================

/// Chat-completions backed generator.
pub struct RemoteGenerator {
    http: reqwest::Client,
    runtime: Handle,
    endpoint: String,
    model: String,
    api_key: String,
    builtin: BuiltinGenerator,
}

impl std::fmt::Debug for RemoteGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteGenerator")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl RemoteGenerator {
    /// Build a generator with a bounded request timeout.
    pub fn new(
        config: &GeneratorConfig,
        api_key: &str,
        runtime: Handle,
    ) -> Result<Self, PulsarError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(failure)?;
        Ok(Self {
            http,
            runtime,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: api_key.to_string(),
            builtin: BuiltinGenerator::new(),
        })
    }

    /// Send one user message and return the first completion.
    fn complete(&self, prompt: &str) -> Result<String, PulsarError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        self.runtime.block_on(async {
            let resp = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(failure)?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(PulsarError::ContentGenerator(format!(
                    "completion API returned {}: {}",
                    status.as_u16(),
                    body
                )));
            }

            resp.json::<ChatResponse>()
                .await
                .map_err(failure)?
                .into_content()
        })
    }
}

impl ContentGenerator for RemoteGenerator {
    fn generate_puzzle(&self, gate: Gate, cycle: Cycle) -> Result<PuzzleSpec, PulsarError> {
        self.builtin.generate_puzzle(gate, cycle)
    }

    fn generate_quiz(
        &self,
        difficulty: Difficulty,
        gate: Option<Gate>,
    ) -> Result<Vec<Question>, PulsarError> {
        let reply = self.complete(&quiz_prompt(difficulty, gate))?;
        parse_quiz_reply(&reply)
    }

    fn generate_hint(&self, gate: Gate, kind: PuzzleKind) -> Result<String, PulsarError> {
        let reply = self.complete(&hint_prompt(gate, kind))?;
        clean_hint(&reply)
    }

    fn generate_cycle_quiz(&self, cycle: Cycle) -> Result<Vec<Question>, PulsarError> {
        let reply = self.complete(&cycle_quiz_prompt(cycle))?;
        parse_quiz_reply(&reply)
    }
}

// =============================================================================
// SELECTION
// =============================================================================

/// Pick the generator for this process: remote when a real key is
/// configured, builtin otherwise.
pub fn from_config(config: &GeneratorConfig, runtime: Handle) -> Arc<dyn ContentGenerator> {
    let Some(key) = config.effective_key() else {
        tracing::info!("Content generator: builtin (no API key configured)");
        return Arc::new(BuiltinGenerator::new());
    };

    match RemoteGenerator::new(config, key, runtime) {
        Ok(remote) => {
            tracing::info!(
                endpoint = %config.endpoint,
                model = %config.model,
                timeout_secs = config.timeout_secs,
                "Content generator: remote"
            );
            Arc::new(remote)
        }
        Err(e) => {
            tracing::warn!("Remote generator unavailable ({}), using builtin", e);
            Arc::new(BuiltinGenerator::new())
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiz_prompt_mentions_gate_and_difficulty() {
        let prompt = quiz_prompt(Difficulty::Advanced, Gate::new(3).ok());
        assert!(prompt.contains("for Gate 3"));
        assert!(prompt.contains("Difficulty: Advanced"));
        assert!(prompt.contains("correct_index"));

        let general = quiz_prompt(Difficulty::Beginner, None);
        assert!(general.contains("General Knowledge"));
    }

    #[test]
    fn cycle_quiz_prompt_caps_difficulty() {
        let prompt = cycle_quiz_prompt(Cycle::FIRST);
        assert!(prompt.contains("Star System 1"));
        assert!(prompt.contains("Difficulty Level: 1"));
        assert!(prompt.contains("'explanation'"));

        let late = cycle_quiz_prompt(Cycle(14));
        assert!(late.contains("Star System 14"));
        assert!(late.contains("Difficulty Level: 10"));
    }

    #[test]
    fn hint_prompt_names_kind() {
        let prompt = hint_prompt(Gate::FIRST, PuzzleKind::TowerOfHanoi);
        assert!(prompt.contains("tower-of-hanoi"));
        assert!(prompt.contains("Step 1"));
    }

    #[test]
    fn chat_response_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}},
                      {"message":{"role":"assistant","content":"ignored"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.into_content().expect("content"), "hello");
    }

    #[test]
    fn chat_response_without_choices_fails() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).expect("parse");
        assert!(matches!(
            parsed.into_content(),
            Err(PulsarError::ContentGenerator(_))
        ));
        let blank: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  "}}]}"#).expect("parse");
        assert!(blank.into_content().is_err());
    }

    #[tokio::test]
    async fn placeholder_key_selects_builtin() {
        let config = GeneratorConfig {
            api_key: Some(crate::config::PLACEHOLDER_API_KEY.to_string()),
            ..GeneratorConfig::default()
        };
        let generator = from_config(&config, Handle::current());
        let quiz = generator
            .generate_quiz(Difficulty::default(), None)
            .expect("builtin quiz");
        assert_eq!(quiz, pulsar_core::fallback_quiz());
    }

    #[tokio::test]
    async fn remote_puzzles_use_builtin_scaling() {
        let config = GeneratorConfig {
            api_key: Some("gsk_test".to_string()),
            ..GeneratorConfig::default()
        };
        let remote = RemoteGenerator::new(&config, "gsk_test", Handle::current()).expect("client");
        let gate = Gate::new(6).expect("gate");
        assert_eq!(
            remote.generate_puzzle(gate, Cycle::FIRST).expect("puzzle"),
            PuzzleSpec::TowerOfHanoi(pulsar_core::HanoiPuzzle::for_gate(gate))
        );
    }
}
