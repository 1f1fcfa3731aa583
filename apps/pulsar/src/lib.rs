//! # pulsar
//!
//! HTTP and CLI shell around `pulsar-core`.
//!
//! - `api`: axum router, handlers and middleware
//! - `config`: TOML file plus environment overrides
//! - `generator`: remote chat-completions content generator

pub mod api;
pub mod config;
pub mod generator;
