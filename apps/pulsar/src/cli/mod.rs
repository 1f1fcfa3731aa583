//! # Pulsar CLI Module
//!
//! This module implements the CLI interface for Pulsar.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show a player's progression
//! - `reset` - Reset a player to gate 1 of cycle 1
//! - `history` - List a player's attempts
//! - `init` - Initialize a new database

mod commands;

use clap::{Parser, Subcommand};
use pulsar_core::PulsarError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Pulsar Gateway - six gates, quiz then puzzle.
#[derive(Parser, Debug)]
#[command(name = "pulsar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the ledger database
    #[arg(short = 'D', long, global = true, default_value = "pulsar.redb")]
    pub database: PathBuf,

    /// Storage backend: "redb" (ACID database) or "memory" (volatile)
    #[arg(short = 'B', long, global = true, default_value = "redb")]
    pub backend: String,

    /// Path to the TOML configuration file (optional)
    #[arg(short = 'c', long, global = true, default_value = "pulsar.toml")]
    pub config: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides the config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show a player's progression
    Status {
        /// Player id
        #[arg(short, long)]
        user: u64,
    },

    /// Reset a player to gate 1 of cycle 1
    Reset {
        /// Player id
        #[arg(short, long)]
        user: u64,
    },

    /// List a player's puzzle and quiz attempts
    History {
        /// Player id
        #[arg(short, long)]
        user: u64,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), PulsarError> {
    let backend = cli.backend.as_str();
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            cmd_server(&cli.database, backend, &cli.config, host, port).await
        }
        Some(Commands::Status { user }) => cmd_status(&cli.database, backend, json_mode, user),
        Some(Commands::Reset { user }) => cmd_reset(&cli.database, backend, json_mode, user),
        Some(Commands::History { user }) => cmd_history(&cli.database, backend, json_mode, user),
        Some(Commands::Init { force }) => cmd_init(&cli.database, backend, force),
        None => {
            // No subcommand - start the server with configured defaults
            cmd_server(&cli.database, backend, &cli.config, None, None).await
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
