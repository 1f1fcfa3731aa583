//! # Pulsar - Gateway Server
//!
//! The main binary for the Pulsar gate progression engine.
//!
//! Serves the HTTP API and runs offline administration commands against
//! the same ledger. All progression rules live in `pulsar-core`; this
//! binary adds the HTTP transport and the remote content generator.
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! pulsar server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! pulsar status --user 42
//! pulsar history --user 42 --json-mode
//! pulsar reset --user 42
//! ```

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // PULSAR_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("PULSAR_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pulsar=info,pulsar_core=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Pulsar startup banner.
fn print_banner() {
    println!(
        r#"
  ██████╗ ██╗   ██╗██╗     ███████╗ █████╗ ██████╗
  ██╔══██╗██║   ██║██║     ██╔════╝██╔══██╗██╔══██╗
  ██████╔╝██║   ██║██║     ███████╗███████║██████╔╝
  ██╔═══╝ ██║   ██║██║     ╚════██║██╔══██║██╔══██╗
  ██║     ╚██████╔╝███████╗███████║██║  ██║██║  ██║
  ╚═╝      ╚═════╝ ╚══════╝╚══════╝╚═╝  ╚═╝╚═╝  ╚═╝

  Pulsar Gateway v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
