// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agentway - a single-tenant gateway bridging a chat workspace to a local
//! AI coding agent.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod ingress;
mod serve;

/// Agentway - chat channels as remote terminals for a local coding agent.
#[derive(Parser, Debug)]
#[command(name = "agentway", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway.
    Serve {
        /// Path to config.yaml / config.json (default: discover in cwd).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Logging level (trace, debug, info, warn, error).
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, log_level } => {
            serve::init_tracing(&log_level);
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
    }
}
