//! latchkey - OAuth sign-in and token broker for desktop tools
//!
//! Main entry point for the latchkey CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{auth, config, token};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// latchkey - OAuth sign-in and token broker for desktop tools
#[derive(Parser)]
#[command(name = "latchkey")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config directory (default: platform config dir)
    #[arg(long, global = true, env = "LATCHKEY_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in, inspect or end the session
    Auth(auth::AuthArgs),

    /// Print a valid access token, refreshing it if needed
    Token(token::TokenArgs),

    /// Inspect the effective configuration
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = cli
        .config_dir
        .or_else(latchkey_config::default_config_dir)
        .unwrap_or_else(|| PathBuf::from(".latchkey"));
    let project_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let loaded = latchkey_config::load_config(&config_dir, &project_dir);

    // Initialize tracing: console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "latchkey=debug,latchkey_oauth=debug,latchkey_config=debug,warn"
    } else {
        "latchkey=warn,latchkey_oauth=warn,warn"
    };

    let logging = loaded.config.logging();
    let (file_writer, _guard) = if logging.file {
        let log_dir = logging
            .directory
            .clone()
            .unwrap_or_else(|| config_dir.join("logs"));
        let file_appender = tracing_appender::rolling::daily(&log_dir, "latchkey.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        (Some(non_blocking), Some(guard))
    } else {
        (None, None)
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(file_writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "latchkey=trace,latchkey_oauth=trace,latchkey_config=trace,info",
                ))
        }))
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        config_dir,
        config: loaded.config,
        layers: loaded.layers,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Auth(args) => auth::run(args, &ctx).await,
        Commands::Token(args) => token::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx),
    }
}
