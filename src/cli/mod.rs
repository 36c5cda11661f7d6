//! cli
//!
//! Command-line interface for gitstate.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and install the log subscriber
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap, loads a
//! [`BackendConfig`] and dispatches to handlers that build a
//! [`StateBackend`](crate::backend::StateBackend). All state changes go
//! through the backend.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

pub mod args;
pub mod commands;

pub use args::{Cli, Command};

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::BackendConfig;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();

    // keygen must work before any configuration exists
    if let Command::Keygen { output } = &cli.command {
        init_logging(cli.debug, "warn");
        return commands::keygen(output.as_deref());
    }

    let config = BackendConfig::load(cli.config.as_deref()).with_context(|| {
        format!(
            "cannot load configuration from {}",
            BackendConfig::resolve_path(cli.config.as_deref()).display()
        )
    })?;
    init_logging(cli.debug, &config.log_level);

    commands::dispatch(cli.command, &config)
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins, then `--debug`, then the configured level.
pub fn init_logging(debug: bool, configured: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new("info"))
        }
    });

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
