//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments
//! 2. Builds a [`StateBackend`] from configuration
//! 3. Formats and displays output
//!
//! # Async Commands
//!
//! The backend is async. Handlers are synchronous wrappers that create a
//! tokio runtime and `block_on` the async implementation.

mod check;
mod keygen;
mod locking;
mod state;

pub use check::check;
pub use keygen::keygen;
pub use locking::{lock, lock_status, unlock};
pub use state::{apply, get};

use anyhow::{Context as _, Result};

use crate::backend::StateBackend;
use crate::cli::args::Command;
use crate::core::config::BackendConfig;
use crate::core::types::StatePath;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, config: &BackendConfig) -> Result<()> {
    match command {
        Command::Check => check::check(config),
        Command::Apply { path, file } => state::apply(config, &path, file.as_deref()),
        Command::Get { path } => state::get(config, &path),
        Command::Lock { path, holder } => locking::lock(config, &path, holder.as_deref()),
        Command::Unlock { path, holder } => locking::unlock(config, &path, &holder),
        Command::LockStatus { path } => locking::lock_status(config, &path),
        Command::Keygen { output } => keygen::keygen(output.as_deref()),
    }
}

/// Build a runtime for one command.
fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start async runtime")
}

/// Open the backend described by `config`.
async fn open_backend(config: &BackendConfig) -> Result<StateBackend> {
    StateBackend::open(config)
        .await
        .context("backend startup failed")
}

/// Parse a state path argument.
fn state_path(raw: &str) -> Result<StatePath> {
    StatePath::new(raw).with_context(|| format!("invalid state path '{}'", raw))
}
