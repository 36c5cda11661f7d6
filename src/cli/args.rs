//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Configuration file (default `./gitstate.toml`)
//! - `--debug`: Enable debug logging

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// gitstate - encrypted, locked, git-replicated remote state
#[derive(Parser, Debug)]
#[command(name = "gitstate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file; overrides $GITSTATE_CONFIG
    #[arg(long, short, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate configuration, key material, repository and lock store
    #[command(
        long_about = "Validate configuration, key material, repository and lock store.\n\n\
            Runs the same startup checks as every other command and reports what \
            was found. Exits non-zero on the first fatal problem."
    )]
    Check,

    /// Store a state document
    #[command(after_help = "\
EXAMPLES:
    # Store from a file
    gitstate apply envs/dev/terraform.tfstate --file terraform.tfstate

    # Store from stdin
    terraform show -json | gitstate apply envs/dev/terraform.tfstate")]
    Apply {
        /// State path, relative to the state root
        path: String,

        /// Read the body from this file instead of stdin
        #[arg(long, short, value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Print a stored state document
    Get {
        /// State path, relative to the state root
        path: String,
    },

    /// Lock a state path
    Lock {
        /// State path, relative to the state root
        path: String,

        /// Lock holder; a random id is generated when omitted
        #[arg(long, value_name = "ID")]
        holder: Option<String>,
    },

    /// Release a lock
    Unlock {
        /// State path, relative to the state root
        path: String,

        /// Lock holder that took the lock
        #[arg(long, value_name = "ID")]
        holder: String,
    },

    /// Show the current lock on a state path
    #[command(name = "lock-status")]
    LockStatus {
        /// State path, relative to the state root
        path: String,
    },

    /// Generate an age identity for the [encryption] section
    Keygen {
        /// Write the identity to this file instead of stdout
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}
