//! gitstate - a remote state backend backed by git
//!
//! gitstate stores JSON state documents (Terraform state, for example) in a
//! local git working tree, optionally encrypted with age, guarded by
//! per-path locks in a shared store, and replicated by pushing to a remote.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface (parses args, delegates to the backend)
//! - [`backend`] - The [`StateBackend`](backend::StateBackend) facade
//! - [`crypto`] - Encoding of state blobs at rest
//! - [`lock`] - Per-path locks over a shared key-value store
//! - [`git`] - Single interface for all Git operations
//! - [`core`] - Domain types, paths and configuration
//!
//! # Correctness Invariants
//!
//! 1. A rejected request body never reaches disk
//! 2. Local writes are atomic and are never rolled back by a push failure
//! 3. A lock is released only by its holder
//! 4. Repository mutation is serialized in-process and across processes

pub mod backend;
pub mod cli;
pub mod core;
pub mod crypto;
pub mod git;
pub mod lock;
