//! core
//!
//! Core domain types and configuration for gitstate.
//!
//! # Modules
//!
//! - [`types`] - Strong types: StatePath, HolderId, BranchName, CommitHash
//! - [`config`] - Configuration schema, loading and validation
//! - [`paths`] - Path routing and environment/home expansion
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at construction time
//! - Configuration is validated once, at startup, into tagged variants

pub mod config;
pub mod paths;
pub mod types;
