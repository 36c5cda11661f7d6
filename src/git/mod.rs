//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **only doorway** to Git. No other module imports
//! `git2`. State files are made durable by committing them to a local
//! repository and pushing the branch to a remote.
//!
//! # Modules
//!
//! - `interface`: [`Git`], the typed wrapper over one repository
//! - `auth`: [`PushAuth`] credentials and the libgit2 credential callback
//! - [`retry`]: failure classification and exponential backoff
//! - `lock`: cross-process [`WorktreeLock`]
//! - `durability`: [`GitDurability`], commit-and-push with both locks held
//!
//! # Invariants
//!
//! - A commit always precedes the push that publishes it
//! - A push failure never rewrites or drops local commits
//! - Repository mutation is serialized in-process and across processes
//!
//! # Example
//!
//! ```ignore
//! use gitstate::git::GitDurability;
//! use tokio_util::sync::CancellationToken;
//!
//! let durability = GitDurability::open(&config.repo_path, remote)?;
//! let message = durability.commit_message(&path);
//! let report = durability
//!     .commit_and_push(&path, &message, &CancellationToken::new())
//!     .await?;
//! ```

mod auth;
mod durability;
mod interface;
mod lock;
pub mod retry;

pub use auth::{PushAuth, TOKEN_USERNAME};
pub use durability::{DurabilityError, GitDurability, SyncReport, PATH_PLACEHOLDER};
pub use interface::{CommitInfo, CommitOutcome, CommitRecord, Git, GitError, RemoteSetup};
pub use lock::{WorktreeLock, WorktreeLockError};
pub use retry::{RetryError, RetryPolicy, Retryability};
