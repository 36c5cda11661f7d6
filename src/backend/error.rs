//! backend::error
//!
//! Errors surfaced by the state backend.
//!
//! Every module error folds into [`BackendError`]. Callers branch on
//! [`BackendError::kind`] and an HTTP layer maps
//! [`BackendError::status_code`] straight onto responses.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::types::{CommitHash, StatePath, TypeError};
use crate::crypto::CodecError;
use crate::git::{retry, DurabilityError, GitError, RetryError, Retryability};
use crate::lock::{LockError, LockRecord, StoreError};

/// Error taxonomy shared by all operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Fatal at startup: missing keys, bad key material, unusable repository.
    Configuration,
    /// Malformed request body or path; nothing was written.
    Validation,
    /// No state stored at the path.
    NotFound,
    /// Lock held by someone else, or not held by the caller.
    Ownership,
    /// Store, network, filesystem or exhausted retries.
    Infrastructure,
    /// A retryable failure inside the push loop.
    Transient,
}

impl ErrorKind {
    /// Kind of a single failed push attempt.
    pub fn of_push_attempt(err: &GitError) -> Self {
        match retry::classify(err) {
            Retryability::Retryable => ErrorKind::Transient,
            Retryability::Fatal => ErrorKind::Infrastructure,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Ownership => "ownership",
            ErrorKind::Infrastructure => "infrastructure",
            ErrorKind::Transient => "transient",
        };
        f.write_str(name)
    }
}

/// Errors from [`StateBackend`](super::StateBackend) operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A path or holder failed validation.
    #[error("invalid request: {0}")]
    InvalidInput(#[from] TypeError),

    /// The submitted body is not JSON.
    #[error("request body is not valid JSON: {message}")]
    InvalidJson { message: String },

    /// No state exists at the path.
    #[error("state not found: {path}")]
    NotFound { path: StatePath },

    /// Encoding or decoding a state blob failed.
    #[error(transparent)]
    Codec(CodecError),

    /// Local filesystem failure.
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The path is locked by another holder.
    #[error("{} is locked by {}", .current.path, .current.holder)]
    LockConflict { current: LockRecord },

    /// The caller does not own the lock.
    #[error("{} is locked by {}, not by the caller", .current.path, .current.holder)]
    NotOwner { current: LockRecord },

    /// Unlock of a path that is not locked.
    #[error("{path} is not locked")]
    NotLocked { path: StatePath },

    /// The lock store failed.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The repository could not be prepared or the commit failed.
    #[error(transparent)]
    Durability(DurabilityError),

    /// The state was saved (and committed, if `commit` is set) but not
    /// replicated to the remote.
    #[error("state {path} saved locally but remote sync failed: {source}")]
    RemoteSync {
        path: StatePath,
        commit: Option<CommitHash>,
        #[source]
        source: RetryError,
    },

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<StoreError> for BackendError {
    fn from(err: StoreError) -> Self {
        BackendError::Lock(LockError::Store(err))
    }
}

impl From<CodecError> for BackendError {
    fn from(err: CodecError) -> Self {
        BackendError::Codec(err)
    }
}

impl From<DurabilityError> for BackendError {
    fn from(err: DurabilityError) -> Self {
        BackendError::Durability(err)
    }
}

impl BackendError {
    /// Category of the failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Config(_) => ErrorKind::Configuration,
            BackendError::InvalidInput(_) | BackendError::InvalidJson { .. } => {
                ErrorKind::Validation
            }
            BackendError::NotFound { .. } => ErrorKind::NotFound,
            BackendError::Codec(CodecError::NotFound { .. }) => ErrorKind::NotFound,
            BackendError::Codec(e) if e.is_configuration() => ErrorKind::Configuration,
            BackendError::Codec(_) => ErrorKind::Infrastructure,
            BackendError::Io { .. } => ErrorKind::Infrastructure,
            BackendError::LockConflict { .. }
            | BackendError::NotOwner { .. }
            | BackendError::NotLocked { .. } => ErrorKind::Ownership,
            BackendError::Lock(_) => ErrorKind::Infrastructure,
            BackendError::Durability(DurabilityError::Setup(_)) => ErrorKind::Configuration,
            BackendError::Durability(_) => ErrorKind::Infrastructure,
            BackendError::RemoteSync { .. } => ErrorKind::Infrastructure,
            BackendError::Task(_) => ErrorKind::Infrastructure,
        }
    }

    /// HTTP status for the failure.
    pub fn status_code(&self) -> u16 {
        match self {
            BackendError::InvalidInput(_) | BackendError::InvalidJson { .. } => 400,
            BackendError::NotFound { .. } | BackendError::Codec(CodecError::NotFound { .. }) => {
                404
            }
            BackendError::LockConflict { .. } => 423,
            BackendError::NotOwner { .. } | BackendError::NotLocked { .. } => 409,
            BackendError::Lock(LockError::CorruptRecord { .. })
            | BackendError::Lock(LockError::UnexpectedDelete { .. }) => 500,
            BackendError::Lock(_) => 503,
            BackendError::RemoteSync { .. } => 502,
            BackendError::Config(_)
            | BackendError::Codec(_)
            | BackendError::Io { .. }
            | BackendError::Durability(_)
            | BackendError::Task(_) => 500,
        }
    }
}
