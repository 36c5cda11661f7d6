//! backend::facade
//!
//! The state backend: one object wiring codec, lock coordinator and git
//! durability together.
//!
//! # Operations
//!
//! | Operation | Effect |
//! |---|---|
//! | [`apply`](StateBackend::apply) | validate JSON, encode, write atomically, commit and push |
//! | [`get`](StateBackend::get) | read and decode |
//! | [`lock`](StateBackend::lock) / [`unlock`](StateBackend::unlock) | per-path ownership |
//! | [`lock_status`](StateBackend::lock_status) | current lock record |
//!
//! `apply` does not check that the caller holds the lock. Callers are
//! trusted to lock first, the same contract the Terraform HTTP backend
//! protocol has.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::BackendError;
use crate::core::config::BackendConfig;
use crate::core::types::{CommitHash, HolderId, StatePath};
use crate::crypto::{CodecError, StateCodec};
use crate::git::{CommitOutcome, DurabilityError, GitDurability};
use crate::lock::{self, LockCoordinator, LockOutcome, LockRecord, UnlockOutcome};

/// Acknowledgement of a successful [`StateBackend::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyAck {
    /// Always `"ok"`
    pub status: &'static str,
    /// The stored path
    pub state: StatePath,
    /// Commit created for this write, if any
    pub commit: Option<CommitHash>,
    /// Whether the branch was pushed
    pub pushed: bool,
}

/// Remote state backend.
#[derive(Debug)]
pub struct StateBackend {
    root: PathBuf,
    codec: Arc<StateCodec>,
    locks: LockCoordinator,
    durability: Option<GitDurability>,
}

impl StateBackend {
    /// Build a backend from validated configuration.
    ///
    /// Loads key material, opens the repository, ensures the remote and
    /// connects the lock store. Any failure here is fatal.
    pub async fn open(config: &BackendConfig) -> Result<Self, BackendError> {
        let codec = StateCodec::from_config(&config.encryption)?;

        let durability = match &config.remote {
            Some(remote) => {
                let repo_path = config.repo_path.clone();
                let remote = remote.clone();
                let durability =
                    tokio::task::spawn_blocking(move || GitDurability::open(&repo_path, remote))
                        .await
                        .map_err(|e| BackendError::Task(e.to_string()))??;
                Some(durability)
            }
            None => {
                fs::create_dir_all(&config.repo_path).map_err(|source| BackendError::Io {
                    path: config.repo_path.clone(),
                    source,
                })?;
                None
            }
        };

        let locks = lock::connect(&config.lock).await?;

        info!(
            root = %config.repo_path.display(),
            codec = codec.name(),
            lock_store = locks.store_name(),
            git = durability.is_some(),
            "state backend ready"
        );

        Ok(Self::from_parts(
            config.repo_path.clone(),
            codec,
            locks,
            durability,
        ))
    }

    /// Assemble a backend from already-built parts.
    pub fn from_parts(
        root: PathBuf,
        codec: StateCodec,
        locks: LockCoordinator,
        durability: Option<GitDurability>,
    ) -> Self {
        Self {
            root,
            codec: Arc::new(codec),
            locks,
            durability,
        }
    }

    /// Directory holding the state files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Codec applied to state blobs.
    pub fn codec(&self) -> &StateCodec {
        &self.codec
    }

    /// Lock coordinator.
    pub fn locks(&self) -> &LockCoordinator {
        &self.locks
    }

    /// The git durability layer, if enabled.
    pub fn durability(&self) -> Option<&GitDurability> {
        self.durability.as_ref()
    }

    /// Store `body` at `path`.
    ///
    /// Malformed JSON is rejected before anything is written. A push
    /// failure after a successful local write is reported as
    /// [`BackendError::RemoteSync`]; the local write and commit stay.
    pub async fn apply(
        &self,
        path: &StatePath,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> Result<ApplyAck, BackendError> {
        serde_json::from_slice::<serde_json::Value>(body).map_err(|e| {
            BackendError::InvalidJson {
                message: e.to_string(),
            }
        })?;

        let codec = Arc::clone(&self.codec);
        let target = path.under(&self.root);
        let body = body.to_vec();
        let written = tokio::task::spawn_blocking(move || -> Result<usize, BackendError> {
            let encoded = codec.encode(&body)?;
            write_atomic(&target, &encoded)?;
            Ok(encoded.len())
        })
        .await
        .map_err(|e| BackendError::Task(e.to_string()))??;

        info!(path = %path, bytes = written, encrypted = self.codec.is_encrypted(), "state written");

        let Some(durability) = &self.durability else {
            return Ok(ApplyAck {
                status: "ok",
                state: path.clone(),
                commit: None,
                pushed: false,
            });
        };

        let message = durability.commit_message(path);
        match durability.commit_and_push(path, &message, cancel).await {
            Ok(report) => Ok(ApplyAck {
                status: "ok",
                state: path.clone(),
                commit: match report.commit {
                    CommitOutcome::Committed(record) => Some(record.hash),
                    CommitOutcome::Unchanged => None,
                },
                pushed: report.pushed,
            }),
            Err(DurabilityError::Push { commit, source }) => Err(BackendError::RemoteSync {
                path: path.clone(),
                commit: commit.map(|c| c.hash),
                source,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the state stored at `path`.
    pub async fn get(&self, path: &StatePath) -> Result<serde_json::Value, BackendError> {
        let codec = Arc::clone(&self.codec);
        let target = path.under(&self.root);
        let result = tokio::task::spawn_blocking(move || codec.decode_file(&target))
            .await
            .map_err(|e| BackendError::Task(e.to_string()))?;

        match result {
            Ok(value) => {
                debug!(path = %path, "state read");
                Ok(value)
            }
            Err(CodecError::NotFound { .. }) => Err(BackendError::NotFound { path: path.clone() }),
            Err(e) => Err(e.into()),
        }
    }

    /// Lock `path` for `holder`.
    ///
    /// Re-locking by the current holder succeeds.
    pub async fn lock(
        &self,
        path: &StatePath,
        holder: &HolderId,
    ) -> Result<LockRecord, BackendError> {
        match self.locks.try_lock(path, holder).await? {
            LockOutcome::Acquired(record) => Ok(record),
            LockOutcome::Conflict { current } => Err(BackendError::LockConflict { current }),
        }
    }

    /// Release `holder`'s lock on `path`.
    pub async fn unlock(&self, path: &StatePath, holder: &HolderId) -> Result<(), BackendError> {
        match self.locks.unlock(path, holder).await? {
            UnlockOutcome::Released => Ok(()),
            UnlockOutcome::NotOwner { current } => Err(BackendError::NotOwner { current }),
            UnlockOutcome::NotFound => Err(BackendError::NotLocked { path: path.clone() }),
        }
    }

    /// Current lock on `path`, if any.
    pub async fn lock_status(&self, path: &StatePath) -> Result<Option<LockRecord>, BackendError> {
        Ok(self.locks.get_lock(path).await?)
    }
}

/// Write `bytes` to `target` through a temporary file in the same directory.
fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), BackendError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| BackendError::Io { path, source }
    };

    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(io_err(dir))?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = (|| -> Result<(), BackendError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(io_err(&temp_path))?;
        file.write_all(bytes).map_err(io_err(&temp_path))?;
        file.sync_all().map_err(io_err(&temp_path))?;
        fs::rename(&temp_path, target).map_err(io_err(target))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
