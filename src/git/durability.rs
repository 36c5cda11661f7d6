//! git::durability
//!
//! Commit-and-push of state files.
//!
//! # Architecture
//!
//! [`GitDurability`] owns the single [`Git`] handle of the process. Every
//! repository mutation runs on the blocking thread pool while holding both
//! the in-process mutex around the handle and the cross-process
//! [`WorktreeLock`]. Backoff sleeps between push attempts happen outside
//! those locks on the async runtime.
//!
//! # Failure Model
//!
//! A commit is never rolled back because a push failed. Push failures are
//! reported as [`DurabilityError::Push`], which carries the commit that was
//! made so callers can tell "saved locally, not replicated" apart from
//! "not saved".

use std::path::Path;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::auth::PushAuth;
use super::interface::{CommitOutcome, CommitRecord, Git, GitError, RemoteSetup};
use super::lock::{WorktreeLock, WorktreeLockError};
use super::retry::{retry_with_backoff, RetryError, RetryPolicy, Sleeper, TokioSleeper};
use crate::core::config::RemoteSyncConfig;
use crate::core::paths::RepoPaths;
use crate::core::types::{CommitHash, StatePath};

/// Placeholder replaced by the state path in commit message templates.
pub const PATH_PLACEHOLDER: &str = "{path}";

/// Errors from the durability layer.
#[derive(Debug, Error)]
pub enum DurabilityError {
    /// Opening the repository or preparing the remote failed.
    #[error("repository setup failed: {0}")]
    Setup(#[source] GitError),

    /// The working tree lock could not be taken.
    #[error(transparent)]
    Lock(#[from] WorktreeLockError),

    /// Creating the commit failed; nothing was recorded.
    #[error("commit failed: {0}")]
    Commit(#[source] GitError),

    /// The commit (if any) is local but the push did not succeed.
    #[error("push failed: {source}")]
    Push {
        /// Commit created by this operation, `None` if the tree was unchanged
        commit: Option<CommitRecord>,
        #[source]
        source: RetryError,
    },

    /// A blocking git task panicked or was cancelled.
    #[error("git task failed: {0}")]
    Task(String),
}

/// What a commit-and-push achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Commit result
    pub commit: CommitOutcome,
    /// Whether the branch was pushed
    pub pushed: bool,
    /// Push attempts made (0 when auto-push is off)
    pub push_attempts: u32,
}

/// Git-backed durability for state files.
pub struct GitDurability {
    git: Arc<Mutex<Git>>,
    paths: RepoPaths,
    config: RemoteSyncConfig,
    auth: PushAuth,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    remote_setup: RemoteSetup,
}

impl std::fmt::Debug for GitDurability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitDurability")
            .field("git_dir", &self.paths.git_dir)
            .field("remote", &self.config.remote_name)
            .field("branch", &self.config.branch)
            .field("auth", &self.auth)
            .field("policy", &self.policy)
            .finish()
    }
}

impl GitDurability {
    /// Open the repository at exactly `repo_path` and prepare the remote.
    ///
    /// Blocking; call from the blocking pool or at startup.
    ///
    /// # Errors
    ///
    /// [`DurabilityError::Setup`] if the path is not a non-bare repository,
    /// the credentials are unusable or the remote cannot be configured.
    pub fn open(repo_path: &Path, config: RemoteSyncConfig) -> Result<Self, DurabilityError> {
        let git = Git::open(repo_path).map_err(DurabilityError::Setup)?;
        let auth = PushAuth::from_method(&config.auth).map_err(DurabilityError::Setup)?;
        let paths = RepoPaths::new(git.git_dir().to_path_buf());

        let remote_setup = {
            let _lock = WorktreeLock::acquire(&paths)?;
            git.prepare_branch(&config.branch)
                .map_err(DurabilityError::Setup)?;
            git.ensure_remote(&config.remote_name, &config.url)
                .map_err(DurabilityError::Setup)?
        };

        let policy = RetryPolicy::new(config.retry_attempts, config.retry_delay);
        info!(
            repo = %repo_path.display(),
            remote = %config.remote_name,
            branch = %config.branch,
            auth = auth.name(),
            auto_push = config.auto_push,
            max_attempts = policy.max_attempts(),
            "git durability ready"
        );

        Ok(Self {
            git: Arc::new(Mutex::new(git)),
            paths,
            config,
            auth,
            policy,
            sleeper: Arc::new(TokioSleeper),
            remote_setup,
        })
    }

    /// Replace the backoff sleeper.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Remote settings in effect.
    pub fn config(&self) -> &RemoteSyncConfig {
        &self.config
    }

    /// What [`Git::ensure_remote`] did when opening.
    pub fn remote_setup(&self) -> &RemoteSetup {
        &self.remote_setup
    }

    /// Retry policy for pushes.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Commit message for `path` from the configured template.
    pub fn commit_message(&self, path: &StatePath) -> String {
        self.config
            .commit_message
            .replace(PATH_PLACEHOLDER, path.as_str())
    }

    /// Current HEAD commit.
    pub async fn head(&self) -> Result<Option<CommitHash>, DurabilityError> {
        self.with_repo(|git| git.head_commit())
            .await?
            .map_err(DurabilityError::Commit)
    }

    /// Commit `path` with `message` under the skip-if-unchanged policy.
    pub async fn commit(
        &self,
        path: &StatePath,
        message: &str,
    ) -> Result<CommitOutcome, DurabilityError> {
        let path = path.clone();
        let message = message.to_string();
        let author = self.config.author.clone();
        self.with_repo(move |git| git.commit_file(&path, &message, &author))
            .await?
            .map_err(DurabilityError::Commit)
    }

    /// Push the configured branch with retries.
    ///
    /// Returns the number of attempts made.
    pub async fn push(&self, cancel: &CancellationToken) -> Result<u32, RetryError> {
        retry_with_backoff(&self.policy, self.sleeper.as_ref(), cancel, |attempt| {
            let remote = self.config.remote_name.clone();
            let branch = self.config.branch.clone();
            let auth = self.auth.clone();
            async move {
                self.with_repo(move |git| git.push(&remote, &branch, &auth))
                    .await
                    .unwrap_or_else(|e| {
                        Err(GitError::AccessError {
                            message: e.to_string(),
                        })
                    })
                    .map(|()| attempt)
            }
        })
        .await
    }

    /// Commit `path`, then push if auto-push is enabled.
    ///
    /// The push runs even when the commit was skipped so that earlier
    /// unpushed commits are delivered.
    pub async fn commit_and_push(
        &self,
        path: &StatePath,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, DurabilityError> {
        let commit = self.commit(path, message).await?;

        if !self.config.auto_push {
            return Ok(SyncReport {
                commit,
                pushed: false,
                push_attempts: 0,
            });
        }

        match self.push(cancel).await {
            Ok(push_attempts) => Ok(SyncReport {
                commit,
                pushed: true,
                push_attempts,
            }),
            Err(source) => {
                let commit = commit.record().cloned();
                match &commit {
                    Some(record) => error!(
                        path = %path,
                        commit = %record.hash.short(7),
                        attempts = source.attempts(),
                        error = %source,
                        "push failed; commit kept locally"
                    ),
                    None => warn!(
                        path = %path,
                        attempts = source.attempts(),
                        error = %source,
                        "push failed with no new commit"
                    ),
                }
                Err(DurabilityError::Push { commit, source })
            }
        }
    }

    async fn with_repo<T, F>(&self, f: F) -> Result<Result<T, GitError>, DurabilityError>
    where
        F: FnOnce(&Git) -> Result<T, GitError> + Send + 'static,
        T: Send + 'static,
    {
        let git = Arc::clone(&self.git);
        let paths = self.paths.clone();

        tokio::task::spawn_blocking(move || -> Result<Result<T, GitError>, DurabilityError> {
            let guard = git.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let _lock = WorktreeLock::acquire(&paths)?;
            Ok(f(&*guard))
        })
        .await
        .map_err(|e| DurabilityError::Task(e.to_string()))?
    }
}
