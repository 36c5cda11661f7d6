//! git::interface
//!
//! Git interface implementation using git2.
//!
//! This module is the **single doorway** to the repository that backs the
//! state store. All reads and writes of git objects, refs and remotes flow
//! through [`Git`], which returns structured results and normalizes errors
//! into typed failure categories.
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: The configured path is not a repository
//! - [`GitError::AuthFailed`]: The remote refused our credentials
//! - [`GitError::Rejected`]: The remote refused the ref update
//! - [`GitError::Network`]: Transport-level failure talking to the remote
//!
//! The push retry loop relies on these categories before it falls back to
//! inspecting messages.
//!
//! # Example
//!
//! ```ignore
//! use gitstate::git::{Git, CommitOutcome};
//!
//! let git = Git::open(Path::new("/srv/state"))?;
//! git.ensure_remote("origin", "git@github.com:org/state.git")?;
//! match git.commit_file(&path, "update state", &author)? {
//!     CommitOutcome::Committed(record) => println!("committed {}", record.hash),
//!     CommitOutcome::Unchanged => println!("nothing to commit"),
//! }
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use super::auth::PushAuth;
use crate::core::config::CommitAuthor;
use crate::core::types::{BranchName, CommitHash, StatePath, TypeError};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The path is not a git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
    },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// The named remote does not exist.
    #[error("remote not found: {name}")]
    RemoteNotFound {
        /// Remote name
        name: String,
    },

    /// Push credentials are unusable before contacting the remote.
    #[error("invalid push authentication: {message}")]
    InvalidAuth {
        /// Description of the problem
        message: String,
    },

    /// The remote rejected our credentials.
    #[error("authentication failed: {message}")]
    AuthFailed {
        /// Message from libgit2 or the remote
        message: String,
    },

    /// The remote rejected the ref update (non-fast-forward, hooks, ...).
    #[error("push rejected for {refname}: {message}")]
    Rejected {
        /// The ref that was refused
        refname: String,
        /// Reason reported by the remote
        message: String,
    },

    /// Transport failure talking to the remote.
    #[error("network error: {message}")]
    Network {
        /// Message from libgit2
        message: String,
    },

    /// Permission or filesystem error, including locked index files.
    #[error("repository access error: {message}")]
    AccessError {
        /// Description of the error
        message: String,
    },

    /// HEAD is on a different branch than the one we push.
    #[error("HEAD is on '{actual}' but the configured branch is '{expected}'")]
    BranchMismatch {
        /// Configured branch
        expected: String,
        /// Branch (or `HEAD` when detached) the working tree is on
        actual: String,
    },

    /// Invalid path, branch or hash.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] TypeError),

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with context.
    pub(crate) fn from_git2(err: git2::Error, context: &str) -> Self {
        let message = format!("{}: {}", context, err.message());
        match (err.code(), err.class()) {
            (git2::ErrorCode::Auth, _) => GitError::AuthFailed { message },
            (git2::ErrorCode::NotFastForward, _) => GitError::Rejected {
                refname: context.to_string(),
                message: "non-fast-forward".to_string(),
            },
            (git2::ErrorCode::Conflict | git2::ErrorCode::MergeConflict, _) => {
                GitError::Rejected {
                    refname: context.to_string(),
                    message: format!("conflict: {}", err.message()),
                }
            }
            (git2::ErrorCode::Locked, _) => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            (
                _,
                git2::ErrorClass::Net
                | git2::ErrorClass::Ssh
                | git2::ErrorClass::Http
                | git2::ErrorClass::Ssl,
            ) => GitError::Network { message },
            _ => GitError::Internal { message },
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        GitError::from_git2(err, "git")
    }
}

/// Result of [`Git::ensure_remote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSetup {
    /// The remote did not exist and was added.
    Created,
    /// The remote already pointed at the URL.
    Unchanged,
    /// The remote pointed elsewhere and was recreated.
    Replaced {
        /// URL it pointed at before
        previous: String,
    },
}

/// A commit created for one state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// Commit hash
    pub hash: CommitHash,
    /// Author identity
    pub author: CommitAuthor,
    /// Full commit message
    pub message: String,
    /// The staged state file
    pub path: StatePath,
    /// Author timestamp
    pub timestamp: DateTime<Utc>,
}

/// Result of [`Git::commit_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new commit was created on HEAD.
    Committed(CommitRecord),
    /// The file matched HEAD; no commit was created.
    Unchanged,
}

impl CommitOutcome {
    /// The created commit, if any.
    pub fn record(&self) -> Option<&CommitRecord> {
        match self {
            CommitOutcome::Committed(record) => Some(record),
            CommitOutcome::Unchanged => None,
        }
    }
}

/// Information about a commit.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    /// The commit hash
    pub hash: CommitHash,
    /// Full commit message
    pub message: String,
    /// Author name
    pub author_name: String,
    /// Author email
    pub author_email: String,
    /// Number of parents
    pub parent_count: usize,
}

/// The Git interface.
///
/// Wraps one non-bare repository opened at an exact path. Not `Sync`:
/// callers share it behind a mutex.
pub struct Git {
    repo: git2::Repository,
    workdir: PathBuf,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Repository Opening and Info
    // =========================================================================

    /// Open the repository at exactly `path`.
    ///
    /// Parent directories are not searched: the configured state root must
    /// itself be the working directory of a repository.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if `path` is not a repository
    /// - [`GitError::BareRepo`] if the repository has no working directory
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;

        if repo.is_bare() {
            return Err(GitError::BareRepo);
        }
        let workdir = repo.workdir().ok_or(GitError::BareRepo)?.to_path_buf();

        debug!(path = %path.display(), "opened repository");
        Ok(Self { repo, workdir })
    }

    /// The .git directory.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// The working directory (state root).
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    // =========================================================================
    // Refs and Commits
    // =========================================================================

    /// Hash of the commit HEAD points at, `None` while HEAD is unborn.
    pub fn head_commit(&self) -> Result<Option<CommitHash>, GitError> {
        match self.head_commit_object()? {
            Some(commit) => Ok(Some(CommitHash::new(commit.id().to_string())?)),
            None => Ok(None),
        }
    }

    /// Make sure commits land on `branch`.
    ///
    /// An unborn HEAD is pointed at `branch` so the first commit lands
    /// there. Once HEAD has a commit it must already be on `branch`.
    ///
    /// # Errors
    ///
    /// [`GitError::BranchMismatch`] if HEAD is on another branch or detached.
    pub fn prepare_branch(&self, branch: &BranchName) -> Result<(), GitError> {
        if self.head_commit_object()?.is_none() {
            self.repo
                .set_head(&branch.refname())
                .map_err(|e| GitError::from_git2(e, "HEAD"))?;
            debug!(branch = %branch, "pointed unborn HEAD at branch");
            return Ok(());
        }

        let head = self
            .repo
            .head()
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;
        if head.is_branch() && head.name() == Some(branch.refname().as_str()) {
            return Ok(());
        }
        Err(GitError::BranchMismatch {
            expected: branch.to_string(),
            actual: head.shorthand().unwrap_or("HEAD").to_string(),
        })
    }

    /// Read commit metadata.
    pub fn commit_info(&self, hash: &CommitHash) -> Result<CommitInfo, GitError> {
        let oid =
            git2::Oid::from_str(hash.as_str()).map_err(|e| GitError::from_git2(e, hash.as_str()))?;
        let commit = self
            .repo
            .find_commit(oid)
            .map_err(|e| GitError::from_git2(e, hash.as_str()))?;
        let author = commit.author();

        Ok(CommitInfo {
            hash: hash.clone(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            parent_count: commit.parent_count(),
        })
    }

    /// Stage exactly `path` and commit it on HEAD.
    ///
    /// When the resulting tree equals HEAD's tree no commit is created and
    /// [`CommitOutcome::Unchanged`] is returned. An unborn HEAD produces a
    /// root commit.
    pub fn commit_file(
        &self,
        path: &StatePath,
        message: &str,
        author: &CommitAuthor,
    ) -> Result<CommitOutcome, GitError> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        index
            .add_path(path.as_relative())
            .map_err(|e| GitError::from_git2(e, path.as_str()))?;
        index
            .write()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        let tree_oid = index
            .write_tree()
            .map_err(|e| GitError::from_git2(e, "write tree"))?;

        let parent = self.head_commit_object()?;
        if let Some(parent) = &parent {
            if parent.tree_id() == tree_oid {
                debug!(path = %path, "tree unchanged, skipping commit");
                return Ok(CommitOutcome::Unchanged);
            }
        }

        let tree = self
            .repo
            .find_tree(tree_oid)
            .map_err(|e| GitError::from_git2(e, "tree"))?;
        let signature = git2::Signature::now(&author.name, &author.email)
            .map_err(|e| GitError::from_git2(e, "signature"))?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let oid = self
            .repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                message,
                &tree,
                &parents,
            )
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;

        let timestamp = DateTime::from_timestamp(signature.when().seconds(), 0)
            .unwrap_or_else(Utc::now);
        let record = CommitRecord {
            hash: CommitHash::new(oid.to_string())?,
            author: author.clone(),
            message: message.to_string(),
            path: path.clone(),
            timestamp,
        };

        info!(path = %path, commit = %record.hash.short(7), "committed state");
        Ok(CommitOutcome::Committed(record))
    }

    fn head_commit_object(&self) -> Result<Option<git2::Commit<'_>>, GitError> {
        match self.repo.head() {
            Ok(head) => head
                .peel_to_commit()
                .map(Some)
                .map_err(|e| GitError::from_git2(e, "HEAD")),
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                Ok(None)
            }
            Err(e) => Err(GitError::from_git2(e, "HEAD")),
        }
    }

    // =========================================================================
    // Remote Operations
    // =========================================================================

    /// Get the URL for a remote.
    ///
    /// Returns `None` if the remote doesn't exist.
    pub fn remote_url(&self, name: &str) -> Result<Option<String>, GitError> {
        match self.repo.find_remote(name) {
            Ok(remote) => Ok(remote.url().map(String::from)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, name)),
        }
    }

    /// Make remote `name` point at `url`.
    ///
    /// A remote with a different URL is deleted and recreated.
    pub fn ensure_remote(&self, name: &str, url: &str) -> Result<RemoteSetup, GitError> {
        match self.remote_url(name)? {
            Some(current) if current == url => Ok(RemoteSetup::Unchanged),
            Some(previous) => {
                self.repo
                    .remote_delete(name)
                    .map_err(|e| GitError::from_git2(e, name))?;
                self.repo
                    .remote(name, url)
                    .map_err(|e| GitError::from_git2(e, name))?;
                info!(remote = name, url, previous = %previous, "replaced remote");
                Ok(RemoteSetup::Replaced { previous })
            }
            None => {
                self.repo
                    .remote(name, url)
                    .map_err(|e| GitError::from_git2(e, name))?;
                info!(remote = name, url, "created remote");
                Ok(RemoteSetup::Created)
            }
        }
    }

    /// Push `branch` to the remote once.
    ///
    /// Ref updates refused by the remote are errors. Nothing to push is
    /// success.
    pub fn push(
        &self,
        remote_name: &str,
        branch: &BranchName,
        auth: &PushAuth,
    ) -> Result<(), GitError> {
        let mut remote = match self.repo.find_remote(remote_name) {
            Ok(remote) => remote,
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                return Err(GitError::RemoteNotFound {
                    name: remote_name.to_string(),
                })
            }
            Err(e) => return Err(GitError::from_git2(e, remote_name)),
        };
        let config = self
            .repo
            .config()
            .map_err(|e| GitError::from_git2(e, "config"))?;
        let refspec = branch.refspec();

        let mut rejection: Option<(String, String)> = None;
        let result = {
            let mut credential_calls = 0u32;
            let mut callbacks = git2::RemoteCallbacks::new();
            callbacks.credentials(|url, username, allowed| {
                credential_calls += 1;
                auth.credentials(&config, url, username, allowed, credential_calls)
            });
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    rejection = Some((refname.to_string(), message.to_string()));
                }
                Ok(())
            });

            let mut options = git2::PushOptions::new();
            options.remote_callbacks(callbacks);
            remote.push(&[refspec.as_str()], Some(&mut options))
        };

        match result {
            Ok(()) => {}
            Err(e) if is_up_to_date(e.message()) => {
                debug!(remote = remote_name, branch = %branch, "remote already up to date");
                return Ok(());
            }
            Err(e) => return Err(GitError::from_git2(e, &branch.refname())),
        }

        if let Some((refname, message)) = rejection {
            return Err(GitError::Rejected { refname, message });
        }

        info!(remote = remote_name, branch = %branch, auth = auth.name(), "pushed");
        Ok(())
    }
}

fn is_up_to_date(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("up to date") || lower.contains("up-to-date")
}
