//! Integration tests for the git durability layer.
//!
//! These tests use real git repositories created via tempfile, with a local
//! bare repository acting as the push remote.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use gitstate::core::config::{AuthMethod, CommitAuthor, RemoteSyncConfig};
use gitstate::core::types::{BranchName, StatePath};
use gitstate::git::retry::RecordingSleeper;
use gitstate::git::{
    CommitOutcome, DurabilityError, Git, GitDurability, GitError, RemoteSetup, RetryError,
};

// =============================================================================
// Test Fixtures
// =============================================================================

/// A working repository plus a bare remote.
struct TestRepo {
    dir: TempDir,
    remote: TempDir,
}

impl TestRepo {
    /// Create an empty working repository on `main` and an empty bare remote.
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        run_git(dir.path(), &["init", "-b", "main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);

        let remote = TempDir::new().expect("failed to create temp dir");
        run_git(remote.path(), &["init", "--bare", "-b", "main"]);

        Self { dir, remote }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn remote_url(&self) -> String {
        self.remote.path().to_string_lossy().into_owned()
    }

    fn config(&self) -> RemoteSyncConfig {
        RemoteSyncConfig {
            url: self.remote_url(),
            remote_name: "origin".to_string(),
            branch: BranchName::new("main").unwrap(),
            auth: AuthMethod::Default,
            auto_push: true,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(100),
            commit_message: "state: update {path}".to_string(),
            author: CommitAuthor::default(),
        }
    }

    fn durability(&self, config: RemoteSyncConfig) -> (Arc<RecordingSleeper>, GitDurability) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let durability = GitDurability::open(self.path(), config)
            .expect("failed to open durability")
            .with_sleeper(sleeper.clone());
        (sleeper, durability)
    }

    fn write(&self, path: &str, content: &str) {
        let full = self.path().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }

    fn commit_count(&self) -> usize {
        git_output(self.path(), &["rev-list", "--count", "HEAD"])
            .parse()
            .unwrap()
    }

    fn remote_head(&self) -> Option<String> {
        let output = Command::new("git")
            .args(["rev-parse", "refs/heads/main"])
            .current_dir(self.remote.path())
            .output()
            .expect("git rev-parse failed");
        output
            .status
            .success()
            .then(|| String::from_utf8(output.stdout).unwrap().trim().to_string())
    }
}

fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn git_output(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(output.status.success(), "git {:?} failed", args);
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

fn path(s: &str) -> StatePath {
    StatePath::new(s).unwrap()
}

// =============================================================================
// Opening
// =============================================================================

#[test]
fn open_rejects_non_repository() {
    let dir = TempDir::new().unwrap();
    let repo = TestRepo::new();
    let err = GitDurability::open(dir.path(), repo.config()).unwrap_err();
    assert!(matches!(
        err,
        DurabilityError::Setup(GitError::NotARepo { .. })
    ));
}

#[test]
fn open_does_not_search_parents() {
    let repo = TestRepo::new();
    let nested = repo.path().join("envs");
    std::fs::create_dir_all(&nested).unwrap();

    assert!(matches!(
        Git::open(&nested),
        Err(GitError::NotARepo { .. })
    ));
}

#[test]
fn open_rejects_missing_ssh_key() {
    let repo = TestRepo::new();
    let mut config = repo.config();
    config.auth = AuthMethod::Ssh {
        key_path: PathBuf::from("/nonexistent/id_ed25519"),
    };
    let err = GitDurability::open(repo.path(), config).unwrap_err();
    assert!(matches!(
        err,
        DurabilityError::Setup(GitError::InvalidAuth { .. })
    ));
}

#[test]
fn open_rejects_checkout_on_other_branch() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["checkout", "-b", "feature"]);
    repo.write("seed.txt", "seed");
    run_git(repo.path(), &["add", "seed.txt"]);
    run_git(repo.path(), &["commit", "-m", "seed"]);

    let err = GitDurability::open(repo.path(), repo.config()).unwrap_err();
    match err {
        DurabilityError::Setup(GitError::BranchMismatch { expected, actual }) => {
            assert_eq!(expected, "main");
            assert_eq!(actual, "feature");
        }
        other => panic!("expected BranchMismatch, got {:?}", other),
    }
}

#[test]
fn open_accepts_history_on_configured_branch() {
    let repo = TestRepo::new();
    repo.write("seed.txt", "seed");
    run_git(repo.path(), &["add", "seed.txt"]);
    run_git(repo.path(), &["commit", "-m", "seed"]);

    let (_sleeper, durability) = repo.durability(repo.config());
    drop(durability);
    assert_eq!(repo.commit_count(), 1);
}

#[test]
fn ensure_remote_is_idempotent() {
    let repo = TestRepo::new();

    let (_, first) = repo.durability(repo.config());
    assert_eq!(first.remote_setup(), &RemoteSetup::Created);
    drop(first);

    let (_, second) = repo.durability(repo.config());
    assert_eq!(second.remote_setup(), &RemoteSetup::Unchanged);

    let remotes = git_output(repo.path(), &["remote"]);
    assert_eq!(remotes, "origin");
}

#[test]
fn ensure_remote_replaces_changed_url() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["remote", "add", "origin", "/somewhere/else.git"]);

    let (_, durability) = repo.durability(repo.config());
    assert_eq!(
        durability.remote_setup(),
        &RemoteSetup::Replaced {
            previous: "/somewhere/else.git".to_string()
        }
    );
    assert_eq!(
        git_output(repo.path(), &["remote", "get-url", "origin"]),
        repo.remote_url()
    );
}

// =============================================================================
// Commit and Push
// =============================================================================

#[tokio::test]
async fn commit_and_push_reaches_remote() {
    let repo = TestRepo::new();
    let (sleeper, durability) = repo.durability(repo.config());
    let p = path("envs/dev/terraform.tfstate");
    repo.write(p.as_str(), r#"{"version":4}"#);

    let message = durability.commit_message(&p);
    assert_eq!(message, "state: update envs/dev/terraform.tfstate");

    let report = durability
        .commit_and_push(&p, &message, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.pushed);
    assert_eq!(report.push_attempts, 1);
    assert!(sleeper.sleeps().is_empty());

    let record = report.commit.record().expect("commit expected").clone();
    assert_eq!(repo.remote_head().as_deref(), Some(record.hash.as_str()));

    let info = Git::open(repo.path())
        .unwrap()
        .commit_info(&record.hash)
        .unwrap();
    assert_eq!(info.message, message);
    assert_eq!(info.author_name, CommitAuthor::default().name);
    assert_eq!(info.parent_count, 0);
}

#[tokio::test]
async fn unchanged_file_skips_commit() {
    let repo = TestRepo::new();
    let (_, durability) = repo.durability(repo.config());
    let p = path("a.tfstate");
    let cancel = CancellationToken::new();

    repo.write("a.tfstate", "{}");
    durability.commit_and_push(&p, "first", &cancel).await.unwrap();
    let report = durability.commit_and_push(&p, "second", &cancel).await.unwrap();

    assert_eq!(report.commit, CommitOutcome::Unchanged);
    assert!(report.pushed);
    assert_eq!(repo.commit_count(), 1);
}

#[tokio::test]
async fn only_the_named_file_is_committed() {
    let repo = TestRepo::new();
    let mut config = repo.config();
    config.auto_push = false;
    let (_, durability) = repo.durability(config);

    repo.write("a.tfstate", "{}");
    repo.write("stray.txt", "not state");
    let report = durability
        .commit_and_push(&path("a.tfstate"), "a", &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.pushed);
    assert_eq!(report.push_attempts, 0);
    let files = git_output(repo.path(), &["ls-tree", "--name-only", "HEAD"]);
    assert_eq!(files, "a.tfstate");
    assert_eq!(repo.remote_head(), None);
}

#[tokio::test]
async fn unreachable_remote_exhausts_retries_and_keeps_commit() {
    let repo = TestRepo::new();
    let mut config = repo.config();
    config.url = repo.path().join("missing-remote.git").to_string_lossy().into_owned();
    let (sleeper, durability) = repo.durability(config);
    repo.write("a.tfstate", "{}");

    let err = durability
        .commit_and_push(&path("a.tfstate"), "a", &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        DurabilityError::Push { commit, source } => {
            assert!(commit.is_some());
            assert!(matches!(source, RetryError::Exhausted { attempts: 3, .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
    assert_eq!(repo.commit_count(), 1);
}

#[tokio::test]
async fn rejected_push_is_not_retried() {
    let repo = TestRepo::new();
    let (sleeper, durability) = repo.durability(repo.config());
    let cancel = CancellationToken::new();

    repo.write("a.tfstate", r#"{"serial":1}"#);
    durability
        .commit_and_push(&path("a.tfstate"), "one", &cancel)
        .await
        .unwrap();

    // Someone else moves the remote branch to unrelated history.
    let other = TempDir::new().unwrap();
    run_git(other.path(), &["init", "-b", "main"]);
    run_git(other.path(), &["config", "user.email", "other@example.com"]);
    run_git(other.path(), &["config", "user.name", "Other"]);
    std::fs::write(other.path().join("b.tfstate"), "{}").unwrap();
    run_git(other.path(), &["add", "b.tfstate"]);
    run_git(other.path(), &["commit", "-m", "other"]);
    run_git(
        other.path(),
        &["push", "--force", &repo.remote_url(), "main:main"],
    );

    repo.write("a.tfstate", r#"{"serial":2}"#);
    let err = durability
        .commit_and_push(&path("a.tfstate"), "two", &cancel)
        .await
        .unwrap_err();

    match err {
        DurabilityError::Push { commit, source } => {
            assert!(commit.is_some());
            assert_eq!(source.attempts(), 1);
            assert!(matches!(source, RetryError::Fatal { .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(sleeper.sleeps().is_empty());
    assert_eq!(repo.commit_count(), 2);
}

#[tokio::test]
async fn cancelled_push_reports_cancellation() {
    let repo = TestRepo::new();
    let (_, durability) = repo.durability(repo.config());
    repo.write("a.tfstate", "{}");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = durability
        .commit_and_push(&path("a.tfstate"), "a", &cancel)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DurabilityError::Push {
            source: RetryError::Cancelled { attempts: 0 },
            ..
        }
    ));
    assert_eq!(repo.commit_count(), 1);
    assert_eq!(repo.remote_head(), None);
}
