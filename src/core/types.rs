//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`StatePath`] - Validated relative identifier of one state file
//! - [`HolderId`] - Opaque identity of a lock holder
//! - [`BranchName`] - Validated Git branch name
//! - [`CommitHash`] - Git commit identifier (SHA)
//!
//! # Validation
//!
//! These types enforce validity at construction time. A `StatePath` that
//! escapes the state root or points into `.git` cannot be represented.
//!
//! # Examples
//!
//! ```
//! use gitstate::core::types::{BranchName, HolderId, StatePath};
//!
//! let path = StatePath::new("envs/dev/terraform.tfstate").unwrap();
//! assert_eq!(path.as_str(), "envs/dev/terraform.tfstate");
//!
//! assert!(StatePath::new("../etc/passwd").is_err());
//! assert!(HolderId::new("").is_err());
//! assert!(BranchName::new("invalid..name").is_err());
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid state path: {0}")]
    InvalidStatePath(String),

    #[error("invalid lock holder: {0}")]
    InvalidHolder(String),

    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid commit hash: {0}")]
    InvalidCommitHash(String),
}

/// A validated, root-relative state path.
///
/// State paths are `/`-separated and must stay inside the state root:
/// - Cannot be empty or absolute
/// - Cannot contain empty, `.` or `..` components
/// - Cannot contain a `.git` component
/// - Cannot contain backslashes or control characters
///
/// # Example
///
/// ```
/// use gitstate::core::types::StatePath;
/// use std::path::Path;
///
/// let path = StatePath::new("envs/prod/network.tfstate").unwrap();
/// assert_eq!(
///     path.under(Path::new("/srv/state")),
///     Path::new("/srv/state/envs/prod/network.tfstate")
/// );
///
/// assert!(StatePath::new("/abs/path").is_err());
/// assert!(StatePath::new("a//b").is_err());
/// assert!(StatePath::new(".git/config").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StatePath(String);

impl StatePath {
    /// Create a new validated state path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidStatePath` if the path could escape the
    /// state root or is otherwise malformed.
    pub fn new(path: impl Into<String>) -> Result<Self, TypeError> {
        let path = path.into();
        Self::validate(&path)?;
        Ok(Self(path))
    }

    fn validate(path: &str) -> Result<(), TypeError> {
        if path.is_empty() {
            return Err(TypeError::InvalidStatePath(
                "state path cannot be empty".into(),
            ));
        }
        if path.starts_with('/') {
            return Err(TypeError::InvalidStatePath(format!(
                "state path must be relative: {path}"
            )));
        }
        if path.contains('\\') {
            return Err(TypeError::InvalidStatePath(format!(
                "state path cannot contain '\\': {path}"
            )));
        }
        if path.chars().any(|c| c.is_control()) {
            return Err(TypeError::InvalidStatePath(
                "state path cannot contain control characters".into(),
            ));
        }

        for component in path.split('/') {
            match component {
                "" => {
                    return Err(TypeError::InvalidStatePath(format!(
                        "state path has an empty component: {path}"
                    )))
                }
                "." | ".." => {
                    return Err(TypeError::InvalidStatePath(format!(
                        "state path cannot contain '{component}': {path}"
                    )))
                }
                ".git" => {
                    return Err(TypeError::InvalidStatePath(format!(
                        "state path cannot point into .git: {path}"
                    )))
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Get the state path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path relative to the repository root.
    pub fn as_relative(&self) -> &Path {
        Path::new(&self.0)
    }

    /// Resolve the path under a root directory.
    pub fn under(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl TryFrom<String> for StatePath {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<StatePath> for String {
    fn from(path: StatePath) -> Self {
        path.0
    }
}

impl AsRef<str> for StatePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StatePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity of the party holding a lock.
///
/// This is the caller's lock ID, kept separate from the path it locks so
/// that a second party presenting the same path is detected as a conflict.
///
/// # Example
///
/// ```
/// use gitstate::core::types::HolderId;
///
/// let holder = HolderId::new("7f1c2e9a-runner-42").unwrap();
/// assert_eq!(holder.as_str(), "7f1c2e9a-runner-42");
///
/// let generated = HolderId::generate();
/// assert_ne!(generated, HolderId::generate());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HolderId(String);

impl HolderId {
    /// Maximum accepted length of a holder id.
    pub const MAX_LEN: usize = 256;

    /// Create a new validated holder id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidHolder` if the id is empty, too long, or
    /// contains control characters.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(TypeError::InvalidHolder("holder id cannot be empty".into()));
        }
        if id.len() > Self::MAX_LEN {
            return Err(TypeError::InvalidHolder(format!(
                "holder id longer than {} bytes",
                Self::MAX_LEN
            )));
        }
        if id.chars().any(|c| c.is_control()) {
            return Err(TypeError::InvalidHolder(
                "holder id cannot contain control characters".into(),
            ));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random holder id (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the holder id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HolderId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<HolderId> for String {
    fn from(id: HolderId) -> Self {
        id.0
    }
}

impl std::fmt::Display for HolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated Git branch name.
///
/// Branch names must conform to Git's refname rules (see `git check-ref-format`):
/// - Cannot be empty or exactly `@`
/// - Cannot start with `.` or `-`
/// - Cannot end with `.lock` or `/`
/// - Cannot contain `..`, `@{`, `//`, or ASCII control characters
/// - Cannot contain spaces, `~`, `^`, `:`, `\`, `?`, `*`, `[`
///
/// # Example
///
/// ```
/// use gitstate::core::types::BranchName;
///
/// let name = BranchName::new("main").unwrap();
/// assert_eq!(name.as_str(), "main");
/// assert_eq!(name.refspec(), "refs/heads/main:refs/heads/main");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new("branch.lock").is_err());
/// assert!(BranchName::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be empty".into(),
            ));
        }
        if name == "@" {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be '@' (reserved)".into(),
            ));
        }
        if name.starts_with('.') || name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(format!(
                "branch name cannot start with '{}'",
                &name[..1]
            )));
        }
        if name.ends_with(".lock") || name.ends_with('/') {
            return Err(TypeError::InvalidBranchName(format!(
                "branch name cannot end with '.lock' or '/': {name}"
            )));
        }
        for pattern in ["..", "@{", "//"] {
            if name.contains(pattern) {
                return Err(TypeError::InvalidBranchName(format!(
                    "branch name cannot contain '{pattern}'"
                )));
            }
        }

        const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
        for c in INVALID_CHARS {
            if name.contains(c) {
                return Err(TypeError::InvalidBranchName(format!(
                    "branch name cannot contain '{c}'"
                )));
            }
        }
        if name.chars().any(|c| c.is_ascii_control()) {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot contain control characters".into(),
            ));
        }

        for component in name.split('/') {
            if component.starts_with('.') || component.ends_with(".lock") {
                return Err(TypeError::InvalidBranchName(format!(
                    "invalid path component '{component}'"
                )));
            }
        }

        Ok(())
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The full ref name (`refs/heads/<branch>`).
    pub fn refname(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// Refspec pushing this branch to the same name on the remote.
    pub fn refspec(&self) -> String {
        let refname = self.refname();
        format!("{refname}:{refname}")
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Git commit identifier (SHA-1 or SHA-256), normalized to lowercase.
///
/// # Example
///
/// ```
/// use gitstate::core::types::CommitHash;
///
/// let hash = CommitHash::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(hash.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(hash.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitHash(String);

impl CommitHash {
    /// Create a new validated commit hash.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidCommitHash` if the string is not a 40 or
    /// 64 character hex id.
    pub fn new(hash: impl Into<String>) -> Result<Self, TypeError> {
        let hash = hash.into().to_ascii_lowercase();
        if hash.len() != 40 && hash.len() != 64 {
            return Err(TypeError::InvalidCommitHash(format!(
                "expected 40 or 64 hex characters, got {}",
                hash.len()
            )));
        }
        if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidCommitHash(
                "commit hash must be hexadecimal".into(),
            ));
        }
        Ok(Self(hash))
    }

    /// Abbreviated form: the first `len` characters.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    /// Get the commit hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CommitHash {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CommitHash> for String {
    fn from(hash: CommitHash) -> Self {
        hash.0
    }
}

impl std::fmt::Display for CommitHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod state_path {
        use super::*;

        #[test]
        fn valid_state_paths() {
            assert!(StatePath::new("terraform.tfstate").is_ok());
            assert!(StatePath::new("envs/dev/terraform.tfstate").is_ok());
            assert!(StatePath::new("team-a/net.work/state.json").is_ok());
            assert!(StatePath::new(".hidden/state").is_ok());
        }

        #[test]
        fn empty_rejected() {
            assert!(StatePath::new("").is_err());
        }

        #[test]
        fn absolute_rejected() {
            assert!(StatePath::new("/etc/passwd").is_err());
        }

        #[test]
        fn traversal_rejected() {
            assert!(StatePath::new("..").is_err());
            assert!(StatePath::new("../outside").is_err());
            assert!(StatePath::new("envs/../../outside").is_err());
            assert!(StatePath::new("envs/./dev").is_err());
        }

        #[test]
        fn git_dir_rejected() {
            assert!(StatePath::new(".git").is_err());
            assert!(StatePath::new("nested/.git/config").is_err());
        }

        #[test]
        fn empty_components_rejected() {
            assert!(StatePath::new("a//b").is_err());
            assert!(StatePath::new("a/b/").is_err());
        }

        #[test]
        fn backslash_and_control_rejected() {
            assert!(StatePath::new("a\\b").is_err());
            assert!(StatePath::new("a\nb").is_err());
        }

        #[test]
        fn under_joins_root() {
            let path = StatePath::new("envs/dev/terraform.tfstate").unwrap();
            assert_eq!(
                path.under(Path::new("/srv")),
                PathBuf::from("/srv/envs/dev/terraform.tfstate")
            );
            assert_eq!(
                path.as_relative(),
                Path::new("envs/dev/terraform.tfstate")
            );
        }

        #[test]
        fn serde_validates() {
            let ok: Result<StatePath, _> = serde_json::from_str("\"envs/dev\"");
            assert!(ok.is_ok());
            let bad: Result<StatePath, _> = serde_json::from_str("\"../x\"");
            assert!(bad.is_err());
        }
    }

    mod holder_id {
        use super::*;

        #[test]
        fn valid_holder() {
            assert_eq!(HolderId::new("abc").unwrap().as_str(), "abc");
        }

        #[test]
        fn blank_rejected() {
            assert!(HolderId::new("").is_err());
            assert!(HolderId::new("   ").is_err());
        }

        #[test]
        fn too_long_rejected() {
            assert!(HolderId::new("x".repeat(HolderId::MAX_LEN + 1)).is_err());
            assert!(HolderId::new("x".repeat(HolderId::MAX_LEN)).is_ok());
        }

        #[test]
        fn generated_ids_are_valid_and_distinct() {
            let a = HolderId::generate();
            let b = HolderId::generate();
            assert_ne!(a, b);
            assert!(HolderId::new(a.as_str()).is_ok());
        }
    }

    mod branch_name {
        use super::*;

        #[test]
        fn valid_branch_names() {
            assert!(BranchName::new("main").is_ok());
            assert!(BranchName::new("feature/foo").is_ok());
            assert!(BranchName::new("user@feature").is_ok());
        }

        #[test]
        fn invalid_branch_names() {
            assert!(BranchName::new("").is_err());
            assert!(BranchName::new("@").is_err());
            assert!(BranchName::new(".hidden").is_err());
            assert!(BranchName::new("-flag").is_err());
            assert!(BranchName::new("foo/bar.lock").is_err());
            assert!(BranchName::new("a..b").is_err());
            assert!(BranchName::new("a~b").is_err());
        }

        #[test]
        fn refspec_format() {
            let branch = BranchName::new("release/v1").unwrap();
            assert_eq!(branch.refname(), "refs/heads/release/v1");
            assert_eq!(
                branch.refspec(),
                "refs/heads/release/v1:refs/heads/release/v1"
            );
        }
    }

    mod commit_hash {
        use super::*;

        #[test]
        fn normalizes_case() {
            let hash = CommitHash::new("ABCDEF0123456789ABCDEF0123456789ABCDEF01").unwrap();
            assert_eq!(hash.as_str(), "abcdef0123456789abcdef0123456789abcdef01");
        }

        #[test]
        fn rejects_bad_length_and_chars() {
            assert!(CommitHash::new("abc").is_err());
            assert!(CommitHash::new("g".repeat(40)).is_err());
        }

        #[test]
        fn short_clamps() {
            let hash = CommitHash::new("a".repeat(40)).unwrap();
            assert_eq!(hash.short(7).len(), 7);
            assert_eq!(hash.short(100).len(), 40);
        }
    }
}
