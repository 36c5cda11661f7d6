//! core::paths
//!
//! Path routing and expansion helpers.
//!
//! # Expansion
//!
//! Configuration values such as SSH key paths, identity files and tokens may
//! reference the environment (`$VAR` or `${VAR}`) and the home directory
//! (`~/`). Unset variables expand to the empty string.
//!
//! # Storage Layout
//!
//! Backend-private files live under `<git_dir>/gitstate/`:
//! - `lock` - Exclusive worktree lock file
//!
//! # Example
//!
//! ```
//! use gitstate::core::paths::{expand_env, RepoPaths};
//! use std::path::PathBuf;
//!
//! std::env::set_var("GITSTATE_DOC_USER", "ops");
//! assert_eq!(expand_env("key-$GITSTATE_DOC_USER"), "key-ops");
//!
//! let paths = RepoPaths::new(PathBuf::from("/repo/.git"));
//! assert_eq!(paths.lock_path(), PathBuf::from("/repo/.git/gitstate/lock"));
//! ```

use std::path::PathBuf;

/// Locations of backend-private files inside a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPaths {
    /// Path to the repository's .git directory.
    pub git_dir: PathBuf,
}

impl RepoPaths {
    /// Create paths rooted at a .git directory.
    pub fn new(git_dir: PathBuf) -> Self {
        Self { git_dir }
    }

    /// Directory holding backend-private files (`<git_dir>/gitstate`).
    pub fn private_dir(&self) -> PathBuf {
        self.git_dir.join("gitstate")
    }

    /// The worktree lock file (`<git_dir>/gitstate/lock`).
    pub fn lock_path(&self) -> PathBuf {
        self.private_dir().join("lock")
    }
}

/// Expand `$VAR` and `${VAR}` references from the process environment.
///
/// Unset variables expand to the empty string. A `$` that does not start a
/// variable reference is kept as-is.
pub fn expand_env(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expand variable references using a custom lookup.
pub fn expand_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                let name = &braced[..end];
                out.push_str(&lookup(name).unwrap_or_default());
                rest = &braced[end + 1..];
                continue;
            }
            // Unterminated brace: keep the text literally
            out.push('$');
            rest = after;
            continue;
        }

        let name_len = after
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .count();
        let starts_with_digit = after.chars().next().is_some_and(|c| c.is_ascii_digit());

        if name_len == 0 || starts_with_digit {
            out.push('$');
            rest = after;
            continue;
        }

        let name = &after[..name_len];
        out.push_str(&lookup(name).unwrap_or_default());
        rest = &after[name_len..];
    }

    out.push_str(rest);
    out
}

/// Expand a leading `~` or `~/` to the home directory.
///
/// Returns the path unchanged if there is no home directory or no tilde.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand environment references, then the home directory.
pub fn expand_path(path: &str) -> PathBuf {
    expand_home(&expand_env(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HOME_DIR" => Some("/home/ops".to_string()),
            "TOKEN" => Some("s3cr3t".to_string()),
            "A_1" => Some("x".to_string()),
            _ => None,
        }
    }

    #[test]
    fn plain_text_unchanged() {
        assert_eq!(expand_with("no variables here", lookup), "no variables here");
    }

    #[test]
    fn bare_variable() {
        assert_eq!(expand_with("$TOKEN", lookup), "s3cr3t");
        assert_eq!(expand_with("$HOME_DIR/.ssh/id", lookup), "/home/ops/.ssh/id");
    }

    #[test]
    fn braced_variable() {
        assert_eq!(expand_with("${TOKEN}", lookup), "s3cr3t");
        assert_eq!(expand_with("pre${A_1}post", lookup), "prexpost");
    }

    #[test]
    fn unset_variable_is_empty() {
        assert_eq!(expand_with("$MISSING", lookup), "");
        assert_eq!(expand_with("a${MISSING}b", lookup), "ab");
    }

    #[test]
    fn lone_dollar_kept() {
        assert_eq!(expand_with("cost: $", lookup), "cost: $");
        assert_eq!(expand_with("$-x", lookup), "$-x");
        assert_eq!(expand_with("${unterminated", lookup), "${unterminated");
    }

    #[test]
    fn digit_start_not_a_name() {
        assert_eq!(expand_with("$1abc", lookup), "$1abc");
    }

    #[test]
    fn home_expansion() {
        let expanded = expand_home("~/keys/id");
        assert!(expanded.ends_with("keys/id"));
        if dirs::home_dir().is_some() {
            assert!(!expanded.to_string_lossy().starts_with('~'));
        }

        assert_eq!(expand_home("/abs/key"), PathBuf::from("/abs/key"));
        assert_eq!(expand_home("rel/~/key"), PathBuf::from("rel/~/key"));
    }

    #[test]
    fn repo_paths_layout() {
        let paths = RepoPaths::new(PathBuf::from("/r/.git"));
        assert_eq!(paths.private_dir(), PathBuf::from("/r/.git/gitstate"));
        assert_eq!(paths.lock_path(), PathBuf::from("/r/.git/gitstate/lock"));
    }
}
