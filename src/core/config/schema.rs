//! core::config::schema
//!
//! On-disk configuration schema.
//!
//! These types mirror the TOML file one-to-one. Every field is optional so
//! that defaults can be applied and missing keys reported by name during
//! validation (see [`super::BackendConfig::from_file_config`]).
//!
//! # Example
//!
//! ```toml
//! log_level = "info"
//!
//! [repo]
//! path = "/srv/terraform-state"
//!
//! [remote]
//! url = "git@github.com:org/state.git"
//! branch = "main"
//! auth_method = "ssh"
//! ssh_key_path = "~/.ssh/id_ed25519"
//! retry_attempts = 3
//! retry_delay_secs = 5
//!
//! [remote.author]
//! name = "Terraform Backend GitOps"
//! email = "terraform-backend@gitops.local"
//!
//! [encryption]
//! mode = "age"
//! recipient = "age1..."
//! identity_file = "~/.config/age/keys.txt"
//!
//! [lock]
//! backend = "redis"
//! addresses = ["127.0.0.1:6379"]
//! ```

use serde::{Deserialize, Serialize};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Log level filter (e.g. "info", "debug")
    pub log_level: Option<String>,

    /// Local repository settings
    pub repo: Option<RepoSection>,

    /// Remote replication settings
    pub remote: Option<RemoteSection>,

    /// Encryption at rest settings
    pub encryption: Option<EncryptionSection>,

    /// Lock store settings
    pub lock: Option<LockSection>,
}

/// `[repo]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepoSection {
    /// Path to the local git repository holding state files
    pub path: Option<String>,
}

/// `[remote]` section.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteSection {
    /// Whether commits and pushes are enabled (default: true when present)
    pub enabled: Option<bool>,

    /// Remote URL
    pub url: Option<String>,

    /// Remote name (default: "origin")
    pub remote_name: Option<String>,

    /// Branch to push (default: "main")
    pub branch: Option<String>,

    /// Authentication method: "ssh", "token" or "default"
    pub auth_method: Option<String>,

    /// SSH private key path (for `ssh`)
    pub ssh_key_path: Option<String>,

    /// Access token (for `token`), may reference the environment
    pub token: Option<String>,

    /// Commit message template; `{path}` is replaced with the state path
    pub commit_message: Option<String>,

    /// Push after each commit (default: true)
    pub auto_push: Option<bool>,

    /// Maximum push attempts (default: 1)
    pub retry_attempts: Option<i64>,

    /// Base delay between push attempts in seconds (default: 5)
    pub retry_delay_secs: Option<u64>,

    /// Commit author identity
    pub author: Option<AuthorSection>,
}

impl std::fmt::Debug for RemoteSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSection")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("remote_name", &self.remote_name)
            .field("branch", &self.branch)
            .field("auth_method", &self.auth_method)
            .field("ssh_key_path", &self.ssh_key_path)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("commit_message", &self.commit_message)
            .field("auto_push", &self.auto_push)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("author", &self.author)
            .finish()
    }
}

/// `[remote.author]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorSection {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// `[encryption]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EncryptionSection {
    /// "age" (default) or "none"
    pub mode: Option<String>,

    /// age recipient public key (`age1...`)
    pub recipient: Option<String>,

    /// File containing the age identity (`AGE-SECRET-KEY-...`)
    pub identity_file: Option<String>,
}

/// `[lock]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LockSection {
    /// "redis" (default) or "memory"
    pub backend: Option<String>,

    /// Lock store addresses; the first one is used
    pub addresses: Option<Vec<String>>,

    /// Key namespace in the shared store
    pub namespace: Option<String>,

    /// Lock record expiry in seconds (default: 86400)
    pub ttl_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_parses_to_default() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config, FileConfig::default());
    }

    #[test]
    fn full_file_parses() {
        let toml = r#"
            log_level = "debug"

            [repo]
            path = "/srv/state"

            [remote]
            url = "https://example.com/state.git"
            auth_method = "token"
            token = "${TOKEN}"
            retry_attempts = 3

            [remote.author]
            name = "Bot"
            email = "bot@example.com"

            [encryption]
            mode = "none"

            [lock]
            backend = "memory"
            ttl_secs = 60
        "#;
        let config: FileConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        let remote = config.remote.unwrap();
        assert_eq!(remote.retry_attempts, Some(3));
        assert_eq!(remote.author.unwrap().name.as_deref(), Some("Bot"));
        assert_eq!(config.lock.unwrap().ttl_secs, Some(60));
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<FileConfig, _> = toml::from_str("[repo]\nbogus = 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let remote = RemoteSection {
            token: Some("ghp_supersecret".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", remote);
        assert!(!rendered.contains("ghp_supersecret"));
        assert!(rendered.contains("REDACTED"));
    }
}
