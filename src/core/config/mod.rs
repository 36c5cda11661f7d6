//! core::config
//!
//! Configuration loading and validation.
//!
//! # Overview
//!
//! The configuration file is TOML (see [`schema`]). Loading happens in two
//! steps:
//! 1. Parse the file into [`FileConfig`] (all fields optional)
//! 2. Validate into [`BackendConfig`], applying defaults and turning string
//!    modes into tagged variants
//!
//! Any problem found during validation is a [`ConfigError`], which is fatal
//! at startup.
//!
//! # File Location
//!
//! Searched in order:
//! 1. The explicit path passed by the caller (`--config`)
//! 2. `$GITSTATE_CONFIG` if set
//! 3. `./gitstate.toml`
//!
//! # Example
//!
//! ```
//! use gitstate::core::config::{AuthMethod, BackendConfig, EncryptionConfig};
//!
//! let config = BackendConfig::from_toml_str(r#"
//!     [repo]
//!     path = "/srv/state"
//!
//!     [remote]
//!     url = "https://example.com/state.git"
//!     auth_method = "default"
//!
//!     [encryption]
//!     mode = "none"
//!
//!     [lock]
//!     backend = "memory"
//! "#).unwrap();
//!
//! let remote = config.remote.as_ref().unwrap();
//! assert_eq!(remote.branch.as_str(), "main");
//! assert!(matches!(remote.auth, AuthMethod::Default));
//! assert!(matches!(config.encryption, EncryptionConfig::Disabled));
//! ```

pub mod schema;

pub use schema::FileConfig;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::paths::{expand_env, expand_path};
use crate::core::types::BranchName;

/// Default config file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "gitstate.toml";

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "GITSTATE_CONFIG";

/// Default commit message.
pub const DEFAULT_COMMIT_MESSAGE: &str = "chore: update terraform state [automated]";

/// Default commit author name.
pub const DEFAULT_AUTHOR_NAME: &str = "Terraform Backend GitOps";

/// Default commit author email.
pub const DEFAULT_AUTHOR_EMAIL: &str = "terraform-backend@gitops.local";

/// Default lock key namespace.
pub const DEFAULT_LOCK_NAMESPACE: &str = "terraform-backend-gitops";

/// Default lock record expiry (24 hours).
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest accepted lock record expiry (one year).
pub const MAX_LOCK_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default base delay between push attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("missing required config key '{0}'")]
    Missing(&'static str),

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("unsupported {key} '{value}', must be one of: {supported}")]
    UnsupportedMode {
        key: &'static str,
        value: String,
        supported: &'static str,
    },
}

/// Authentication used when pushing to the remote.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// SSH public key authentication with a private key file.
    Ssh {
        /// Expanded path to the private key
        key_path: PathBuf,
    },
    /// HTTP basic auth with a fixed username and the token as password.
    Token {
        /// Expanded token value
        token: String,
    },
    /// No explicit credentials (ssh-agent, credential helpers, ambient trust).
    Default,
}

impl AuthMethod {
    /// Name of the mode as written in the config file.
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::Ssh { .. } => "ssh",
            AuthMethod::Token { .. } => "token",
            AuthMethod::Default => "default",
        }
    }
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::Ssh { key_path } => {
                f.debug_struct("Ssh").field("key_path", key_path).finish()
            }
            AuthMethod::Token { .. } => f
                .debug_struct("Token")
                .field("token", &"[REDACTED]")
                .finish(),
            AuthMethod::Default => write!(f, "Default"),
        }
    }
}

/// Commit author identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl Default for CommitAuthor {
    fn default() -> Self {
        Self {
            name: DEFAULT_AUTHOR_NAME.to_string(),
            email: DEFAULT_AUTHOR_EMAIL.to_string(),
        }
    }
}

/// Validated remote replication settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSyncConfig {
    /// Remote URL
    pub url: String,
    /// Remote name
    pub remote_name: String,
    /// Branch pushed to the remote
    pub branch: BranchName,
    /// Push authentication
    pub auth: AuthMethod,
    /// Push after each commit
    pub auto_push: bool,
    /// Maximum push attempts (at least 1)
    pub retry_attempts: u32,
    /// Base delay between push attempts
    pub retry_delay: Duration,
    /// Commit message template
    pub commit_message: String,
    /// Commit author
    pub author: CommitAuthor,
}

/// Validated encryption settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionConfig {
    /// age X25519 encryption.
    Age {
        /// Recipient public key
        recipient: String,
        /// Expanded path of the identity file
        identity_file: PathBuf,
    },
    /// State is stored as submitted.
    Disabled,
}

/// Which shared store backs the lock coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStoreConfig {
    /// Redis at the first configured address.
    Redis { addresses: Vec<String> },
    /// Process-local store (single instance deployments and tests).
    Memory,
}

/// Validated lock settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    pub store: LockStoreConfig,
    pub namespace: String,
    pub ttl: Duration,
}

/// Fully validated backend configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Log level filter
    pub log_level: String,
    /// Local repository (state root)
    pub repo_path: PathBuf,
    /// Remote replication, `None` when disabled
    pub remote: Option<RemoteSyncConfig>,
    /// Encryption at rest
    pub encryption: EncryptionConfig,
    /// Lock coordination
    pub lock: LockConfig,
}

impl BackendConfig {
    /// Load configuration from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = Self::resolve_path(explicit);
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadError {
            path: path.clone(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Self::from_file_config(file)
    }

    /// Determine which config file to read.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        Self::from_file_config(file)
    }

    /// Validate a parsed file, applying defaults.
    pub fn from_file_config(file: FileConfig) -> Result<Self, ConfigError> {
        let log_level = file.log_level.unwrap_or_else(|| "info".to_string());

        let repo_path = file
            .repo
            .and_then(|r| r.path)
            .filter(|p| !p.trim().is_empty())
            .ok_or(ConfigError::Missing("repo.path"))?;
        let repo_path = expand_path(&repo_path);

        let remote = match file.remote {
            Some(section) if section.enabled.unwrap_or(true) => {
                Some(validate_remote(section)?)
            }
            _ => None,
        };

        let encryption = validate_encryption(file.encryption.unwrap_or_default())?;
        let lock = validate_lock(file.lock.unwrap_or_default())?;

        Ok(Self {
            log_level,
            repo_path,
            remote,
            encryption,
            lock,
        })
    }
}

fn validate_remote(section: schema::RemoteSection) -> Result<RemoteSyncConfig, ConfigError> {
    let url = section
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or(ConfigError::Missing("remote.url"))?;

    let remote_name = section.remote_name.unwrap_or_else(|| "origin".to_string());
    if remote_name.trim().is_empty() {
        return Err(ConfigError::InvalidValue(
            "remote.remote_name cannot be empty".to_string(),
        ));
    }

    let branch = section.branch.unwrap_or_else(|| "main".to_string());
    let branch = BranchName::new(branch)
        .map_err(|e| ConfigError::InvalidValue(format!("remote.branch: {}", e)))?;

    let auth = match section.auth_method.as_deref().unwrap_or("ssh") {
        "ssh" => {
            let raw = section
                .ssh_key_path
                .filter(|p| !p.trim().is_empty())
                .ok_or(ConfigError::Missing("remote.ssh_key_path"))?;
            AuthMethod::Ssh {
                key_path: expand_path(&raw),
            }
        }
        "token" => {
            let raw = section.token.ok_or(ConfigError::Missing("remote.token"))?;
            let token = expand_env(&raw);
            if token.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "remote.token is empty after environment expansion".to_string(),
                ));
            }
            AuthMethod::Token { token }
        }
        "default" => AuthMethod::Default,
        other => {
            return Err(ConfigError::UnsupportedMode {
                key: "remote.auth_method",
                value: other.to_string(),
                supported: "ssh, token, default",
            })
        }
    };

    // Values <= 0 mean a single attempt
    let retry_attempts = match section.retry_attempts {
        Some(n) if n > 0 => u32::try_from(n).map_err(|_| {
            ConfigError::InvalidValue(format!("remote.retry_attempts too large: {}", n))
        })?,
        _ => 1,
    };
    let retry_delay = match section.retry_delay_secs {
        Some(secs) if secs > 0 => Duration::from_secs(secs),
        _ => DEFAULT_RETRY_DELAY,
    };

    let commit_message = section
        .commit_message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string());

    let author = match section.author {
        Some(a) => CommitAuthor {
            name: a.name.unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_string()),
            email: a.email.unwrap_or_else(|| DEFAULT_AUTHOR_EMAIL.to_string()),
        },
        None => CommitAuthor::default(),
    };

    Ok(RemoteSyncConfig {
        url,
        remote_name,
        branch,
        auth,
        auto_push: section.auto_push.unwrap_or(true),
        retry_attempts,
        retry_delay,
        commit_message,
        author,
    })
}

fn validate_encryption(
    section: schema::EncryptionSection,
) -> Result<EncryptionConfig, ConfigError> {
    match section.mode.as_deref().unwrap_or("age") {
        "age" => {
            let recipient = section
                .recipient
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .ok_or(ConfigError::Missing("encryption.recipient"))?;
            let identity_file = section
                .identity_file
                .filter(|p| !p.trim().is_empty())
                .ok_or(ConfigError::Missing("encryption.identity_file"))?;
            Ok(EncryptionConfig::Age {
                recipient,
                identity_file: expand_path(&identity_file),
            })
        }
        "none" => Ok(EncryptionConfig::Disabled),
        other => Err(ConfigError::UnsupportedMode {
            key: "encryption.mode",
            value: other.to_string(),
            supported: "age, none",
        }),
    }
}

fn validate_lock(section: schema::LockSection) -> Result<LockConfig, ConfigError> {
    let store = match section.backend.as_deref().unwrap_or("redis") {
        "redis" => {
            let addresses: Vec<String> = section
                .addresses
                .unwrap_or_default()
                .into_iter()
                .filter(|a| !a.trim().is_empty())
                .collect();
            if addresses.is_empty() {
                return Err(ConfigError::Missing("lock.addresses"));
            }
            LockStoreConfig::Redis { addresses }
        }
        "memory" => LockStoreConfig::Memory,
        other => {
            return Err(ConfigError::UnsupportedMode {
                key: "lock.backend",
                value: other.to_string(),
                supported: "redis, memory",
            })
        }
    };

    let namespace = section
        .namespace
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOCK_NAMESPACE.to_string());

    let ttl = match section.ttl_secs {
        Some(0) => {
            return Err(ConfigError::InvalidValue(
                "lock.ttl_secs must be greater than zero".to_string(),
            ))
        }
        Some(secs) if secs > MAX_LOCK_TTL.as_secs() => {
            return Err(ConfigError::InvalidValue(format!(
                "lock.ttl_secs must be at most {} (one year), got {}",
                MAX_LOCK_TTL.as_secs(),
                secs
            )))
        }
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_LOCK_TTL,
    };

    Ok(LockConfig {
        store,
        namespace,
        ttl,
    })
}
