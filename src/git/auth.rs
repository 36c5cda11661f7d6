//! git::auth
//!
//! Push credentials.
//!
//! [`PushAuth`] is resolved once from configuration and answers libgit2's
//! credential callback during every push attempt. libgit2 calls the
//! callback again whenever the remote refuses what it returned, so each
//! variant gives up after a bounded number of calls with an error whose
//! message marks it as an authentication failure.

use std::path::PathBuf;

use tracing::debug;

use super::interface::GitError;
use crate::core::config::AuthMethod;

/// Username sent with token authentication.
pub const TOKEN_USERNAME: &str = "git";

/// Credential callback invocations allowed per push attempt.
const MAX_CREDENTIAL_CALLS: u32 = 3;

/// Resolved push credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum PushAuth {
    /// SSH key file.
    Ssh { key_path: PathBuf },
    /// HTTP basic auth with username [`TOKEN_USERNAME`].
    Token { token: String },
    /// ssh-agent, credential helpers or ambient trust.
    Default,
}

impl std::fmt::Debug for PushAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PushAuth::Ssh { key_path } => f.debug_struct("Ssh").field("key_path", key_path).finish(),
            PushAuth::Token { .. } => f.debug_struct("Token").field("token", &"[REDACTED]").finish(),
            PushAuth::Default => write!(f, "Default"),
        }
    }
}

impl PushAuth {
    /// Resolve configured credentials.
    ///
    /// # Errors
    ///
    /// [`GitError::InvalidAuth`] if the SSH key file does not exist or the
    /// token is empty.
    pub fn from_method(method: &AuthMethod) -> Result<Self, GitError> {
        match method {
            AuthMethod::Ssh { key_path } => {
                if !key_path.is_file() {
                    return Err(GitError::InvalidAuth {
                        message: format!("SSH key not found: {}", key_path.display()),
                    });
                }
                Ok(PushAuth::Ssh {
                    key_path: key_path.clone(),
                })
            }
            AuthMethod::Token { token } => {
                if token.trim().is_empty() {
                    return Err(GitError::InvalidAuth {
                        message: "token is empty".to_string(),
                    });
                }
                Ok(PushAuth::Token {
                    token: token.clone(),
                })
            }
            AuthMethod::Default => Ok(PushAuth::Default),
        }
    }

    /// Name of the method for logs.
    pub fn name(&self) -> &'static str {
        match self {
            PushAuth::Ssh { .. } => "ssh",
            PushAuth::Token { .. } => "token",
            PushAuth::Default => "default",
        }
    }

    /// Answer one credential callback.
    ///
    /// `call` is the 1-based number of this invocation within the current
    /// push attempt.
    pub(crate) fn credentials(
        &self,
        config: &git2::Config,
        url: &str,
        username_from_url: Option<&str>,
        allowed: git2::CredentialType,
        call: u32,
    ) -> Result<git2::Cred, git2::Error> {
        if call > MAX_CREDENTIAL_CALLS {
            return Err(git2::Error::from_str(
                "authentication failed: credentials rejected by remote",
            ));
        }
        let username = username_from_url.unwrap_or(TOKEN_USERNAME);
        debug!(url, method = self.name(), call, "credential request");

        if allowed.contains(git2::CredentialType::USERNAME) {
            return git2::Cred::username(username);
        }

        match self {
            PushAuth::Ssh { key_path } => {
                if allowed.contains(git2::CredentialType::SSH_KEY) {
                    git2::Cred::ssh_key(username, None, key_path, None)
                } else {
                    Err(unsupported(self, allowed))
                }
            }
            PushAuth::Token { token } => {
                if allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT) {
                    git2::Cred::userpass_plaintext(TOKEN_USERNAME, token)
                } else {
                    Err(unsupported(self, allowed))
                }
            }
            PushAuth::Default => {
                if allowed.contains(git2::CredentialType::SSH_KEY) {
                    git2::Cred::ssh_key_from_agent(username)
                } else if allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT) {
                    git2::Cred::credential_helper(config, url, username_from_url)
                } else if allowed.contains(git2::CredentialType::DEFAULT) {
                    git2::Cred::default()
                } else {
                    Err(unsupported(self, allowed))
                }
            }
        }
    }
}

fn unsupported(auth: &PushAuth, allowed: git2::CredentialType) -> git2::Error {
    git2::Error::from_str(&format!(
        "authentication failed: remote does not accept {} credentials (allowed: {:?})",
        auth.name(),
        allowed
    ))
}
