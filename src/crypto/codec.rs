//! crypto::codec
//!
//! State codec selected from configuration.
//!
//! The backend stores every state blob through a [`StateCodec`]. With
//! encryption enabled the blob on disk is an age envelope; with encryption
//! disabled it is the submitted JSON as-is. Reading always yields a parsed
//! JSON value so the caller can re-serialize it canonically.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::envelope::AgeCodec;
use crate::core::config::EncryptionConfig;

/// Errors from encoding or decoding state blobs.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Recipient public key could not be parsed.
    #[error("invalid age recipient: {0}")]
    InvalidRecipient(String),

    /// Identity file could not be read.
    #[error("cannot read identity file {path}: {source}")]
    IdentityUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Identity file contains no private key line.
    #[error("no age secret key found in {path}")]
    IdentityNotFound { path: PathBuf },

    /// Identity line could not be parsed.
    #[error("invalid age identity in {path}: {message}")]
    InvalidIdentity { path: PathBuf, message: String },

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encrypt(String),

    /// The stored blob does not exist.
    #[error("state file not found: {path}")]
    NotFound { path: PathBuf },

    /// The stored blob could not be read.
    #[error("cannot read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Wrong identity, truncated or corrupt ciphertext.
    #[error("cannot decrypt {path}: {message}")]
    Decrypt { path: PathBuf, message: String },

    /// Plaintext is not a JSON document.
    #[error("stored state is not valid JSON: {0}")]
    InvalidJson(String),
}

impl CodecError {
    /// Whether the error stems from key configuration rather than data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CodecError::InvalidRecipient(_)
                | CodecError::IdentityUnreadable { .. }
                | CodecError::IdentityNotFound { .. }
                | CodecError::InvalidIdentity { .. }
        )
    }
}

pub(crate) fn parse_json(bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::InvalidJson(e.to_string()))
}

/// How state blobs are represented at rest.
#[derive(Debug)]
pub enum StateCodec {
    /// age X25519 envelope.
    Age(AgeCodec),
    /// Submitted bytes unchanged.
    Plaintext,
}

impl StateCodec {
    /// Build the codec, loading key material when encryption is enabled.
    pub fn from_config(config: &EncryptionConfig) -> Result<Self, CodecError> {
        match config {
            EncryptionConfig::Age {
                recipient,
                identity_file,
            } => Ok(StateCodec::Age(AgeCodec::new(recipient, identity_file)?)),
            EncryptionConfig::Disabled => Ok(StateCodec::Plaintext),
        }
    }

    /// Whether blobs are encrypted at rest.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, StateCodec::Age(_))
    }

    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            StateCodec::Age(_) => "age",
            StateCodec::Plaintext => "none",
        }
    }

    /// Produce the bytes to write for a state document.
    pub fn encode(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            StateCodec::Age(codec) => codec.encrypt(plaintext),
            StateCodec::Plaintext => Ok(plaintext.to_vec()),
        }
    }

    /// Read a stored blob and parse it as JSON.
    pub fn decode_file(&self, path: &Path) -> Result<serde_json::Value, CodecError> {
        match self {
            StateCodec::Age(codec) => codec.decrypt_file(path),
            StateCodec::Plaintext => {
                let bytes = std::fs::read(path).map_err(|source| {
                    if source.kind() == std::io::ErrorKind::NotFound {
                        CodecError::NotFound {
                            path: path.to_path_buf(),
                        }
                    } else {
                        CodecError::Read {
                            path: path.to_path_buf(),
                            source,
                        }
                    }
                })?;
                parse_json(&bytes)
            }
        }
    }
}
