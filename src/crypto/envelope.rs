//! crypto::envelope
//!
//! age X25519 envelopes for state blobs.
//!
//! # Key Material
//!
//! - Recipients are age public keys (`age1...`), parsed on every
//!   [`encrypt`] call and once at startup by [`AgeCodec::new`].
//! - Identities are read from a key file: the first line starting with
//!   [`SECRET_KEY_PREFIX`] is the private key. Comment lines written by
//!   `age-keygen` are skipped.
//!
//! # Security
//!
//! Identity material never appears in logs or error messages.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use age::x25519;
use tracing::{debug, warn};

use super::codec::CodecError;

/// Line prefix identifying an age private key in a key file.
pub const SECRET_KEY_PREFIX: &str = "AGE-SECRET-KEY-";

/// Encrypt `plaintext` to the given recipient public key.
///
/// Every call uses fresh ephemeral key material, so encrypting the same
/// plaintext twice produces different ciphertexts.
///
/// # Errors
///
/// - [`CodecError::InvalidRecipient`] if the recipient key is malformed
/// - [`CodecError::Encrypt`] if encryption fails
pub fn encrypt(recipient: &str, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
    let recipient = parse_recipient(recipient)?;
    encrypt_to(&recipient, plaintext)
}

/// Decrypt the file at `ciphertext_path` with the identity in
/// `identity_file` and parse the plaintext as JSON.
///
/// # Errors
///
/// - [`CodecError::IdentityUnreadable`] / [`CodecError::IdentityNotFound`] /
///   [`CodecError::InvalidIdentity`] for key file problems
/// - [`CodecError::NotFound`] if the ciphertext does not exist
/// - [`CodecError::Decrypt`] on identity mismatch or corrupt payload
/// - [`CodecError::InvalidJson`] if the plaintext is not JSON
pub fn decrypt_file(
    identity_file: &Path,
    ciphertext_path: &Path,
) -> Result<serde_json::Value, CodecError> {
    let identity = read_identity(identity_file)?;
    decrypt_file_with(&identity, ciphertext_path)
}

/// Read the first age identity from a key file.
pub fn read_identity(identity_file: &Path) -> Result<x25519::Identity, CodecError> {
    let file = std::fs::File::open(identity_file).map_err(|source| {
        CodecError::IdentityUnreadable {
            path: identity_file.to_path_buf(),
            source,
        }
    })?;

    for line in BufReader::new(file).lines() {
        let line = line.map_err(|source| CodecError::IdentityUnreadable {
            path: identity_file.to_path_buf(),
            source,
        })?;
        let line = line.trim();
        if line.starts_with(SECRET_KEY_PREFIX) {
            debug!(path = %identity_file.display(), "found age identity");
            return x25519::Identity::from_str(line).map_err(|e| CodecError::InvalidIdentity {
                path: identity_file.to_path_buf(),
                message: e.to_string(),
            });
        }
    }

    Err(CodecError::IdentityNotFound {
        path: identity_file.to_path_buf(),
    })
}

pub(crate) fn parse_recipient(recipient: &str) -> Result<x25519::Recipient, CodecError> {
    x25519::Recipient::from_str(recipient.trim())
        .map_err(|e| CodecError::InvalidRecipient(e.to_string()))
}

fn encrypt_to(recipient: &x25519::Recipient, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
    age::encrypt(recipient, plaintext).map_err(|e| CodecError::Encrypt(e.to_string()))
}

fn decrypt_file_with(
    identity: &x25519::Identity,
    ciphertext_path: &Path,
) -> Result<serde_json::Value, CodecError> {
    let ciphertext = match std::fs::read(ciphertext_path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CodecError::NotFound {
                path: ciphertext_path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(CodecError::Read {
                path: ciphertext_path.to_path_buf(),
                source,
            })
        }
    };

    let plaintext = age::decrypt(identity, &ciphertext).map_err(|e| CodecError::Decrypt {
        path: ciphertext_path.to_path_buf(),
        message: e.to_string(),
    })?;

    super::codec::parse_json(&plaintext)
}

/// A freshly generated key pair.
pub struct GeneratedKey {
    /// Public key to put in the `recipient` setting.
    pub recipient: String,
    /// Key file contents in `age-keygen` format.
    pub key_file: String,
}

/// Generate a new X25519 identity rendered as an `age-keygen` key file.
pub fn generate_keypair() -> GeneratedKey {
    use age::secrecy::ExposeSecret;

    let identity = x25519::Identity::generate();
    let recipient = identity.to_public().to_string();
    let secret = identity.to_string();
    let key_file = format!(
        "# created: {}\n# public key: {}\n{}\n",
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        recipient,
        secret.expose_secret()
    );
    GeneratedKey {
        recipient,
        key_file,
    }
}

/// An age codec with the recipient and identity loaded up front.
pub struct AgeCodec {
    recipient: x25519::Recipient,
    identity: x25519::Identity,
    identity_file: PathBuf,
}

impl std::fmt::Debug for AgeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgeCodec")
            .field("recipient", &self.recipient.to_string())
            .field("identity_file", &self.identity_file)
            .finish()
    }
}

impl AgeCodec {
    /// Parse the recipient and load the identity.
    ///
    /// Both checks happen here so that bad key material halts startup.
    pub fn new(recipient: &str, identity_file: &Path) -> Result<Self, CodecError> {
        let recipient = parse_recipient(recipient)?;
        let identity = read_identity(identity_file)?;

        if identity.to_public().to_string() != recipient.to_string() {
            warn!(
                identity_file = %identity_file.display(),
                "configured identity does not match the recipient; stored state will not be readable"
            );
        }

        Ok(Self {
            recipient,
            identity,
            identity_file: identity_file.to_path_buf(),
        })
    }

    /// Encrypt to the configured recipient.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        encrypt_to(&self.recipient, plaintext)
    }

    /// Decrypt a state file with the configured identity.
    pub fn decrypt_file(&self, ciphertext_path: &Path) -> Result<serde_json::Value, CodecError> {
        decrypt_file_with(&self.identity, ciphertext_path)
    }

    /// The configured recipient public key.
    pub fn recipient(&self) -> String {
        self.recipient.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use age::secrecy::ExposeSecret;
    use serde_json::json;
    use tempfile::TempDir;

    struct Keys {
        _dir: TempDir,
        identity_file: PathBuf,
        recipient: String,
    }

    fn keys() -> Keys {
        let dir = TempDir::new().expect("create temp dir");
        let identity = x25519::Identity::generate();
        let recipient = identity.to_public().to_string();
        let identity_file = dir.path().join("keys.txt");
        let content = format!(
            "# created: 2024-01-01T00:00:00Z\n# public key: {}\n{}\n",
            recipient,
            identity.to_string().expose_secret()
        );
        std::fs::write(&identity_file, content).unwrap();
        Keys {
            _dir: dir,
            identity_file,
            recipient,
        }
    }

    #[test]
    fn encrypt_then_decrypt_file() {
        let keys = keys();
        let value = json!({"version": 4, "serial": 7, "outputs": {}});
        let ciphertext = encrypt(&keys.recipient, value.to_string().as_bytes()).unwrap();

        let path = keys.identity_file.with_file_name("state.tfstate");
        std::fs::write(&path, &ciphertext).unwrap();

        let decoded = decrypt_file(&keys.identity_file, &path).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn ciphertext_differs_between_calls() {
        let keys = keys();
        let a = encrypt(&keys.recipient, b"{}").unwrap();
        let b = encrypt(&keys.recipient, b"{}").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_recipient_is_rejected() {
        let err = encrypt("not-a-key", b"{}").unwrap_err();
        assert!(matches!(err, CodecError::InvalidRecipient(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn key_file_without_secret_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys.txt");
        std::fs::write(&path, "# only comments\n").unwrap();
        let err = read_identity(&path).err().expect("key file without a secret must fail");
        assert!(matches!(err, CodecError::IdentityNotFound { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn missing_key_file_is_rejected() {
        let err = read_identity(Path::new("/nonexistent/keys.txt"))
            .err()
            .expect("missing key file must fail");
        assert!(matches!(err, CodecError::IdentityUnreadable { .. }));
    }

    #[test]
    fn missing_ciphertext_is_not_found() {
        let keys = keys();
        let err = decrypt_file(&keys.identity_file, Path::new("/nonexistent/state")).unwrap_err();
        assert!(matches!(err, CodecError::NotFound { .. }));
    }

    #[test]
    fn wrong_identity_fails_to_decrypt() {
        let alice = keys();
        let bob = keys();
        let ciphertext = encrypt(&alice.recipient, b"{\"a\":1}").unwrap();
        let path = bob.identity_file.with_file_name("state");
        std::fs::write(&path, ciphertext).unwrap();

        let err = decrypt_file(&bob.identity_file, &path).unwrap_err();
        assert!(matches!(err, CodecError::Decrypt { .. }));
    }

    #[test]
    fn corrupt_payload_fails_to_decrypt() {
        let keys = keys();
        let path = keys.identity_file.with_file_name("state");
        std::fs::write(&path, b"definitely not age").unwrap();
        let err = decrypt_file(&keys.identity_file, &path).unwrap_err();
        assert!(matches!(err, CodecError::Decrypt { .. }));
    }

    #[test]
    fn escaped_newlines_survive() {
        let keys = keys();
        let value = json!({"script": "line one\nline two"});
        let pretty = serde_json::to_vec_pretty(&value).unwrap();
        let ciphertext = encrypt(&keys.recipient, &pretty).unwrap();
        let path = keys.identity_file.with_file_name("state");
        std::fs::write(&path, ciphertext).unwrap();

        assert_eq!(decrypt_file(&keys.identity_file, &path).unwrap(), value);
    }

    #[test]
    fn codec_uses_loaded_keys() {
        let keys = keys();
        let codec = AgeCodec::new(&keys.recipient, &keys.identity_file).unwrap();
        assert_eq!(codec.recipient(), keys.recipient);

        let path = keys.identity_file.with_file_name("state");
        std::fs::write(&path, codec.encrypt(b"[1,2,3]").unwrap()).unwrap();
        assert_eq!(codec.decrypt_file(&path).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn codec_accepts_recipient_of_another_identity() {
        let alice = keys();
        let bob = keys();
        let codec = AgeCodec::new(&bob.recipient, &alice.identity_file).unwrap();
        assert_eq!(codec.recipient(), bob.recipient);
    }

    #[test]
    fn generated_keypair_is_loadable() {
        let dir = TempDir::new().unwrap();
        let generated = generate_keypair();
        let path = dir.path().join("keys.txt");
        std::fs::write(&path, &generated.key_file).unwrap();

        let identity = read_identity(&path).unwrap();
        assert_eq!(identity.to_public().to_string(), generated.recipient);
        assert!(generated.recipient.starts_with("age1"));
    }

    #[test]
    fn debug_does_not_leak_identity() {
        let keys = keys();
        let codec = AgeCodec::new(&keys.recipient, &keys.identity_file).unwrap();
        let rendered = format!("{:?}", codec);
        assert!(!rendered.contains(SECRET_KEY_PREFIX));
    }
}
