//! crypto
//!
//! Encryption at rest for state blobs.
//!
//! # Modules
//!
//! - [`codec`] - [`StateCodec`]: age or plaintext, chosen by configuration
//! - [`envelope`] - age X25519 encrypt/decrypt and key file handling
//!
//! # Example
//!
//! ```no_run
//! use gitstate::crypto::envelope;
//! use std::path::Path;
//!
//! let ciphertext = envelope::encrypt("age1...", br#"{"version":4}"#).unwrap();
//! std::fs::write("state.tfstate", &ciphertext).unwrap();
//! let value = envelope::decrypt_file(
//!     Path::new("keys.txt"),
//!     Path::new("state.tfstate"),
//! ).unwrap();
//! ```

pub mod codec;
pub mod envelope;

pub use codec::{CodecError, StateCodec};
pub use envelope::{generate_keypair, AgeCodec, GeneratedKey, SECRET_KEY_PREFIX};
