//! lock::store
//!
//! The key-value primitives the lock coordinator needs from a shared store.
//!
//! # Design
//!
//! The trait is async because every call is a network round-trip for real
//! stores. Implementations must make each primitive atomic on its own; the
//! coordinator composes them under its administrative mutex.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the shared store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached (refused, reset, timeout).
    #[error("lock store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or failed a command.
    #[error("lock store command failed: {0}")]
    Command(String),

    /// The configured address is unusable.
    #[error("invalid lock store address: {0}")]
    InvalidAddress(String),
}

/// Atomic primitives of a shared key-value store.
#[async_trait]
pub trait LockStore: Send + Sync + std::fmt::Debug {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Set `key` to `value` with an expiry, only if `key` does not exist.
    ///
    /// Returns `true` if the key was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Read a key.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete a key, returning how many keys were removed.
    async fn delete(&self, key: &str) -> Result<u64, StoreError>;

    /// Delete `key` only if its current value equals `value`.
    ///
    /// Returns `true` if the key was removed.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError>;
}
