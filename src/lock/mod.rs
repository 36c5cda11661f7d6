//! lock
//!
//! Exclusive per-path locks shared between backend instances.
//!
//! # Architecture
//!
//! The [`LockCoordinator`] owns the locking rules. It talks to a shared
//! key-value store through the [`LockStore`] trait, so the rules are tested
//! against [`MemoryLockStore`] and run in production against
//! [`RedisLockStore`]. Use [`connect_store`] to build the store selected by
//! configuration.
//!
//! # Modules
//!
//! - `store`: [`LockStore`] trait and [`StoreError`]
//! - [`coordinator`]: lock records, outcomes, administrative mutex
//! - [`memory`]: in-process store with failure injection
//! - `redis_store`: Redis store over a shared connection manager

pub mod coordinator;
pub mod memory;
mod redis_store;
mod store;

use std::sync::Arc;

use tracing::info;

pub use coordinator::{
    AdminMutexConfig, LockCoordinator, LockError, LockOutcome, LockRecord, UnlockOutcome,
};
pub use memory::MemoryLockStore;
pub use redis_store::RedisLockStore;
pub use store::{LockStore, StoreError};

use crate::core::config::{LockConfig, LockStoreConfig};

/// Build the lock store selected by configuration.
pub async fn connect_store(config: &LockStoreConfig) -> Result<Arc<dyn LockStore>, StoreError> {
    match config {
        LockStoreConfig::Redis { addresses } => {
            Ok(Arc::new(RedisLockStore::connect(addresses).await?))
        }
        LockStoreConfig::Memory => {
            info!("using in-process lock store; locks are not shared between processes");
            Ok(Arc::new(MemoryLockStore::new()))
        }
    }
}

/// Build a coordinator from configuration.
pub async fn connect(config: &LockConfig) -> Result<LockCoordinator, StoreError> {
    let store = connect_store(&config.store).await?;
    Ok(LockCoordinator::new(store, config.namespace.clone(), config.ttl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn memory_config_builds_memory_store() {
        let config = LockConfig {
            store: LockStoreConfig::Memory,
            namespace: "ns".into(),
            ttl: Duration::from_secs(10),
        };
        let coordinator = connect(&config).await.unwrap();
        assert_eq!(coordinator.store_name(), "memory");
    }
}
