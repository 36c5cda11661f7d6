//! lock::coordinator
//!
//! Per-path exclusive locks on top of a shared [`LockStore`].
//!
//! # Architecture
//!
//! Each state path has at most one [`LockRecord`], stored as JSON under
//! `<namespace>:lock:<path>` with an expiry. Reading a record, deciding, and
//! writing back is not atomic in the store, so every operation first takes
//! the path's administrative mutex: a short-lived key
//! `<namespace>:admin:<path>` set-if-absent with a random token and released
//! by compare-and-delete. Coordinators in different processes sharing one
//! store therefore never interleave on the same path.
//!
//! # State Machine
//!
//! ```text
//! UNLOCKED --try_lock--> LOCKED --unlock(owner)--> UNLOCKED
//!                          |
//!                          +--ttl expiry--> UNLOCKED
//! ```
//!
//! # Example
//!
//! ```
//! use gitstate::core::types::{HolderId, StatePath};
//! use gitstate::lock::{LockCoordinator, LockOutcome, MemoryLockStore, UnlockOutcome};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let coordinator = LockCoordinator::new(
//!     Arc::new(MemoryLockStore::new()),
//!     "docs",
//!     Duration::from_secs(60),
//! );
//! let path = StatePath::new("envs/dev/terraform.tfstate").unwrap();
//! let alice = HolderId::new("alice").unwrap();
//! let bob = HolderId::new("bob").unwrap();
//!
//! assert!(matches!(coordinator.try_lock(&path, &alice).await.unwrap(), LockOutcome::Acquired(_)));
//! assert!(matches!(coordinator.try_lock(&path, &bob).await.unwrap(), LockOutcome::Conflict { .. }));
//! assert_eq!(coordinator.unlock(&path, &alice).await.unwrap(), UnlockOutcome::Released);
//! # });
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::store::{LockStore, StoreError};
use crate::core::types::{HolderId, StatePath};

/// How many times set-if-absent may lose a race before giving up.
const MAX_ACQUIRE_ROUNDS: usize = 3;

/// Errors from lock coordination.
#[derive(Debug, Error)]
pub enum LockError {
    /// The shared store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The administrative mutex stayed held by someone else.
    #[error("timed out waiting for the administrative lock on {path}")]
    AdminBusy { path: String },

    /// A stored record could not be decoded.
    #[error("corrupt lock record at {key}: {message}")]
    CorruptRecord { key: String, message: String },

    /// Deleting an owned record removed an unexpected number of keys.
    #[error("expected to delete exactly one lock record at {key}, deleted {deleted}")]
    UnexpectedDelete { key: String, deleted: u64 },

    /// The record kept changing between reads and writes.
    #[error("lock on {path} is contended; try again")]
    Contended { path: String },
}

impl LockError {
    /// Whether the store itself could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LockError::Store(StoreError::Unavailable(_)))
    }
}

/// Exclusive ownership of one state path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Locked state path
    pub path: StatePath,
    /// Owner of the lock
    pub holder: HolderId,
    /// When the lock was first acquired
    pub acquired_at: DateTime<Utc>,
}

/// Result of [`LockCoordinator::try_lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// The caller holds the lock (newly or already).
    Acquired(LockRecord),
    /// Someone else holds the lock.
    Conflict { current: LockRecord },
}

/// Result of [`LockCoordinator::unlock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// The caller's lock was removed.
    Released,
    /// Someone else holds the lock; nothing was removed.
    NotOwner { current: LockRecord },
    /// No lock exists for the path.
    NotFound,
}

/// Administrative mutex timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminMutexConfig {
    /// Expiry of the mutex key, bounding how long a crashed holder blocks
    pub ttl: Duration,
    /// Attempts to take the mutex before failing
    pub tries: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
}

impl Default for AdminMutexConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(8),
            tries: 32,
            retry_delay: Duration::from_millis(50),
        }
    }
}

/// Coordinates per-path locks through a shared store.
#[derive(Debug, Clone)]
pub struct LockCoordinator {
    store: Arc<dyn LockStore>,
    namespace: String,
    ttl: Duration,
    admin: AdminMutexConfig,
}

impl LockCoordinator {
    /// Create a coordinator with default administrative mutex timing.
    pub fn new(store: Arc<dyn LockStore>, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            ttl,
            admin: AdminMutexConfig::default(),
        }
    }

    /// Override administrative mutex timing.
    pub fn with_admin_mutex(mut self, admin: AdminMutexConfig) -> Self {
        self.admin = admin;
        self
    }

    /// Name of the underlying store.
    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Store key holding the record for `path`.
    pub fn record_key(&self, path: &StatePath) -> String {
        format!("{}:lock:{}", self.namespace, path)
    }

    fn admin_key(&self, path: &StatePath) -> String {
        format!("{}:admin:{}", self.namespace, path)
    }

    /// Acquire the lock on `path` for `holder`.
    ///
    /// Re-locking by the current holder succeeds without changing the record.
    pub async fn try_lock(
        &self,
        path: &StatePath,
        holder: &HolderId,
    ) -> Result<LockOutcome, LockError> {
        let token = self.acquire_admin(path).await?;
        let result = self.try_lock_inner(path, holder).await;
        self.release_admin(path, &token).await;

        match &result {
            Ok(LockOutcome::Acquired(_)) => info!(path = %path, holder = %holder, "lock acquired"),
            Ok(LockOutcome::Conflict { current }) => info!(
                path = %path,
                holder = %holder,
                current = %current.holder,
                "lock held by another holder"
            ),
            Err(e) => warn!(path = %path, error = %e, "lock failed"),
        }
        result
    }

    /// Release `holder`'s lock on `path`.
    ///
    /// Never removes a record owned by someone else.
    pub async fn unlock(
        &self,
        path: &StatePath,
        holder: &HolderId,
    ) -> Result<UnlockOutcome, LockError> {
        let token = self.acquire_admin(path).await?;
        let result = self.unlock_inner(path, holder).await;
        self.release_admin(path, &token).await;

        match &result {
            Ok(UnlockOutcome::Released) => info!(path = %path, holder = %holder, "lock released"),
            Ok(other) => info!(path = %path, holder = %holder, outcome = ?other, "unlock refused"),
            Err(e) => warn!(path = %path, error = %e, "unlock failed"),
        }
        result
    }

    /// Current lock record for `path`, if any.
    pub async fn get_lock(&self, path: &StatePath) -> Result<Option<LockRecord>, LockError> {
        let token = self.acquire_admin(path).await?;
        let result = self.read_record(path).await;
        self.release_admin(path, &token).await;
        result
    }

    async fn try_lock_inner(
        &self,
        path: &StatePath,
        holder: &HolderId,
    ) -> Result<LockOutcome, LockError> {
        let key = self.record_key(path);

        for _ in 0..MAX_ACQUIRE_ROUNDS {
            if let Some(current) = self.read_record(path).await? {
                return Ok(classify(current, holder));
            }

            let record = LockRecord {
                path: path.clone(),
                holder: holder.clone(),
                acquired_at: Utc::now(),
            };
            let encoded = serde_json::to_string(&record).map_err(|e| LockError::CorruptRecord {
                key: key.clone(),
                message: e.to_string(),
            })?;

            if self.store.set_if_absent(&key, &encoded, self.ttl).await? {
                return Ok(LockOutcome::Acquired(record));
            }
            debug!(key = %key, "lost set-if-absent race, re-reading");
        }

        Err(LockError::Contended {
            path: path.to_string(),
        })
    }

    async fn unlock_inner(
        &self,
        path: &StatePath,
        holder: &HolderId,
    ) -> Result<UnlockOutcome, LockError> {
        let Some(current) = self.read_record(path).await? else {
            return Ok(UnlockOutcome::NotFound);
        };
        if &current.holder != holder {
            return Ok(UnlockOutcome::NotOwner { current });
        }

        let key = self.record_key(path);
        let deleted = self.store.delete(&key).await?;
        if deleted != 1 {
            return Err(LockError::UnexpectedDelete { key, deleted });
        }
        Ok(UnlockOutcome::Released)
    }

    async fn read_record(&self, path: &StatePath) -> Result<Option<LockRecord>, LockError> {
        let key = self.record_key(path);
        match self.store.get(&key).await? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| LockError::CorruptRecord {
                    key,
                    message: e.to_string(),
                }),
        }
    }

    async fn acquire_admin(&self, path: &StatePath) -> Result<String, LockError> {
        let key = self.admin_key(path);
        let token = uuid::Uuid::new_v4().to_string();
        let tries = self.admin.tries.max(1);

        for attempt in 1..=tries {
            if self.store.set_if_absent(&key, &token, self.admin.ttl).await? {
                return Ok(token);
            }
            if attempt < tries {
                tokio::time::sleep(self.admin.retry_delay).await;
            }
        }

        Err(LockError::AdminBusy {
            path: path.to_string(),
        })
    }

    async fn release_admin(&self, path: &StatePath, token: &str) {
        let key = self.admin_key(path);
        match self.store.delete_if_equals(&key, token).await {
            Ok(true) => {}
            Ok(false) => warn!(key = %key, "administrative lock expired before release"),
            Err(e) => warn!(key = %key, error = %e, "failed to release administrative lock"),
        }
    }
}

fn classify(current: LockRecord, holder: &HolderId) -> LockOutcome {
    if &current.holder == holder {
        LockOutcome::Acquired(current)
    } else {
        LockOutcome::Conflict { current }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::memory::{MemoryLockStore, StoreOperation};

    const TTL: Duration = Duration::from_secs(60);

    fn setup() -> (MemoryLockStore, LockCoordinator) {
        let store = MemoryLockStore::recording();
        let coordinator = LockCoordinator::new(Arc::new(store.clone()), "test", TTL)
            .with_admin_mutex(AdminMutexConfig {
                ttl: Duration::from_secs(1),
                tries: 3,
                retry_delay: Duration::from_millis(1),
            });
        (store, coordinator)
    }

    fn path(s: &str) -> StatePath {
        StatePath::new(s).unwrap()
    }

    fn holder(s: &str) -> HolderId {
        HolderId::new(s).unwrap()
    }

    #[tokio::test]
    async fn lock_unlocked_path() {
        let (_, c) = setup();
        let outcome = c.try_lock(&path("a.tfstate"), &holder("h1")).await.unwrap();
        match outcome {
            LockOutcome::Acquired(record) => {
                assert_eq!(record.holder, holder("h1"));
                assert_eq!(record.path, path("a.tfstate"));
            }
            other => panic!("expected Acquired, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn relock_by_holder_is_idempotent() {
        let (_, c) = setup();
        let p = path("a.tfstate");
        let first = c.try_lock(&p, &holder("h1")).await.unwrap();
        let second = c.try_lock(&p, &holder("h1")).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn lock_by_other_holder_conflicts() {
        let (_, c) = setup();
        let p = path("a.tfstate");
        c.try_lock(&p, &holder("h1")).await.unwrap();

        match c.try_lock(&p, &holder("h2")).await.unwrap() {
            LockOutcome::Conflict { current } => assert_eq!(current.holder, holder("h1")),
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn paths_are_independent() {
        let (_, c) = setup();
        c.try_lock(&path("a"), &holder("h1")).await.unwrap();
        let other = c.try_lock(&path("b"), &holder("h2")).await.unwrap();
        assert!(matches!(other, LockOutcome::Acquired(_)));
    }

    #[tokio::test]
    async fn unlock_by_owner_releases() {
        let (store, c) = setup();
        let p = path("a");
        c.try_lock(&p, &holder("h1")).await.unwrap();

        assert_eq!(c.unlock(&p, &holder("h1")).await.unwrap(), UnlockOutcome::Released);
        assert_eq!(c.get_lock(&p).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unlock_by_other_holder_keeps_record() {
        let (_, c) = setup();
        let p = path("a");
        c.try_lock(&p, &holder("h1")).await.unwrap();

        let outcome = c.unlock(&p, &holder("h2")).await.unwrap();
        assert!(matches!(outcome, UnlockOutcome::NotOwner { .. }));
        assert_eq!(c.get_lock(&p).await.unwrap().unwrap().holder, holder("h1"));
    }

    #[tokio::test]
    async fn unlock_without_lock_is_not_found() {
        let (_, c) = setup();
        assert_eq!(
            c.unlock(&path("a"), &holder("h1")).await.unwrap(),
            UnlockOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn expired_record_can_be_retaken() {
        let (store, c) = setup();
        let p = path("a");
        c.try_lock(&p, &holder("h1")).await.unwrap();
        store.expire(&c.record_key(&p));

        let outcome = c.try_lock(&p, &holder("h2")).await.unwrap();
        assert!(matches!(outcome, LockOutcome::Acquired(r) if r.holder == holder("h2")));
    }

    #[tokio::test]
    async fn record_is_namespaced_json() {
        let (store, c) = setup();
        let p = path("envs/dev/terraform.tfstate");
        c.try_lock(&p, &holder("h1")).await.unwrap();

        let raw = store
            .get("test:lock:envs/dev/terraform.tfstate")
            .await
            .unwrap()
            .unwrap();
        let record: LockRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.holder, holder("h1"));
    }

    #[tokio::test]
    async fn record_uses_configured_ttl() {
        let (store, c) = setup();
        c.try_lock(&path("a"), &holder("h1")).await.unwrap();
        assert!(store.operations().contains(&StoreOperation::SetIfAbsent {
            key: "test:lock:a".into(),
            ttl: TTL,
        }));
    }

    #[tokio::test]
    async fn admin_mutex_released_after_each_call() {
        let (store, c) = setup();
        let p = path("a");
        c.try_lock(&p, &holder("h1")).await.unwrap();
        c.get_lock(&p).await.unwrap();

        // Only the lock record remains.
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("test:admin:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn busy_admin_mutex_times_out() {
        let (store, c) = setup();
        store.insert("test:admin:a", "someone-else", Duration::from_secs(30));

        let err = c.try_lock(&path("a"), &holder("h1")).await.unwrap_err();
        assert!(matches!(err, LockError::AdminBusy { .. }));
        // Foreign admin key untouched.
        assert_eq!(
            store.get("test:admin:a").await.unwrap().as_deref(),
            Some("someone-else")
        );
    }

    #[tokio::test]
    async fn store_outage_surfaces() {
        let (store, c) = setup();
        let store = store.fail_with(StoreError::Unavailable("connection refused".into()));
        let err = c.get_lock(&path("a")).await.unwrap_err();
        assert!(err.is_unavailable());
        drop(store);
    }

    #[tokio::test]
    async fn corrupt_record_reported() {
        let (store, c) = setup();
        store.insert("test:lock:a", "{not json", TTL);
        let err = c.get_lock(&path("a")).await.unwrap_err();
        assert!(matches!(err, LockError::CorruptRecord { .. }));
    }

    #[tokio::test]
    async fn concurrent_lockers_get_one_winner() {
        let (_, c) = setup();
        let c = c.with_admin_mutex(AdminMutexConfig {
            ttl: Duration::from_secs(5),
            tries: 200,
            retry_delay: Duration::from_millis(1),
        });
        let p = path("shared");

        let mut handles = Vec::new();
        for i in 0..8 {
            let c = c.clone();
            let p = p.clone();
            handles.push(tokio::spawn(async move {
                c.try_lock(&p, &holder(&format!("h{}", i))).await.unwrap()
            }));
        }

        let mut acquired = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), LockOutcome::Acquired(_)) {
                acquired += 1;
            }
        }
        assert_eq!(acquired, 1);
    }
}
