//! lock::memory
//!
//! In-process [`LockStore`] for single-instance deployments and tests.
//!
//! # Design
//!
//! Keys live in a map with an expiry instant checked on every access. A
//! failure can be injected to exercise store outages. A store built with
//! [`MemoryLockStore::recording`] also logs every call so tests can assert
//! on the exact store traffic; the default store keeps no log.
//!
//! # Example
//!
//! ```
//! use gitstate::lock::memory::MemoryLockStore;
//! use gitstate::lock::LockStore;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryLockStore::new();
//! assert!(store.set_if_absent("k", "v", Duration::from_secs(5)).await.unwrap());
//! assert!(!store.set_if_absent("k", "w", Duration::from_secs(5)).await.unwrap());
//! assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
//! # });
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::store::{LockStore, StoreError};

/// In-memory lock store.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, Entry>,
    fail_with: Option<StoreError>,
    recording: bool,
    operations: Vec<StoreOperation>,
}

#[derive(Debug)]
struct Entry {
    value: String,
    /// `None` when the TTL reaches past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    SetIfAbsent { key: String, ttl: Duration },
    Get { key: String },
    Delete { key: String },
    DeleteIfEquals { key: String },
}

impl MemoryLockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that logs every call.
    pub fn recording() -> Self {
        let store = Self::default();
        store.state().recording = true;
        store
    }

    /// Make every subsequent call fail with `err`.
    pub fn fail_with(self, err: StoreError) -> Self {
        self.state().fail_with = Some(err);
        self
    }

    /// Stop injecting failures.
    pub fn clear_failure(&self) {
        self.state().fail_with = None;
    }

    /// All recorded calls. Empty unless built with [`recording`](Self::recording).
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.state().operations.clone()
    }

    /// Forget recorded calls.
    pub fn clear_operations(&self) {
        self.state().operations.clear();
    }

    /// Write a key directly, bypassing set-if-absent.
    pub fn insert(&self, key: &str, value: &str, ttl: Duration) {
        self.state()
            .entries
            .insert(key.to_string(), Entry::new(value, ttl));
    }

    /// Make a key expire now.
    pub fn expire(&self, key: &str) {
        if let Some(entry) = self.state().entries.get_mut(key) {
            entry.expires_at = Some(Instant::now());
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.state()
            .entries
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    /// Whether no live keys exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Entries are updated in single statements, so a poisoned map is intact.
    fn state(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, op: StoreOperation) -> Result<MutexGuard<'_, MemoryInner>, StoreError> {
        let mut state = self.state();
        if state.recording {
            state.operations.push(op);
        }
        if let Some(err) = &state.fail_with {
            return Err(err.clone());
        }
        let now = Instant::now();
        state.entries.retain(|_, e| e.is_live(now));
        Ok(state)
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut state = self.begin(StoreOperation::SetIfAbsent {
            key: key.to_string(),
            ttl,
        })?;
        if state.entries.contains_key(key) {
            return Ok(false);
        }
        state.entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let state = self.begin(StoreOperation::Get {
            key: key.to_string(),
        })?;
        Ok(state.entries.get(key).map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        let mut state = self.begin(StoreOperation::Delete {
            key: key.to_string(),
        })?;
        Ok(u64::from(state.entries.remove(key).is_some()))
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut state = self.begin(StoreOperation::DeleteIfEquals {
            key: key.to_string(),
        })?;
        match state.entries.get(key) {
            Some(entry) if entry.value == value => {
                state.entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
