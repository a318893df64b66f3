//! In-memory [`KeyValueStore`] with an optional quota.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use super::{KeyValueStore, PersistError, PersistResult};

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, String>,
    quota_bytes: Option<usize>,
    reject_writes: bool,
}

/// Process-local store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryKvStore {
    /// Empty store without a quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store that refuses writes pushing the total above `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.quota_bytes = Some(quota_bytes);
        }
        store
    }

    /// Makes every subsequent `set`/`remove` fail with [`PersistError::Unavailable`].
    pub fn reject_writes(&self, reject: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.reject_writes = reject;
        }
    }

    /// Stored keys in lexical order.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> PersistResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| PersistError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> PersistResult<Option<String>> {
        Ok(self.lock()?.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PersistResult<()> {
        let mut inner = self.lock()?;
        if inner.reject_writes {
            return Err(PersistError::Unavailable("writes rejected".to_string()));
        }
        if let Some(quota) = inner.quota_bytes {
            let others: usize = inner
                .entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(PersistError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }
        inner.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PersistResult<()> {
        let mut inner = self.lock()?;
        if inner.reject_writes {
            return Err(PersistError::Unavailable("writes rejected".to_string()));
        }
        inner.entries.remove(key);
        Ok(())
    }
}
