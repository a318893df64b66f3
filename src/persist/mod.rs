//! Durable key-value storage shared by the catalog and the order state.

/// In-memory store for tests and embedding.
pub mod memory;
/// SQLite-backed durable store.
pub mod sqlite;

use serde::{Serialize, de::DeserializeOwned};

/// Key holding the dish list.
pub const CATALOG_KEY: &str = "catalog";
/// Key holding the dish id to quantity mapping.
pub const QUANTITIES_KEY: &str = "order.quantities";
/// Key holding the last viewed category tab.
pub const ACTIVE_CATEGORY_KEY: &str = "order.activeCategory";
/// Key holding the last submitted order.
pub const ORDER_SNAPSHOT_KEY: &str = "order.snapshot";

/// Storage failure.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// SQLite host failure.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Value could not be encoded or decoded.
    #[error("json: {0}")]
    Serde(#[from] serde_json::Error),
    /// Write would exceed the storage ceiling.
    #[error("storage quota exceeded writing {key}: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded {
        /// Key being written.
        key: String,
        /// Total bytes the store would hold after the write.
        needed: usize,
        /// Configured ceiling.
        quota: usize,
    },
    /// Storage cannot be written at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for storage calls.
pub type PersistResult<T> = Result<T, PersistError>;

/// Host storage with string values, shared by every component of one menu.
///
/// Implementations are cheap handles: clones address the same backing store.
pub trait KeyValueStore: Clone + Send + 'static {
    /// Reads the value stored under `key`.
    fn get(&self, key: &str) -> PersistResult<Option<String>>;
    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> PersistResult<()>;
    /// Deletes `key`; missing keys are not an error.
    fn remove(&self, key: &str) -> PersistResult<()>;
}

/// Reads and decodes a JSON value. A missing key is `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(store: &impl KeyValueStore, key: &str) -> PersistResult<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encodes `value` as JSON and stores it under `key`.
pub fn write_json<T: Serialize + ?Sized>(store: &impl KeyValueStore, key: &str, value: &T) -> PersistResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// A storage write that did not go through.
#[derive(Debug, thiserror::Error)]
#[error("failed to persist {key}: {source}")]
pub struct WriteFailure {
    /// Key that was being written.
    pub key: &'static str,
    /// Underlying storage error.
    #[source]
    pub source: PersistError,
}

/// Outcome of a mutation whose in-memory effect has already been applied.
///
/// `write_failure` is set when the change may not survive a reload. The
/// in-memory state is never rolled back.
#[derive(Debug)]
#[must_use]
pub struct Persisted<T> {
    /// Result of the in-memory mutation.
    pub value: T,
    /// Storage write that failed, if any.
    pub write_failure: Option<WriteFailure>,
}

impl<T> Persisted<T> {
    /// A mutation whose writes all succeeded (or that needed none).
    pub fn durable(value: T) -> Self {
        Self {
            value,
            write_failure: None,
        }
    }

    /// Wraps `value` with the result of its write.
    pub fn from_write(value: T, key: &'static str, write: PersistResult<()>) -> Self {
        Self {
            value,
            write_failure: write.err().map(|source| WriteFailure { key, source }),
        }
    }

    /// True when nothing failed to persist.
    pub fn is_durable(&self) -> bool {
        self.write_failure.is_none()
    }

    /// Maps the value, keeping the write outcome.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Persisted<U> {
        Persisted {
            value: f(self.value),
            write_failure: self.write_failure,
        }
    }

    /// Splits into the value and the failure.
    pub fn into_parts(self) -> (T, Option<WriteFailure>) {
        (self.value, self.write_failure)
    }
}
