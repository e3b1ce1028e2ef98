//! Key-value persistence for the tracker.
//!
//! A browser gives the tracker four independent places to keep state: durable
//! long-retention entries, an origin-scoped store shared by every tab, a per-tab
//! store, and cookies. [`StoreSet`] bundles one [`KvStore`] per tier; none of the
//! tiers are synchronised with each other.

pub mod file;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use footfall_core_types::Clock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use file::FileStore;
pub use memory::{MemoryStore, UnavailableStore};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("malformed entry under {key}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to encode entry: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Synchronous string key-value store. Implementations must be usable from any
/// tab holding a clone of the same `Arc`.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes `value`, expiring it after `ttl` when one is given.
    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()>;

    fn remove(&self, key: &str) -> StorageResult<()>;

    fn keys(&self) -> StorageResult<Vec<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.put(key, value, None)
    }

    /// Reads and deletes an entry. The default is two separate calls; stores that
    /// can do better override it so only one caller ever observes the value.
    fn take(&self, key: &str) -> StorageResult<Option<String>> {
        let value = self.get(key)?;
        if value.is_some() {
            self.remove(key)?;
        }
        Ok(value)
    }
}

/// The four persistence tiers seen by one tab.
#[derive(Clone)]
pub struct StoreSet {
    /// Long-retention entries (visitor identity).
    pub durable: Arc<dyn KvStore>,
    /// Origin-scoped store shared across tabs (session, attribution, sequence, flow, exit candidate).
    pub shared: Arc<dyn KvStore>,
    /// Per-tab store, only used to avoid redundant work.
    pub tab: Arc<dyn KvStore>,
    /// Short-TTL cookie jar.
    pub cookies: Arc<dyn KvStore>,
}

impl StoreSet {
    pub fn new(
        durable: Arc<dyn KvStore>,
        shared: Arc<dyn KvStore>,
        tab: Arc<dyn KvStore>,
        cookies: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            durable,
            shared,
            tab,
            cookies,
        }
    }

    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            durable: Arc::new(MemoryStore::new(clock.clone())),
            shared: Arc::new(MemoryStore::new(clock.clone())),
            tab: Arc::new(MemoryStore::new(clock.clone())),
            cookies: Arc::new(MemoryStore::new(clock)),
        }
    }

    /// Same origin stores, different tab.
    pub fn with_tab(&self, tab: Arc<dyn KvStore>) -> Self {
        Self {
            tab,
            ..self.clone()
        }
    }
}

/// Decodes a JSON entry. Absent entries are `Ok(None)`; undecodable ones are
/// reported as [`StorageError::Malformed`] and left in place for the caller.
pub fn load_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> StorageResult<Option<T>> {
    match store.get(key)? {
        Some(raw) => decode(key, &raw).map(Some),
        None => Ok(None),
    }
}

/// Like [`load_json`] but removes the entry in the same step.
pub fn take_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> StorageResult<Option<T>> {
    match store.take(key)? {
        Some(raw) => decode(key, &raw).map(Some),
        None => Ok(None),
    }
}

pub fn store_json<T: Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> StorageResult<()> {
    let raw = serde_json::to_string(value)?;
    store.put(key, &raw, ttl)
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> StorageResult<T> {
    serde_json::from_str(raw).map_err(|source| StorageError::Malformed {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use footfall_core_types::ManualClock;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Record {
        id: String,
        count: u32,
    }

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(ManualClock::at_unix(0)))
    }

    #[test]
    fn json_round_trips_through_store() {
        let store = store();
        let record = Record {
            id: "a".into(),
            count: 2,
        };
        store_json(&store, "rec", &record, None).unwrap();
        let loaded: Option<Record> = load_json(&store, "rec").unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[test]
    fn malformed_entry_is_reported_not_removed() {
        let store = store();
        store.set("rec", "{not json").unwrap();
        let err = load_json::<Record>(&store, "rec").unwrap_err();
        assert!(matches!(err, StorageError::Malformed { ref key, .. } if key == "rec"));
        assert!(store.get("rec").unwrap().is_some());
    }

    #[test]
    fn take_json_empties_slot() {
        let store = store();
        store_json(
            &store,
            "rec",
            &Record {
                id: "b".into(),
                count: 1,
            },
            None,
        )
        .unwrap();
        assert!(take_json::<Record>(&store, "rec").unwrap().is_some());
        assert!(take_json::<Record>(&store, "rec").unwrap().is_none());
    }

    #[test]
    fn with_tab_keeps_origin_stores() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_unix(0));
        let first = StoreSet::in_memory(clock.clone());
        let second = first.with_tab(Arc::new(MemoryStore::new(clock)));
        first.shared.set("k", "v").unwrap();
        first.tab.set("t", "1").unwrap();
        assert_eq!(second.shared.get("k").unwrap().as_deref(), Some("v"));
        assert!(second.tab.get("t").unwrap().is_none());
    }
}
