use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use footfall_core_types::Clock;

use crate::{KvStore, StorageError, StorageResult};

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at_ms: Option<i64>,
}

impl Entry {
    fn live_at(&self, now_ms: i64) -> bool {
        self.expires_at_ms.map(|at| now_ms < at).unwrap_or(true)
    }
}

pub(crate) fn expiry_ms(now_ms: i64, ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| now_ms.saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64))
}

/// In-process store. Clones of the `Arc` behave like tabs on one origin.
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        let now = self.clock.unix_millis();
        self.entries.iter().filter(|e| e.live_at(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let now = self.clock.unix_millis();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.live_at(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| !entry.live_at(now));
        }
        Ok(None)
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()> {
        let expires_at_ms = expiry_ms(self.clock.unix_millis(), ttl);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at_ms,
            },
        );
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let now = self.clock.unix_millis();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.live_at(now))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn take(&self, key: &str) -> StorageResult<Option<String>> {
        let now = self.clock.unix_millis();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, entry)| entry)
            .filter(|entry| entry.live_at(now))
            .map(|entry| entry.value))
    }
}

/// Store that fails every call, like storage in a locked-down private window.
#[derive(Clone, Debug, Default)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn err(&self) -> StorageError {
        StorageError::Unavailable(self.reason.clone())
    }
}

impl KvStore for UnavailableStore {
    fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Err(self.err())
    }

    fn put(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> StorageResult<()> {
        Err(self.err())
    }

    fn remove(&self, _key: &str) -> StorageResult<()> {
        Err(self.err())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Err(self.err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use footfall_core_types::ManualClock;

    #[test]
    fn entries_expire_after_ttl() {
        let clock = ManualClock::at_unix(100);
        let store = MemoryStore::new(Arc::new(clock.clone()));
        store
            .put("ff_sid", "s-1", Some(Duration::from_secs(120)))
            .unwrap();
        store.set("plain", "x").unwrap();

        clock.advance_secs(119);
        assert_eq!(store.get("ff_sid").unwrap().as_deref(), Some("s-1"));

        clock.advance_secs(1);
        assert!(store.get("ff_sid").unwrap().is_none());
        assert_eq!(store.keys().unwrap(), vec!["plain".to_string()]);
    }

    #[test]
    fn take_only_yields_once() {
        let store = MemoryStore::new(Arc::new(ManualClock::at_unix(0)));
        store.set("ff_exit", "{}").unwrap();
        assert_eq!(store.take("ff_exit").unwrap().as_deref(), Some("{}"));
        assert!(store.take("ff_exit").unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn unavailable_store_fails_every_call() {
        let store = UnavailableStore::new("quota");
        assert!(matches!(store.get("k"), Err(StorageError::Unavailable(_))));
        assert!(store.set("k", "v").is_err());
        assert!(store.take("k").is_err());
    }
}
