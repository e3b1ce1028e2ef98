//! Recovery wrappers around the raw stores.
//!
//! Tracker state is best effort: an unavailable store reads as absent, a
//! malformed entry is deleted and reads as absent, and failed writes are logged.

use std::time::Duration;

use footfall_storage::{load_json, store_json, take_json, KvStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::errors::{TrackError, TrackResult};

pub mod keys {
    pub const VISITOR_ID: &str = "ff_vid";
    pub const VISIT_COUNT: &str = "ff_vc";
    pub const FIRST_VISIT: &str = "ff_fv";
    pub const LAST_VISIT: &str = "ff_lv";
    pub const LAST_ACTIVITY: &str = "ff_la";

    pub const SESSION: &str = "ff_session";
    pub const UTM_LOCK: &str = "ff_utm";
    pub const PAGE_SEQUENCE: &str = "ff_seq";
    pub const PAGE_FLOW: &str = "ff_flow";
    pub const EXIT_CANDIDATE: &str = "ff_exit";

    pub const LAST_VIEW: &str = "ff_last_view";

    pub const SESSION_COOKIE: &str = "ff_sid";
}

pub(crate) fn recover<T>(store: &dyn KvStore, result: TrackResult<Option<T>>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(TrackError::MalformedState { key }) => {
            warn!(%key, "discarding malformed tracker state");
            if let Err(err) = store.remove(&key) {
                warn!(%key, %err, "failed to discard malformed tracker state");
            }
            None
        }
        Err(err) => {
            warn!(%err, "tracker state unavailable; treating as absent");
            None
        }
    }
}

pub(crate) fn read_state<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Option<T> {
    recover(store, load_json(store, key).map_err(TrackError::from))
}

pub(crate) fn take_state<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Option<T> {
    recover(store, take_json(store, key).map_err(TrackError::from))
}

pub(crate) fn write_state<T: Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) {
    if let Err(err) = store_json(store, key, value, ttl) {
        warn!(key, %err, "failed to persist tracker state");
    }
}

pub(crate) fn read_raw(store: &dyn KvStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(err) => {
            warn!(key, %err, "tracker state unavailable; treating as absent");
            None
        }
    }
}

pub(crate) fn write_raw(store: &dyn KvStore, key: &str, value: &str, ttl: Option<Duration>) {
    if let Err(err) = store.put(key, value, ttl) {
        warn!(key, %err, "failed to persist tracker state");
    }
}

pub(crate) fn clear(store: &dyn KvStore, key: &str) {
    if let Err(err) = store.remove(key) {
        warn!(key, %err, "failed to clear tracker state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use footfall_core_types::ManualClock;
    use footfall_storage::{MemoryStore, UnavailableStore};
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Marker {
        path: String,
    }

    #[test]
    fn malformed_state_is_deleted() {
        let store = MemoryStore::new(Arc::new(ManualClock::at_unix(0)));
        store.set(keys::PAGE_FLOW, "[[[").unwrap();
        assert_eq!(read_state::<Marker>(&store, keys::PAGE_FLOW), None);
        assert!(store.get(keys::PAGE_FLOW).unwrap().is_none());
    }

    #[test]
    fn unavailable_store_reads_absent_and_swallows_writes() {
        let store = UnavailableStore::new("disabled");
        write_state(&store, keys::SESSION, &Marker { path: "/".into() }, None);
        assert_eq!(read_state::<Marker>(&store, keys::SESSION), None);
        assert_eq!(take_state::<Marker>(&store, keys::SESSION), None);
        assert_eq!(read_raw(&store, keys::VISITOR_ID), None);
    }
}
