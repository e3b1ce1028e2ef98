use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use footfall_core_types::Clock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::memory::expiry_ms;
use crate::{KvStore, StorageResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at_ms: Option<i64>,
}

/// JSON-file backed store used by the CLI so state survives between runs.
///
/// The whole map is rewritten on every mutation (temp file + rename). Expired
/// entries are dropped lazily when read and on every flush.
pub struct FileStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    entries: Mutex<BTreeMap<String, FileEntry>>,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %path.display(), %err, "discarding unreadable store file");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), entries = entries.len(), "opened file store");
        Ok(Self {
            path,
            clock,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &mut BTreeMap<String, FileEntry>) -> StorageResult<()> {
        let now = self.clock.unix_millis();
        entries.retain(|_, entry| live_at(entry, now));
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, &*entries)?;
            file.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn live_at(entry: &FileEntry, now_ms: i64) -> bool {
    entry.expires_at_ms.map(|at| now_ms < at).unwrap_or(true)
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let now = self.clock.unix_millis();
        let guard = self.entries.lock();
        Ok(guard
            .get(key)
            .filter(|entry| live_at(entry, now))
            .map(|entry| entry.value.clone()))
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()> {
        let expires_at_ms = expiry_ms(self.clock.unix_millis(), ttl);
        let mut guard = self.entries.lock();
        guard.insert(
            key.to_string(),
            FileEntry {
                value: value.to_string(),
                expires_at_ms,
            },
        );
        self.flush(&mut guard)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut guard = self.entries.lock();
        if guard.remove(key).is_some() {
            self.flush(&mut guard)?;
        }
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let now = self.clock.unix_millis();
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|(_, entry)| live_at(entry, now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn take(&self, key: &str) -> StorageResult<Option<String>> {
        let now = self.clock.unix_millis();
        let mut guard = self.entries.lock();
        match guard.remove(key) {
            Some(entry) => {
                self.flush(&mut guard)?;
                Ok(live_at(&entry, now).then_some(entry.value))
            }
            None => Ok(None),
        }
    }
}
