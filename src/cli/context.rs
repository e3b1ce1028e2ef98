use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use footfall_core_types::Clock;
use footfall_storage::{FileStore, MemoryStore, StoreSet};

use crate::config::AppConfig;

pub const DURABLE_FILE: &str = "durable.json";
pub const SHARED_FILE: &str = "shared.json";
pub const COOKIE_FILE: &str = "cookies.json";

pub struct CliContext {
    config: Arc<AppConfig>,
    config_path: PathBuf,
}

impl CliContext {
    pub fn new(config: AppConfig, config_path: PathBuf) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// File-backed origin stores under the state directory. The tab tier is
    /// always in memory.
    pub fn state_stores(&self, clock: Arc<dyn Clock>) -> Result<StoreSet> {
        let dir = &self.config.state_dir;
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let open = |name: &str| -> Result<Arc<FileStore>> {
            let path = dir.join(name);
            let store = FileStore::open(&path, clock.clone())
                .with_context(|| format!("opening {}", path.display()))?;
            Ok(Arc::new(store))
        };
        Ok(StoreSet::new(
            open(DURABLE_FILE)?,
            open(SHARED_FILE)?,
            Arc::new(MemoryStore::new(clock.clone())),
            open(COOKIE_FILE)?,
        ))
    }
}
