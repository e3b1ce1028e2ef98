//! Application configuration: tracker policy, transport tuning and where file
//! stores live. Loaded with the `config` crate so `FOOTFALL__*` environment
//! variables can override any file value.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use footfall_tracker::TrackerPolicyView;
use footfall_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const ENV_PREFIX: &str = "FOOTFALL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tracker: TrackerPolicyView,
    pub transport: TransportConfig,
    pub state_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerPolicyView::default(),
            transport: TransportConfig::default(),
            state_dir: default_state_dir(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("footfall"))
        .unwrap_or_else(|| PathBuf::from(".footfall"))
}

pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
}

/// Resolution order: `--config`, `./config/footfall.yaml`, then the user config directory.
pub fn resolve_config_path(explicit: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.clone());
    }
    let local = PathBuf::from("config/footfall.yaml");
    if local.exists() {
        return Ok(local);
    }
    let mut path = dirs::config_dir().context("Failed to get config directory")?;
    path.push("footfall");
    path.push("footfall.yaml");
    Ok(path)
}

pub fn load_config(explicit: Option<&PathBuf>) -> Result<LoadedConfig> {
    let path = resolve_config_path(explicit)?;
    if path.exists() {
        info!(path = %path.display(), "loading configuration");
    } else {
        warn!(path = %path.display(), "config file not found, using defaults");
    }
    let config = load_from(&path)?;
    Ok(LoadedConfig { config, path })
}

/// Reads `path` if present and layers `FOOTFALL__SECTION__KEY` variables on top.
pub fn load_from(path: &Path) -> Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("reading configuration from {}", path.display()))?;
    settings
        .try_deserialize::<AppConfig>()
        .with_context(|| format!("parsing configuration from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.tracker, TrackerPolicyView::default());
        assert_eq!(config.transport.queue_capacity, TransportConfig::default().queue_capacity);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("footfall.yaml");
        fs::write(
            &path,
            "tracker:\n  session_timeout_secs: 1800\n  allowed_domains: [shop.test]\nstate_dir: /tmp/footfall-state\n",
        )
        .unwrap();
        let config = load_from(&path).unwrap();
        assert_eq!(config.tracker.session_timeout_secs, 1_800);
        assert_eq!(config.tracker.visit_timeout_secs, 30);
        assert_eq!(config.tracker.allowed_domains, vec!["shop.test".to_string()]);
        assert_eq!(config.state_dir, PathBuf::from("/tmp/footfall-state"));
    }
}
