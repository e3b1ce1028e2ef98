use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use serde_json::Value as JsonValue;

use super::output::{emit, OutputFormat};
use crate::cli::context::CliContext;
use crate::config::load_from;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (file plus environment overrides)
    Show,

    /// Print the configuration file path in use
    Path,

    /// Get a single value by dotted key, e.g. `tracker.session_timeout_secs`
    Get {
        /// Configuration key
        key: String,
    },

    /// Validate the configuration file
    Validate,
}

pub fn cmd_config(args: ConfigArgs, ctx: &CliContext, format: OutputFormat) -> Result<()> {
    let path = ctx.config_path();
    match args.action {
        ConfigAction::Show => {
            let config = ctx.config();
            emit(&format, config, || {
                let body = serde_yaml::to_string(config).unwrap_or_default();
                format!("Current configuration ({}):\n{}", path.display(), body)
            })?;
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Get { key } => {
            let json = serde_json::to_value(ctx.config())?;
            let segments = split_key(&key)?;
            match get_json_value(&json, &segments) {
                Some(value) => emit(&format, value, || render_scalar(value))?,
                None => bail!("{} not found in configuration", key),
            }
        }
        ConfigAction::Validate => {
            if path.exists() {
                load_from(path)?;
                println!("Configuration file {} is valid", path.display());
            } else {
                println!(
                    "No configuration file at {}; defaults are valid",
                    path.display()
                );
            }
        }
    }

    Ok(())
}

fn render_scalar(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim_end().to_string())
            .unwrap_or_else(|_| other.to_string()),
    }
}

fn split_key(key: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = key
        .split('.')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        bail!("configuration key cannot be empty");
    }
    Ok(segments)
}

fn get_json_value<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut current = value;
    for segment in path {
        match current {
            JsonValue::Object(map) => {
                current = map.get(*segment)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_lookup() {
        let doc = json!({"tracker": {"session_timeout_secs": 120, "allowed_domains": ["a"]}});
        let segments = split_key("tracker.session_timeout_secs").unwrap();
        assert_eq!(get_json_value(&doc, &segments), Some(&json!(120)));
        assert_eq!(get_json_value(&doc, &["tracker", "missing"]), None);
        assert!(split_key("..").is_err());
    }

    #[test]
    fn scalars_render_plainly() {
        assert_eq!(render_scalar(&json!("https://collect.test")), "https://collect.test");
        assert_eq!(render_scalar(&json!(30)), "30");
    }
}
