//! Layered JSON configuration loader.
//!
//! Supports loading configuration from multiple files:
//! - `screener.json` - Core screener thresholds
//! - `universe.json` - Universe ranking overrides
//! - `exposure.json` - Account capital and sector limits
//!
//! Files are loaded from `~/.wheel-screener/` by default. Later files
//! override earlier ones, with object merging at each level.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration file names, in merge order.
pub const CONFIG_FILES: &[&str] = &["screener.json", "universe.json", "exposure.json"];

/// Name of the configuration directory under the user's home.
const CONFIG_DIR_NAME: &str = ".wheel-screener";

/// Get the default configuration directory.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(CONFIG_DIR_NAME),
        |dirs| dirs.home_dir().join(CONFIG_DIR_NAME),
    )
}

/// Expand a leading `~` in a user-supplied path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Load a JSON file and return its contents as a Value.
/// Returns None if file doesn't exist.
fn load_json_file(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(Some(value))
}

/// Deep merge two JSON values.
/// Source values override target values, with object merging at each level.
pub fn merge_json(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(&key) {
                    Some(target_value) => {
                        merge_json(target_value, source_value);
                    }
                    None => {
                        target_map.insert(key, source_value);
                    }
                }
            }
        }
        (target, source) => {
            *target = source;
        }
    }
}

/// Load and deep-merge the given files. Missing files are skipped.
pub fn load_config_files(paths: &[PathBuf]) -> Result<Value> {
    let mut config = Value::Object(Default::default());

    for path in paths {
        if let Some(value) = load_json_file(path)? {
            merge_json(&mut config, value);
            tracing::debug!(path = %path.display(), "Loaded config file");
        }
    }

    Ok(config)
}

/// Load the standard config files from a directory and deserialize them.
///
/// Fields absent from every file fall back to the type's serde defaults.
pub fn load_typed_config<T: DeserializeOwned>(dir: Option<PathBuf>) -> Result<T> {
    let cfg_dir = dir.unwrap_or_else(config_dir);
    let paths: Vec<PathBuf> = CONFIG_FILES.iter().map(|f| cfg_dir.join(f)).collect();

    tracing::debug!("Loading config from {}", cfg_dir.display());

    let merged = load_config_files(&paths)?;
    serde_json::from_value(merged)
        .with_context(|| format!("Invalid configuration in {}", cfg_dir.display()))
}

/// Check which config files exist.
pub fn check_config_files(dir: Option<PathBuf>) -> Vec<(String, bool)> {
    let cfg_dir = dir.unwrap_or_else(config_dir);

    CONFIG_FILES
        .iter()
        .map(|file| {
            let path = cfg_dir.join(file);
            (file.to_string(), path.exists())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_merge_json_objects() {
        let mut target = json!({
            "wheel": {
                "dte_min": 30,
                "dte_max": 45
            },
            "fetch": { "concurrency": 5 }
        });

        let source = json!({
            "wheel": {
                "dte_max": 50,
                "iv_rank_min": 25.0
            },
            "exposure": { "total_capital": 60000.0 }
        });

        merge_json(&mut target, source);

        assert_eq!(target["wheel"]["dte_min"], 30);
        assert_eq!(target["wheel"]["dte_max"], 50);
        assert_eq!(target["wheel"]["iv_rank_min"], 25.0);
        assert_eq!(target["fetch"]["concurrency"], 5);
        assert_eq!(target["exposure"]["total_capital"], 60000.0);
    }

    #[test]
    fn test_merge_json_overwrite_non_object() {
        let mut target = json!({ "manual_tickers": ["TQQQ"] });
        let source = json!({ "manual_tickers": ["SPY", "QQQ"] });

        merge_json(&mut target, source);

        assert_eq!(target["manual_tickers"], json!(["SPY", "QQQ"]));
    }

    #[test]
    fn test_load_config_files_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("screener.json");
        fs::write(&present, r#"{"wheel": {"price_min": 20.0}}"#).unwrap();

        let merged =
            load_config_files(&[dir.path().join("absent.json"), present.clone()]).unwrap();

        assert_eq!(merged["wheel"]["price_min"], 20.0);
    }

    #[test]
    fn test_load_config_files_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("screener.json");
        fs::write(&broken, "{ nope").unwrap();

        let err = load_config_files(&[broken]).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default)]
        capital: f64,
        #[serde(default)]
        name: String,
    }

    #[test]
    fn test_load_typed_config_layers_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("screener.json"), r#"{"name": "base", "capital": 1.0}"#).unwrap();
        fs::write(dir.path().join("exposure.json"), r#"{"capital": 44500.0}"#).unwrap();

        let sample: Sample = load_typed_config(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(sample.name, "base");
        assert_eq!(sample.capital, 44500.0);

        let present = check_config_files(Some(dir.path().to_path_buf()));
        assert_eq!(present.len(), CONFIG_FILES.len());
        assert!(present.iter().any(|(f, e)| f == "universe.json" && !e));
    }

    #[test]
    fn test_expand_path_keeps_absolute() {
        assert_eq!(expand_path("/tmp/screener"), PathBuf::from("/tmp/screener"));
    }
}
