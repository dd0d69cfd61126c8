//! Configuration for bookpack.
//!
//! Settings sources (highest priority first):
//! 1. Environment variables (BOOKPACK_EPUB_VERSION)
//! 2. Config file (.bookpack/config.yaml, searched upward from the
//!    current directory, falling back to ~/.bookpack/config.yaml)
//! 3. Defaults (EPUB format version "3.0")

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached settings (stores Result to handle init errors)
static SETTINGS: OnceLock<Result<Settings, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Default EPUB format version for new packages ("2.0" or "3.0")
    pub default_version: Option<String>,
}

/// Resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Format version assigned to newly created manifests
    pub default_version: String,
    /// Path to the config file (if found)
    pub config_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_version: "3.0".to_string(),
            config_file: None,
        }
    }
}

/// Find a config file by searching the current directory and parents,
/// then the home directory.
fn find_config_file() -> Option<PathBuf> {
    if let Ok(mut current) = std::env::current_dir() {
        loop {
            let candidate = current.join(".bookpack").join("config.yaml");
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                break;
            }
        }
    }

    let home_candidate = dirs::home_dir()?.join(".bookpack").join("config.yaml");
    home_candidate.exists().then_some(home_candidate)
}

/// Load and parse a config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load settings from all sources
fn load_settings() -> Result<Settings> {
    let config_file = find_config_file();

    let file_settings = match config_file.as_deref() {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    let default_version = std::env::var("BOOKPACK_EPUB_VERSION")
        .ok()
        .or(file_settings.default_version)
        .unwrap_or_else(|| "3.0".to_string());

    Ok(Settings {
        default_version,
        config_file,
    })
}

/// Get the global settings (loads once, then cached)
pub fn settings() -> Result<&'static Settings> {
    let result = SETTINGS.get_or_init(|| load_settings().map_err(|e| e.to_string()));

    match result {
        Ok(settings) => Ok(settings),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload of settings (useful for testing)
pub fn reload_settings() -> Result<Settings> {
    load_settings()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_version_fallback() {
        let settings = Settings::default();
        assert_eq!(settings.default_version, "3.0");
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "default_version: \"2.0\"").unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.default_version, Some("2.0".to_string()));
    }

    #[test]
    fn test_empty_config_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.yaml");
        std::fs::write(&config_path, "{}").unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert!(config.default_version.is_none());
    }
}
