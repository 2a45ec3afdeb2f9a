//! Settings reader
//!
//! The API layer persists a small JSON settings file; the only field this
//! layer consumes is the configured adapter name. Reading is tolerant by
//! contract: a missing file, unreadable file, or corrupt JSON all resolve
//! to defaults so adapter selection can always fall back safely.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Backend selected when no valid configuration exists.
pub const DEFAULT_AGENT: &str = "opencode";

/// Persisted user settings, as far as this layer cares about them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Which agent backend to drive
    pub agent: Option<String>,

    /// Model override passed through to the backend CLI
    pub default_model: Option<String>,
}

impl Settings {
    /// Load settings from a file, tolerating absence and corruption.
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };

        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring corrupt settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load from the default location under the user's home directory.
    pub fn load_default() -> Self {
        match default_settings_path() {
            Some(path) => Self::load(&path),
            None => Self::default(),
        }
    }

    /// The configured adapter name, defaulting when absent or blank.
    pub fn configured_agent(&self) -> &str {
        self.agent
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_AGENT)
    }
}

fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".agent-hub").join("settings.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load(&temp.path().join("nope.json"));
        assert_eq!(settings.configured_agent(), "opencode");
    }

    #[test]
    fn test_load_corrupt_file_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        let settings = Settings::load(&path);
        assert_eq!(settings.configured_agent(), "opencode");
    }

    #[test]
    fn test_load_valid_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(&path, r#"{"agent":"codex","defaultModel":"o4"}"#).unwrap();
        let settings = Settings::load(&path);
        assert_eq!(settings.configured_agent(), "codex");
        assert_eq!(settings.default_model.as_deref(), Some("o4"));
    }

    #[test]
    fn test_blank_agent_defaults() {
        let settings = Settings {
            agent: Some("   ".to_string()),
            default_model: None,
        };
        assert_eq!(settings.configured_agent(), "opencode");
    }
}
