//! Engine configuration.
//!
//! A [`Config`] is an immutable snapshot: the controller clones it into each
//! turn when the stream is spawned, so a settings change made mid-stream
//! never affects the turn already in flight.

use std::error::Error;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    pub project_id: String,
    #[serde(default = "default_streaming_enabled")]
    pub streaming_enabled: bool,
}

fn default_streaming_enabled() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            model: String::new(),
            project_id: String::new(),
            streaming_enabled: true,
        }
    }
}

impl Config {
    /// Load from the platform config directory, falling back to defaults
    /// when no config file exists yet.
    pub fn load() -> Result<Self, Box<dyn Error>> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, Box<dyn Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "permacommons", "colloquy")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_enable_streaming() {
        let config = Config::default();
        assert!(config.streaming_enabled);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn loads_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
base_url = "https://api.example.com"
api_key = "sk-test"
model = "gpt-test"
project_id = "proj-1"
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "gpt-test");
        // streaming_enabled is omitted in the file and defaults on.
        assert!(config.streaming_enabled);
    }

    #[test]
    fn rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url = ").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }
}
