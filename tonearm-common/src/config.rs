//! Configuration loading
//!
//! Resolution priority for the config file:
//! 1. Command-line argument
//! 2. `TONEARM_CONFIG` environment variable
//! 3. `<config_dir>/tonearm/config.toml`
//! 4. Compiled defaults (no file)
//!
//! A missing default file is not an error; an explicitly named file that does
//! not exist is.

use crate::db::Perspective;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_ENV_VAR: &str = "TONEARM_CONFIG";

/// Playback engine tuning, the `[engine]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Past this position "previous" restarts the current track instead
    pub played_threshold_ms: u64,
    /// Worker idle ticks before idle is requested; 0 disables
    pub idle_timeout_secs: u64,
    pub idle_tick_ms: u64,
    pub bus_poll_ms: u64,
    pub progress_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            played_threshold_ms: 5000,
            idle_timeout_secs: 0,
            idle_tick_ms: 1000,
            bus_poll_ms: 250,
            progress_interval_ms: 1000,
            shutdown_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    /// Perspective whose queue and playbar drive playback
    pub perspective: Perspective,
    pub engine: EngineSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            perspective: Perspective::Music,
            engine: EngineSettings::default(),
        }
    }
}

impl Config {
    /// Resolve and load the configuration
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Self::from_file(Path::new(&path));
            }
        }

        match default_config_file() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.idle_tick_ms == 0 {
            return Err(Error::Config("engine.idle_tick_ms must be positive".to_string()));
        }
        if self.engine.bus_poll_ms == 0 {
            return Err(Error::Config("engine.bus_poll_ms must be positive".to_string()));
        }
        if self.engine.progress_interval_ms == 0 {
            warn!("engine.progress_interval_ms is 0, progress events disabled");
        }
        Ok(())
    }
}

fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tonearm").join("config.toml"))
}

/// `~/.local/share/tonearm/tonearm.db` or the platform equivalent
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tonearm"))
        .unwrap_or_else(|| PathBuf::from("./tonearm_data"))
        .join("tonearm.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.perspective, Perspective::Music);
        assert_eq!(config.engine.played_threshold_ms, 5000);
        assert!(config.database_path.ends_with("tonearm.db"));
    }

    #[test]
    fn test_partial_engine_table() {
        let config = Config::from_toml(
            r#"
            perspective = "podcasts"

            [engine]
            played_threshold_ms = 3000
            "#,
        )
        .unwrap();

        assert_eq!(config.perspective, Perspective::Podcasts);
        assert_eq!(config.engine.played_threshold_ms, 3000);
        assert_eq!(config.engine.idle_tick_ms, 1000);
    }

    #[test]
    fn test_rejects_zero_tick() {
        let result = Config::from_toml("[engine]\nidle_tick_ms = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_unknown_perspective() {
        assert!(Config::from_toml("perspective = \"audiobooks\"\n").is_err());
    }
}
