use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::logging::LogTarget;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backups: BackupConfig,

    #[serde(default)]
    pub console: ConsoleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Directory of pre-built HTML views served for non-API paths.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_backup_dir() -> PathBuf {
    data_dir().join("backups")
}

fn default_max_upload_bytes() -> usize {
    256 * 1024 * 1024 // 256MB
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Rows returned by an ad-hoc query before the result is truncated.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Wall-clock limit for one ad-hoc query, in milliseconds.
    #[serde(default = "default_max_execution_ms")]
    pub max_execution_ms: u64,
}

fn default_max_rows() -> usize {
    5000
}

fn default_max_execution_ms() -> u64 {
    5000
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            max_execution_ms: default_max_execution_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub target: LogTarget,

    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

fn default_log_dir() -> PathBuf {
    data_dir().join("logs")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            target: LogTarget::default(),
            dir: default_log_dir(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("targetmap")
}

fn default_db_path() -> PathBuf {
    data_dir().join("targets.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            server: ServerConfig::default(),
            backups: BackupConfig::default(),
            console: ConsoleConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load from `TARGETMAP_CONFIG` or the default location, writing a
    /// default file on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::read(&config_path)?
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            config
        };
        config.apply_env();
        Ok(config)
    }

    /// Load an explicitly named file. Unlike [`Config::load`], a missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env();
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("TARGETMAP_BIND") {
            self.server.bind = bind;
        }
        if let Ok(db_path) = std::env::var("TARGETMAP_DB") {
            self.db_path = PathBuf::from(db_path);
        }
    }

    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TARGETMAP_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("targetmap")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/srv/targets.db"

            [server]
            static_dir = "static"
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/srv/targets.db"));
        assert_eq!(config.server.bind, "127.0.0.1:5000");
        assert_eq!(config.server.static_dir, Some(PathBuf::from("static")));
        assert_eq!(config.console.max_rows, 5000);
        assert_eq!(config.console.max_execution_ms, 5000);
        assert_eq!(config.logging.target, LogTarget::Auto);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = Config::default();
        config.backups.dir = dir.path().join("backups");
        config.console.max_rows = 42;
        config.save_to(&path).unwrap();

        let loaded = Config::read(&path).unwrap();
        assert_eq!(loaded.backups.dir, dir.path().join("backups"));
        assert_eq!(loaded.console.max_rows, 42);
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(Config::read(&dir.path().join("absent.toml")).is_err());
    }
}
