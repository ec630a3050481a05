//! Where inbox-sync keeps its files: the TOML config and the sync caches.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::app_config::AppConfig;

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no home directory to place inbox-sync files in")]
    NoProjectDirs,
    #[error("config path has no parent directory: {0}")]
    Orphan(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Resolves and prepares the config and cache directories.
#[derive(Debug, Clone)]
pub struct StorageManager {
    config_dir: PathBuf,
    cache_dir: PathBuf,
}

impl StorageManager {
    /// Uses the platform directories for `com.linuxmobile.inbox-sync`.
    ///
    /// # Errors
    /// Returns `ConfigError::NoProjectDirs` when no home directory is known.
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from("com", "linuxmobile", "inbox-sync")
            .ok_or(ConfigError::NoProjectDirs)?;
        Ok(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            cache_dir: dirs.cache_dir().to_path_buf(),
        })
    }

    /// Keeps everything under one root, as `config/` and `cache/`.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
        }
    }

    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// Reads the config at `path_override` or the default location.
    ///
    /// A missing file is created with the defaults. A file that does not parse is
    /// left as it is and the defaults are used for this run.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or the defaults cannot be written.
    pub fn load_config(&self, path_override: Option<&Path>) -> Result<AppConfig, ConfigError> {
        let path = path_override.map_or_else(|| self.config_path(), Path::to_path_buf);

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Writing default config");
                let config = AppConfig::default();
                write_toml(&path, &config)?;
                return Ok(config);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(toml::from_str(&text).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
            AppConfig::default()
        }))
    }

    /// # Errors
    /// Returns error if the file cannot be written.
    pub fn save_config(&self, config: &AppConfig) -> Result<(), ConfigError> {
        write_toml(&self.config_path(), config)
    }

    /// Returns the cache directory to use, creating it if needed.
    ///
    /// `cache.dir` in the config wins over the platform cache directory.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub fn cache_dir_for(&self, config: &AppConfig) -> Result<PathBuf, ConfigError> {
        let dir = config
            .cache
            .dir
            .clone()
            .unwrap_or_else(|| self.cache_dir.clone());
        fs::create_dir_all(&dir)?;
        debug!(path = %dir.display(), "Cache directory ready");
        Ok(dir)
    }
}

/// Replaces `path` through a temp file in the same directory, so readers never see half a file.
fn write_toml(path: &Path, value: &AppConfig) -> Result<(), ConfigError> {
    let dir = path
        .parent()
        .ok_or_else(|| ConfigError::Orphan(path.to_path_buf()))?;
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(toml::to_string_pretty(value)?.as_bytes())?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
