//! Project configuration from `.blockdiff.toml` and the environment

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::storage::STORAGE_DIR;

pub const CONFIG_FILE: &str = ".blockdiff.toml";

pub const ENV_HOST: &str = "BLOCKDIFF_HOST";
pub const ENV_PORT: &str = "BLOCKDIFF_PORT";
pub const ENV_STORAGE_DIR: &str = "BLOCKDIFF_STORAGE_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection {
            host: "127.0.0.1".to_string(),
            port: 7878,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        StorageSection {
            dir: PathBuf::from(STORAGE_DIR),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    /// Extra block shapes merged over the built-in catalog.
    pub path: Option<PathBuf>,
}

/// CSS class names the client applies for each kind of decoration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Classes {
    pub added: String,
    pub removed: String,
    pub changed: String,
    pub connection: String,
    pub invalid: String,
    pub search: String,
}

impl Default for Classes {
    fn default() -> Self {
        Classes {
            added: "blockdiff-added".to_string(),
            removed: "blockdiff-removed".to_string(),
            changed: "blockdiff-changed".to_string(),
            connection: "blockdiff-connection".to_string(),
            invalid: "blockdiff-invalid".to_string(),
            search: "blockdiff-search".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub catalog: CatalogSection,
    pub classes: Classes,
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Load `path`, or defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// `root/.blockdiff.toml` (or `explicit`) overlaid with the environment,
    /// after loading `.env` if present.
    pub fn discover(root: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        let path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.join(CONFIG_FILE));
        let mut config = Self::load(&path)?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.server.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_PORT.to_string(),
                value: port,
            })?;
        }
        if let Some(dir) = lookup(ENV_STORAGE_DIR) {
            self.storage.dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Catalog path resolved against `root`.
    pub fn catalog_path(&self, root: &Path) -> Option<PathBuf> {
        self.catalog.path.as_ref().map(|p| root.join(p))
    }
}
