//! Configuration types for the search service.

use imep_search::{SearchConfig, SrilmConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, ServiceError};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "IMEP_CONFIG";

/// Top-level configuration for the search service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Corpus, noise phrase and model store locations.
    pub data: DataConfig,
    /// SRILM binaries.
    pub scorer: SrilmConfig,
    /// Cascade tuning.
    pub search: SearchConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind (`0` = auto-assign).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
        }
    }
}

/// Locations of the data files. Relative paths are resolved against `dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Base directory of the data files.
    pub dir: PathBuf,
    /// Incipit corpus, one encoded entry per line.
    pub incipits: PathBuf,
    /// Explicit corpus, one encoded entry per line.
    pub explicits: PathBuf,
    /// Noise phrases stripped from incipit queries.
    pub incipit_noise: PathBuf,
    /// Noise phrases stripped from explicit queries.
    pub explicit_noise: PathBuf,
    /// Directory of precomputed per-entry models.
    pub model_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            incipits: PathBuf::from("incipits.text"),
            explicits: PathBuf::from("explicits.text"),
            incipit_noise: PathBuf::from("nonevents_incipits.text"),
            explicit_noise: PathBuf::from("nonevents_explicits.text"),
            model_dir: PathBuf::from("models"),
        }
    }
}

impl DataConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        self.dir.join(path)
    }

    /// Resolved incipit corpus path.
    pub fn incipits_path(&self) -> PathBuf {
        self.resolve(&self.incipits)
    }

    /// Resolved explicit corpus path.
    pub fn explicits_path(&self) -> PathBuf {
        self.resolve(&self.explicits)
    }

    /// Resolved incipit noise phrase path.
    pub fn incipit_noise_path(&self) -> PathBuf {
        self.resolve(&self.incipit_noise)
    }

    /// Resolved explicit noise phrase path.
    pub fn explicit_noise_path(&self) -> PathBuf {
        self.resolve(&self.explicit_noise)
    }

    /// Resolved model store directory.
    pub fn model_dir_path(&self) -> PathBuf {
        self.resolve(&self.model_dir)
    }
}

/// Log output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// If set, logs are also written to a daily-rolling file here.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "imep=info,imep_search=info".to_owned(),
            directory: None,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ServiceError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ServiceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/imep/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("imep")
            .join("config.toml")
    }

    /// Load the config at `path` if given, else the default path if it
    /// exists, else the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a chosen file cannot be read or parsed, or if the
    /// result is invalid.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_config_path();
                if default.is_file() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(ServiceError::Config("server.host must not be empty".into()));
        }
        self.scorer.validate()?;
        self.search.validate()?;
        Ok(())
    }
}
