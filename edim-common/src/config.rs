//! Configuration loading and root folder resolution
//!
//! Resolution priority for every setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "EDIM_ROOT_FOLDER";

/// Environment variable naming an explicit config file
pub const CONFIG_FILE_ENV: &str = "EDIM_CONFIG";

/// Default database file name inside the root folder
pub const DEFAULT_DATABASE_FILE: &str = "edim.db";

/// Default timezone for local dates and arrival-time subtitles
pub const DEFAULT_TIMEZONE: &str = "Europe/Helsinki";

/// Default language for titles derived from single-language source data
pub const DEFAULT_LANGUAGE: &str = "fi";

/// Default API bind address
pub const DEFAULT_API_BIND: &str = "127.0.0.1:5780";

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub database_file: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: Option<String>,
    /// Skip API key checks entirely (development only)
    pub auth_disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load the platform config file, or defaults when none exists
    ///
    /// A file that exists but does not parse is an error; a missing file is not.
    pub fn load() -> Result<Self> {
        match locate_config_file() {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::from_file(&path)
            }
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Configured timezone, falling back to [`DEFAULT_TIMEZONE`]
    pub fn timezone(&self) -> Result<Tz> {
        let name = self.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        name.parse::<Tz>()
            .map_err(|e| Error::Config(format!("Unknown timezone '{}': {}", name, e)))
    }

    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }

    pub fn api_bind(&self) -> &str {
        self.api.bind.as_deref().unwrap_or(DEFAULT_API_BIND)
    }

    /// Database file inside the resolved root folder
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        root_folder.join(
            self.database_file
                .as_deref()
                .unwrap_or(DEFAULT_DATABASE_FILE),
        )
    }
}

/// Resolve the root folder holding the database
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Find the config file: `EDIM_CONFIG`, then the per-user file, then (Linux) `/etc/edim`
fn locate_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        warn!("{} points to missing file {}", CONFIG_FILE_ENV, path.display());
    }

    let user_config = dirs::config_dir().map(|d| d.join("edim").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/edim/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("edim"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/edim"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("edim"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\edim"))
    } else {
        dirs::data_dir()
            .map(|d| d.join("edim"))
            .unwrap_or_else(|| PathBuf::from("./edim_data"))
    }
}
