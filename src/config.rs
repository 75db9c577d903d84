//! Application settings loaded from `config.toml`.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs, UserDirs};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable that overrides [`AppConfig::database_path`].
pub const DB_PATH_ENV: &str = "PIECES_DB_PATH";

const APPLICATION: &str = "PieceAssignment";
const CONFIG_FILE_NAME: &str = "config.toml";
const DB_FILE_NAME: &str = "pieces.sqlite";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Root under which exported reports are filed by user, status and date.
    pub reports_root: PathBuf,
    /// Create the default users when the database file is first created.
    pub seed_default_users: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("", "", APPLICATION)
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("data"));
        let documents = UserDirs::new()
            .and_then(|dirs| dirs.document_dir().map(Path::to_path_buf))
            .or_else(|| BaseDirs::new().map(|dirs| dirs.home_dir().join("Documents")))
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            database_path: data_dir.join(DB_FILE_NAME),
            reports_root: documents.join(APPLICATION).join("Reports"),
            seed_default_users: true,
        }
    }
}

impl AppConfig {
    /// Replace the database path when `value` is set and non-empty.
    pub fn with_database_override(mut self, value: Option<OsString>) -> Self {
        if let Some(value) = value.filter(|value| !value.is_empty()) {
            self.database_path = PathBuf::from(value);
        }
        self
    }
}

/// `config.toml` inside the platform configuration directory, when one exists.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", APPLICATION).map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Load settings from `path`, or from [`default_config_path`] when `path` is
/// `None`. An explicit path must exist; a missing default file yields the
/// defaults. [`DB_PATH_ENV`] is applied last.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => read_config(path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => read_config(&path)?,
            _ => {
                debug!("no configuration file, using defaults");
                AppConfig::default()
            }
        },
    };
    Ok(config.with_database_override(std::env::var_os(DB_PATH_ENV)))
}

fn read_config(path: &Path) -> Result<AppConfig> {
    debug!("loading configuration from {:?}", path);
    let contents = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read config file {path:?}: {e}")))?;
    parse_config(&contents)
        .map_err(|e| Error::Config(format!("failed to parse config file {path:?}: {e}")))
}

fn parse_config(contents: &str) -> std::result::Result<AppConfig, toml::de::Error> {
    toml::from_str(contents)
}
