use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::json_file::project_dirs;
use crate::storage::{default_profiles_dir, StorageError};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Contents of `settings.toml`. Every field is optional in the file.
///
/// ```toml
/// profiles_dir = "/srv/zoo/profiles"
/// use_keyring = true
/// connect_timeout_secs = 5
/// log_level = "debug"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub profiles_dir: Option<PathBuf>,
    pub use_keyring: bool,
    pub connect_timeout_secs: u64,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profiles_dir: None,
            use_keyring: false,
            connect_timeout_secs: 10,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// `~/.config/zoo/settings.toml` on Linux and the platform equivalent elsewhere.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        Ok(project_dirs()?.config_dir().join("settings.toml"))
    }

    /// Reads the settings file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No settings file at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_toml(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn profiles_dir(&self) -> Result<PathBuf, SettingsError> {
        match &self.profiles_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(default_profiles_dir()?),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
