use std::fmt;
use std::sync::Arc;
use std::{fs, io, path::PathBuf};

use directories::ProjectDirs;
use log::{debug, error, warn};

use super::errors::StorageError;
use super::persistence::ProfilePersistence;
use super::profile::Profile;
use super::secrets::{KeyringSecrets, SecretStore};

/// One pretty-printed JSON file per profile.
///
/// With a [`SecretStore`] attached, the SSH password of a tunnelled profile
/// is kept there and the JSON copy is written with an empty password.
#[derive(Clone)]
pub struct JsonFilePersistence {
    dir: PathBuf,
    secrets: Option<Arc<dyn SecretStore>>,
}

impl fmt::Debug for JsonFilePersistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFilePersistence")
            .field("dir", &self.dir)
            .field("secrets", &self.secrets.is_some())
            .finish()
    }
}

impl JsonFilePersistence {
    /// `~/.config/zoo/profiles` on Linux, `%APPDATA%\zoo\profiles` on Windows, etc.
    pub fn new() -> Result<Self, StorageError> {
        Self::in_dir(default_profiles_dir()?)
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, secrets: None })
    }

    /// Keep SSH passwords in the OS keyring instead of the JSON files.
    pub fn with_keyring(self, secrets: KeyringSecrets) -> Self {
        self.with_secrets(secrets)
    }

    pub fn with_secrets(mut self, secrets: impl SecretStore + 'static) -> Self {
        self.secrets = Some(Arc::new(secrets));
        self
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn file_for(&self, id: &str) -> PathBuf {
        self.dir.join(file_name_for(id))
    }

    fn read_profile(&self, path: &PathBuf) -> Result<Profile, StorageError> {
        let file = fs::File::open(path)?;
        Ok(serde_json::from_reader(io::BufReader::new(file))?)
    }

    /// Only tunnelled profiles with no password on disk consult the store.
    fn restore_password(&self, profile: &mut Profile) -> Result<(), StorageError> {
        let Some(secrets) = &self.secrets else {
            return Ok(());
        };
        if !profile.ssh_enabled || !profile.ssh_password.is_empty() {
            return Ok(());
        }
        match secrets.load(profile.id()) {
            Ok(Some(password)) => profile.ssh_password = password,
            Ok(None) => warn!("No stored SSH password for '{}'", profile.id()),
            Err(e) => {
                error!("Could not read SSH password for '{}': {}", profile.id(), e);
                return Err(e);
            }
        }
        Ok(())
    }
}

impl ProfilePersistence for JsonFilePersistence {
    /// Returns every stored profile. Malformed files are skipped with a
    /// warning; a failing secret store is an error.
    fn load_all(&self) -> Result<Vec<Profile>, StorageError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let mut profile = match self.read_profile(&path) {
                Ok(profile) => profile,
                Err(e) => {
                    warn!("Could not read {:?}: {e}", path);
                    continue;
                }
            };
            self.restore_password(&mut profile)?;
            out.push(profile);
        }
        debug!("Loaded {} profile(s) from {:?}", out.len(), self.dir);
        Ok(out)
    }

    /// Create or overwrite a profile.
    fn persist(&mut self, profile: &Profile) -> Result<(), StorageError> {
        let mut on_disk = profile.clone();
        if let Some(secrets) = &self.secrets {
            if profile.ssh_enabled && !profile.ssh_password.is_empty() {
                secrets.store(profile.id(), &profile.ssh_password)?;
            } else {
                secrets.remove(profile.id())?;
            }
            on_disk.ssh_password.clear();
        }
        let file = fs::File::create(self.file_for(profile.id()))?;
        serde_json::to_writer_pretty(file, &on_disk)?;
        debug!("Persisted profile '{}'", profile.id());
        Ok(())
    }

    /// Missing files are not an error.
    fn delete(&mut self, id: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.file_for(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(secrets) = &self.secrets {
            secrets.remove(id)?;
        }
        debug!("Deleted profile '{}'", id);
        Ok(())
    }
}

pub(crate) fn project_dirs() -> Result<ProjectDirs, StorageError> {
    ProjectDirs::from("", "", "zoo").ok_or(StorageError::ConfigDir)
}

pub fn default_profiles_dir() -> Result<PathBuf, StorageError> {
    Ok(project_dirs()?.config_dir().join("profiles"))
}

/// `localhost:2181` → `localhost_2181.json`. Ports are digits only, so the
/// mapping stays unique for valid identifiers.
fn file_name_for(id: &str) -> String {
    format!("{}.json", id.replace(':', "_"))
}
