use keyring::Entry;
use log::debug;

use super::errors::StorageError;

/// Where SSH passwords live when they are kept out of the profile files.
pub trait SecretStore: Send + Sync {
    fn store(&self, id: &str, password: &str) -> Result<(), StorageError>;

    /// Returns `Ok(None)` when no secret was ever stored for `id`.
    fn load(&self, id: &str) -> Result<Option<String>, StorageError>;

    /// Removing a secret that does not exist is not an error.
    fn remove(&self, id: &str) -> Result<(), StorageError>;
}

/// Stores SSH passwords in the OS keyring, one entry per profile identifier.
#[derive(Debug, Clone)]
pub struct KeyringSecrets {
    service: String,
}

impl Default for KeyringSecrets {
    fn default() -> Self {
        Self::new("zoo")
    }
}

impl KeyringSecrets {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl SecretStore for KeyringSecrets {
    fn store(&self, id: &str, password: &str) -> Result<(), StorageError> {
        debug!("Storing SSH password for '{}' in keyring", id);
        Entry::new(&self.service, id)?.set_password(password)?;
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<String>, StorageError> {
        match Entry::new(&self.service, id)?.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, id: &str) -> Result<(), StorageError> {
        match Entry::new(&self.service, id)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
