//! In-memory `SecretStore` that can be switched into a failing state, as an
//! OS keyring that is locked or missing would be.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use zoo_core::storage::{SecretStore, StorageError};

#[derive(Default)]
struct SecretsState {
    secrets: HashMap<String, String>,
    unavailable: bool,
}

#[derive(Clone, Default)]
pub struct FakeSecrets {
    state: Arc<Mutex<SecretsState>>,
}

impl FakeSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every following call fails with a platform error.
    pub fn make_unavailable(&self) {
        self.state.lock().unwrap().unavailable = true;
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.state.lock().unwrap().secrets.get(id).cloned()
    }

    fn check(state: &SecretsState) -> Result<(), StorageError> {
        if state.unavailable {
            return Err(StorageError::Keyring(keyring::Error::PlatformFailure(
                "secure storage is locked".into(),
            )));
        }
        Ok(())
    }
}

impl SecretStore for FakeSecrets {
    fn store(&self, id: &str, password: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state)?;
        state.secrets.insert(id.to_string(), password.to_string());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<String>, StorageError> {
        let state = self.state.lock().unwrap();
        Self::check(&state)?;
        Ok(state.secrets.get(id).cloned())
    }

    fn remove(&self, id: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state)?;
        state.secrets.remove(id);
        Ok(())
    }
}
