use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::errors::StorageError;
use super::profile::Profile;

/// Durable backing for a [`ProfileStore`](super::ProfileStore).
///
/// Calls are synchronous and assumed durable once they return `Ok`.
pub trait ProfilePersistence: Send {
    fn load_all(&self) -> Result<Vec<Profile>, StorageError>;
    fn persist(&mut self, profile: &Profile) -> Result<(), StorageError>;
    fn delete(&mut self, id: &str) -> Result<(), StorageError>;
}

/// Keeps profiles in process memory.
///
/// Clones share the same map, so a test can hold one clone and inspect what
/// the store wrote through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    profiles: Arc<Mutex<BTreeMap<String, Profile>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the backing map, as if the profiles had been saved in an earlier run.
    pub fn with_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let map = profiles
            .into_iter()
            .map(|p| (p.id().to_string(), p))
            .collect();
        Self {
            profiles: Arc::new(Mutex::new(map)),
        }
    }

    pub fn snapshot(&self) -> Vec<Profile> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Profile>> {
        // A poisoned map still holds consistent data; every write is a single insert/remove.
        self.profiles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProfilePersistence for MemoryPersistence {
    fn load_all(&self) -> Result<Vec<Profile>, StorageError> {
        Ok(self.snapshot())
    }

    fn persist(&mut self, profile: &Profile) -> Result<(), StorageError> {
        self.lock()
            .insert(profile.id().to_string(), profile.clone());
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<(), StorageError> {
        self.lock().remove(id);
        Ok(())
    }
}
