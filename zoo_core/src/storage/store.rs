use std::collections::BTreeMap;

use log::{debug, info};

use super::persistence::ProfilePersistence;
use super::profile::{Profile, ProfileDraft};
use crate::core::errors::ProfileError;

/// Maps profile identifiers to profiles and is the only writer of
/// identifier uniqueness. Every mutation goes through the persistence
/// collaborator first; the in-memory map is only touched once that succeeded.
pub struct ProfileStore {
    profiles: BTreeMap<String, Profile>,
    persistence: Box<dyn ProfilePersistence>,
}

impl ProfileStore {
    /// Loads every profile the collaborator knows about.
    pub fn load(persistence: Box<dyn ProfilePersistence>) -> Result<Self, ProfileError> {
        let profiles = persistence
            .load_all()?
            .into_iter()
            .map(|p| (p.id().to_string(), p))
            .collect::<BTreeMap<_, _>>();
        info!("Profile store loaded with {} profile(s)", profiles.len());
        Ok(Self {
            profiles,
            persistence,
        })
    }

    pub fn exists(&self, id: &str) -> bool {
        self.profiles.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Profile> {
        self.profiles.get(id)
    }

    /// Every profile, ordered by identifier.
    pub fn list(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Validates the draft and upserts it.
    ///
    /// A new draft whose identifier is already taken fails with
    /// [`ProfileError::DuplicateProfile`]; nothing is written on any failure.
    pub fn save(&mut self, draft: &ProfileDraft) -> Result<Profile, ProfileError> {
        let profile = draft.validate()?;
        if draft.is_new_draft() && self.exists(profile.id()) {
            return Err(ProfileError::DuplicateProfile(profile.id().to_string()));
        }
        self.persistence.persist(&profile)?;
        debug!("Saved profile '{}'", profile.id());
        self.profiles
            .insert(profile.id().to_string(), profile.clone());
        Ok(profile)
    }

    /// Removes a profile. Unknown identifiers fail with [`ProfileError::NotFound`].
    pub fn remove(&mut self, id: &str) -> Result<Profile, ProfileError> {
        if !self.exists(id) {
            return Err(ProfileError::NotFound(id.to_string()));
        }
        self.persistence.delete(id)?;
        debug!("Removed profile '{}'", id);
        self.profiles
            .remove(id)
            .ok_or_else(|| ProfileError::NotFound(id.to_string()))
    }
}
