use thiserror::Error;

use crate::connections::errors::ConnectionError;
use crate::storage::{ProfileField, StorageError};

/// Every failure a profile operation reports back to its caller.
///
/// None of these are fatal; validation and duplicate errors are fixed by the
/// user, the guard variants by caller discipline, and connect/tunnel errors
/// by an explicit retry.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("{field} {reason}")]
    Validation { field: ProfileField, reason: String },
    #[error("{0} already exists")]
    DuplicateProfile(String),
    #[error("no profile with id '{0}'")]
    NotFound(String),
    #[error("save config first: '{0}' is not a saved profile")]
    NotSaved(String),
    #[error("a connection attempt for '{0}' is already in flight")]
    AlreadyConnecting(String),
    #[error("'{0}' is already connected")]
    AlreadyConnected(String),
    #[error("connecting to '{id}' failed: {source}")]
    Connect {
        id: String,
        #[source]
        source: ConnectionError,
    },
    #[error("SSH tunnel for '{id}' failed: {source}")]
    Tunnel {
        id: String,
        #[source]
        source: ConnectionError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProfileError {
    /// Sorts a broker failure into the taxonomy above.
    pub fn from_connection(id: &str, err: ConnectionError) -> Self {
        match err {
            ConnectionError::AlreadyConnected(id) => ProfileError::AlreadyConnected(id),
            e @ ConnectionError::Tunnel(_) => ProfileError::Tunnel {
                id: id.to_string(),
                source: e,
            },
            e => ProfileError::Connect {
                id: id.to_string(),
                source: e,
            },
        }
    }

    /// `true` if this error is about profile `id`.
    pub fn concerns(&self, id: &str) -> bool {
        match self {
            ProfileError::DuplicateProfile(other)
            | ProfileError::NotFound(other)
            | ProfileError::NotSaved(other)
            | ProfileError::AlreadyConnecting(other)
            | ProfileError::AlreadyConnected(other) => other == id,
            ProfileError::Connect { id: other, .. } | ProfileError::Tunnel { id: other, .. } => {
                other == id
            }
            ProfileError::Validation { .. } | ProfileError::Storage(_) => false,
        }
    }
}
