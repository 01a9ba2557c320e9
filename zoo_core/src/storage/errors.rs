use std::io;

use thiserror::Error;

/// Failures reported by a [`ProfilePersistence`](super::ProfilePersistence) collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("unable to locate config dir")]
    ConfigDir,
}
