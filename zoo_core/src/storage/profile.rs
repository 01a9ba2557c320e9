use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::core::errors::ProfileError;
use crate::validator::{parse_acl, validate_host_port, validate_non_empty};

/// A saved connection preset. The coordination-service address is its
/// identifier inside a [`ProfileStore`](super::ProfileStore).
///
/// JSON looks like:
/// `{ "server":"localhost:2181", "ssh_enabled":false, "ssh_server":"", ..., "acl":["digest:a:b"] }`
///
/// Connection state is deliberately not a field: it lives in the
/// [`ProfileManager`](crate::core::lifecycle::ProfileManager) and resets on reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub server: String,
    #[serde(default)]
    pub ssh_enabled: bool,
    #[serde(default)]
    pub ssh_server: String,
    #[serde(default)]
    pub ssh_username: String,
    #[serde(default)]
    pub ssh_password: String,
    #[serde(default)]
    pub remote_server: String,
    #[serde(default)]
    pub acl: Vec<String>,
}

impl Profile {
    /// Returns the unique identifier.
    pub fn id(&self) -> &str {
        &self.server
    }
}

/// Names a profile field in a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    Server,
    SshServer,
    SshUsername,
    SshPassword,
    RemoteServer,
    Acl,
}

impl Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProfileField::Server => "server",
            ProfileField::SshServer => "sshServer",
            ProfileField::SshUsername => "sshUsername",
            ProfileField::SshPassword => "sshPassword",
            ProfileField::RemoteServer => "remoteServer",
            ProfileField::Acl => "acl",
        };
        f.write_str(name)
    }
}

/// An editable, not-yet-committed profile.
///
/// A draft built with [`ProfileDraft::new`] has no identity yet. One built
/// with [`ProfileDraft::from_profile`] remembers the identifier it was opened
/// from; changing `server` on it turns the save into a brand new profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDraft {
    pub server: String,
    pub ssh_enabled: bool,
    pub ssh_server: String,
    pub ssh_username: String,
    pub ssh_password: String,
    pub remote_server: String,
    /// Raw ACL text, one `scheme:id:permissions` entry per line.
    pub acl_text: String,
    origin: Option<String>,
}

impl ProfileDraft {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Self::default()
        }
    }

    /// Opens an existing profile for editing.
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            server: profile.server.clone(),
            ssh_enabled: profile.ssh_enabled,
            ssh_server: profile.ssh_server.clone(),
            ssh_username: profile.ssh_username.clone(),
            ssh_password: profile.ssh_password.clone(),
            remote_server: profile.remote_server.clone(),
            acl_text: profile.acl.join("\n"),
            origin: Some(profile.server.clone()),
        }
    }

    /// Builder helper: enable the SSH tunnel with all four of its fields.
    pub fn with_tunnel(
        mut self,
        ssh_server: impl Into<String>,
        ssh_username: impl Into<String>,
        ssh_password: impl Into<String>,
        remote_server: impl Into<String>,
    ) -> Self {
        self.ssh_enabled = true;
        self.ssh_server = ssh_server.into();
        self.ssh_username = ssh_username.into();
        self.ssh_password = ssh_password.into();
        self.remote_server = remote_server.into();
        self
    }

    pub fn with_acl(mut self, acl_text: impl Into<String>) -> Self {
        self.acl_text = acl_text.into();
        self
    }

    /// `true` unless this draft edits an already persisted profile under
    /// the same identifier.
    pub fn is_new_draft(&self) -> bool {
        self.origin.as_deref() != Some(self.server.as_str())
    }

    /// Runs every field check and builds the profile to persist.
    ///
    /// The first failing field is reported. SSH fields are only checked
    /// when the tunnel is enabled; otherwise they are carried over as-is.
    pub fn validate(&self) -> Result<Profile, ProfileError> {
        if !validate_host_port(&self.server) {
            return Err(invalid(ProfileField::Server, "must match pattern [host:port]"));
        }
        if self.ssh_enabled {
            if !validate_host_port(&self.remote_server) {
                return Err(invalid(
                    ProfileField::RemoteServer,
                    "must match pattern [host:port]",
                ));
            }
            if !validate_non_empty(&self.ssh_username) {
                return Err(invalid(ProfileField::SshUsername, "cannot be empty"));
            }
            if !validate_non_empty(&self.ssh_password) {
                return Err(invalid(ProfileField::SshPassword, "cannot be empty"));
            }
            if !validate_host_port(&self.ssh_server) {
                return Err(invalid(
                    ProfileField::SshServer,
                    "must match pattern [host:port]",
                ));
            }
        }
        let acl = parse_acl(&self.acl_text)
            .ok_or_else(|| invalid(ProfileField::Acl, "syntax not supported, expected scheme:id:permissions"))?;

        Ok(Profile {
            server: self.server.clone(),
            ssh_enabled: self.ssh_enabled,
            ssh_server: self.ssh_server.clone(),
            ssh_username: self.ssh_username.clone(),
            ssh_password: self.ssh_password.clone(),
            remote_server: self.remote_server.clone(),
            acl,
        })
    }
}

fn invalid(field: ProfileField, reason: &str) -> ProfileError {
    ProfileError::Validation {
        field,
        reason: reason.to_string(),
    }
}
