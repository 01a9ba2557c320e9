use std::net::SocketAddr;

use async_trait::async_trait;

use super::errors::ConnectionError;
use crate::storage::Profile;
use crate::validator::split_host_port;

/// Opens coordination-service client sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// `address` is either the profile's server or, when tunnelled, the
    /// tunnel's local endpoint.
    async fn connect(&self, address: &str) -> Result<Box<dyn ClientSession>, ConnectionError>;
}

/// A live coordination-service session.
#[async_trait]
pub trait ClientSession: Send {
    /// Resolves once the remote side went away: `Ok` for an orderly close,
    /// `Err` for a network failure.
    async fn wait_closed(&mut self) -> Result<(), ConnectionError>;
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Establishes SSH tunnels.
#[async_trait]
pub trait TunnelOpener: Send + Sync {
    async fn open(&self, spec: &TunnelSpec) -> Result<Box<dyn Tunnel>, ConnectionError>;
}

/// A local port forwarded to a remote target through an SSH server.
#[async_trait]
pub trait Tunnel: Send {
    fn local_addr(&self) -> SocketAddr;
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Everything needed to bring a tunnel up, parsed from a profile.
#[derive(Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    pub ssh_host: String,
    pub ssh_port: u16,
    pub username: String,
    pub password: String,
    pub remote_host: String,
    pub remote_port: u16,
}

impl TunnelSpec {
    /// `Ok(None)` when the profile does not use a tunnel.
    pub fn from_profile(profile: &Profile) -> Result<Option<Self>, ConnectionError> {
        if !profile.ssh_enabled {
            return Ok(None);
        }
        let (ssh_host, ssh_port) = split_host_port(&profile.ssh_server).ok_or_else(|| {
            ConnectionError::Tunnel(format!("malformed ssh server '{}'", profile.ssh_server))
        })?;
        let (remote_host, remote_port) =
            split_host_port(&profile.remote_server).ok_or_else(|| {
                ConnectionError::Tunnel(format!(
                    "malformed remote server '{}'",
                    profile.remote_server
                ))
            })?;
        Ok(Some(Self {
            ssh_host: ssh_host.to_string(),
            ssh_port,
            username: profile.ssh_username.clone(),
            password: profile.ssh_password.clone(),
            remote_host: remote_host.to_string(),
            remote_port,
        }))
    }

    pub fn ssh_addr(&self) -> String {
        format!("{}:{}", self.ssh_host, self.ssh_port)
    }
}

// Manual Debug impl so the password never ends up in a log line.
impl std::fmt::Debug for TunnelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelSpec")
            .field("ssh_host", &self.ssh_host)
            .field("ssh_port", &self.ssh_port)
            .field("username", &self.username)
            .field("remote_host", &self.remote_host)
            .field("remote_port", &self.remote_port)
            .finish()
    }
}
