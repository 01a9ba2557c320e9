use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::oneshot;

use crate::connections::connection::{ClientSession, Connector, Tunnel, TunnelOpener, TunnelSpec};
use crate::connections::errors::ConnectionError;
#[cfg(feature = "ssh")]
use crate::connections::SshTunnelOpener;
use crate::connections::TcpConnector;
use crate::core::session_registry::{
    CloseEvent, CloseReason, SessionHandle, SessionRegistry,
};
use crate::storage::Profile;

/// Opens sessions on behalf of profiles and reports when they end.
///
/// 1. `open` brings up the SSH tunnel (if the profile asks for one), connects
///    the client through it and registers the session.
/// 2. A per-session watcher task waits for either a local `close` or the
///    remote end going away, tears everything down, unregisters the session
///    and fires its close listeners. That single exit path is what makes a
///    close notification fire exactly once, whatever caused it.
///
/// Cloning is cheap and shares the registry and collaborators.
#[derive(Clone)]
pub struct ConnectionBroker {
    registry: SessionRegistry,
    connector: Arc<dyn Connector>,
    tunnels: Option<Arc<dyn TunnelOpener>>,
    next_session_id: Arc<AtomicU64>,
}

impl ConnectionBroker {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            connector,
            tunnels: None,
            next_session_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// TCP client plus, with the `ssh` feature, the `ssh2` tunnel.
    pub fn with_default_collaborators(io_timeout: Duration) -> Self {
        let broker = Self::new(Arc::new(TcpConnector::new(io_timeout)));
        #[cfg(feature = "ssh")]
        let broker = broker.with_tunnels(Arc::new(SshTunnelOpener::new(io_timeout)));
        broker
    }

    pub fn with_tunnels(mut self, opener: Arc<dyn TunnelOpener>) -> Self {
        self.tunnels = Some(opener);
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Opens a session for `profile`.
    ///
    /// Tunnel failures come back as [`ConnectionError::Tunnel`]; everything
    /// after the tunnel is up is reported by the connector as-is.
    pub async fn open(&self, profile: &Profile) -> Result<SessionHandle, ConnectionError> {
        let id = profile.id().to_string();
        if self.registry.is_registered(&id).await {
            return Err(ConnectionError::AlreadyConnected(id));
        }

        let mut tunnel = match TunnelSpec::from_profile(profile)? {
            Some(spec) => Some(self.open_tunnel(&spec).await?),
            None => None,
        };
        let address = tunnel
            .as_ref()
            .map(|t| t.local_addr().to_string())
            .unwrap_or_else(|| id.clone());

        let mut session = match self.connector.connect(&address).await {
            Ok(session) => session,
            Err(e) => {
                close_tunnel(&mut tunnel).await;
                return Err(e);
            }
        };

        let handle = SessionHandle::new(
            id.clone(),
            self.next_session_id.fetch_add(1, Ordering::SeqCst),
        );
        let (stop_tx, stop_rx) = oneshot::channel();
        if let Err(e) = self.registry.register_with_stop(handle.clone(), stop_tx).await {
            let _ = session.close().await;
            close_tunnel(&mut tunnel).await;
            return Err(e);
        }

        let watcher = tokio::spawn(watch_session(
            self.registry.clone(),
            handle.clone(),
            session,
            tunnel,
            stop_rx,
        ));
        self.registry.attach_watcher(&handle, watcher).await;

        info!(
            "Session {} opened for '{}' via {}",
            handle.session_id(),
            id,
            address
        );
        Ok(handle)
    }

    async fn open_tunnel(&self, spec: &TunnelSpec) -> Result<Box<dyn Tunnel>, ConnectionError> {
        let opener = self.tunnels.as_ref().ok_or_else(|| {
            ConnectionError::Tunnel("SSH tunnelling is not available in this build".into())
        })?;
        opener.open(spec).await.map_err(|e| match e {
            e @ ConnectionError::Tunnel(_) => e,
            other => ConnectionError::Tunnel(other.to_string()),
        })
    }

    /// Subscribes `callback` to the end of the session behind `handle`.
    ///
    /// If the session is already gone the callback runs right away with
    /// [`CloseReason::AlreadyClosed`], so a caller never waits for a close
    /// that has already happened.
    pub async fn on_close<F>(&self, handle: &SessionHandle, callback: F)
    where
        F: FnOnce(CloseEvent) + Send + 'static,
    {
        if let Err(callback) = self.registry.add_listener(handle, Box::new(callback)).await {
            debug!(
                "Session {} for '{}' already closed",
                handle.session_id(),
                handle.profile_id()
            );
            callback(CloseEvent {
                handle: handle.clone(),
                reason: CloseReason::AlreadyClosed,
            });
        }
    }

    /// Closes a session and waits for its teardown; close listeners have run
    /// by the time this returns.
    pub async fn close(&self, handle: &SessionHandle) -> Result<(), ConnectionError> {
        let (stop_tx, watcher) = self
            .registry
            .begin_close(handle)
            .await
            .ok_or_else(|| ConnectionError::NoSession(handle.profile_id().to_string()))?;
        info!(
            "Closing session {} for '{}'",
            handle.session_id(),
            handle.profile_id()
        );
        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(());
        }
        if let Some(watcher) = watcher {
            let _ = watcher.await;
        }
        Ok(())
    }

    /// Stop all live sessions (best-effort).
    pub async fn close_all(&self) {
        for id in self.registry.ids().await {
            if let Some(handle) = self.registry.handle_of(&id).await {
                if let Err(e) = self.close(&handle).await {
                    warn!("Failed to close '{}' during shutdown: {}", id, e);
                }
            }
        }
    }
}

async fn watch_session(
    registry: SessionRegistry,
    handle: SessionHandle,
    mut session: Box<dyn ClientSession>,
    mut tunnel: Option<Box<dyn Tunnel>>,
    stop_rx: oneshot::Receiver<()>,
) {
    debug!(
        "Watcher started for session {} of '{}'",
        handle.session_id(),
        handle.profile_id()
    );
    // A dropped stop sender counts as a stop request.
    let reason = tokio::select! {
        _ = stop_rx => CloseReason::Local,
        result = session.wait_closed() => match result {
            Ok(()) => CloseReason::Remote,
            Err(e) => CloseReason::Failed(e.to_string()),
        },
    };
    info!(
        "Session {} for '{}' ended: {:?}",
        handle.session_id(),
        handle.profile_id(),
        reason
    );

    if let Err(e) = session.close().await {
        warn!("Error closing session for '{}': {}", handle.profile_id(), e);
    }
    close_tunnel(&mut tunnel).await;

    if let Some(entry) = registry.unregister_session(&handle).await {
        entry.notify_closed(reason);
    }
}

async fn close_tunnel(tunnel: &mut Option<Box<dyn Tunnel>>) {
    if let Some(tunnel) = tunnel.as_mut() {
        if let Err(e) = tunnel.close().await {
            warn!("Error closing tunnel on {}: {}", tunnel.local_addr(), e);
        }
    }
}
