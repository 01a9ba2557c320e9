//! Deterministic **in‑process stand‑ins** for the broker's collaborators
//! (`Connector` / `ClientSession` and `TunnelOpener` / `Tunnel`).
//!
//! *  **From the test’s perspective**
//!    * `FakeConnector::hold()` parks every `connect` until the returned
//!      `Notify` is triggered, keeping an attempt "in flight".
//!    * `FakeConnector::drop_remote(addr)` / `break_remote(addr, why)` end a
//!      session from the remote side, as a server shutdown or network
//!      failure would.
//!    * `connected_to()` / `closed()` record what the broker did.
//!
//! *  **Why this exists**: the real broker, registry and lifecycle code
//!    run unchanged, without opening a TCP socket or an SSH session.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};
use zoo_core::connections::{
    ClientSession, ConnectionError, Connector, Tunnel, TunnelOpener, TunnelSpec,
};

#[derive(Default)]
struct ConnectorState {
    refuse: Option<String>,
    gate: Option<Arc<Notify>>,
    connected_to: Vec<String>,
    closed: Vec<String>,
    remotes: Vec<(String, oneshot::Sender<Result<(), String>>)>,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every following `connect` fails with `ConnectionError::Connect(reason)`.
    pub fn refuse(&self, reason: &str) {
        self.state.lock().unwrap().refuse = Some(reason.to_string());
    }

    pub fn accept(&self) {
        self.state.lock().unwrap().refuse = None;
    }

    /// Parks every following `connect` until the returned gate is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().unwrap().gate = Some(gate.clone());
        gate
    }

    /// Addresses `connect` was called with, in order.
    pub fn connected_to(&self) -> Vec<String> {
        self.state.lock().unwrap().connected_to.clone()
    }

    /// Addresses whose session had `close()` called on it.
    pub fn closed(&self) -> Vec<String> {
        self.state.lock().unwrap().closed.clone()
    }

    /// Orderly close from the remote side of the oldest live session to `address`.
    pub fn drop_remote(&self, address: &str) -> bool {
        self.end_remote(address, Ok(()))
    }

    /// Network failure on the oldest live session to `address`.
    pub fn break_remote(&self, address: &str, why: &str) -> bool {
        self.end_remote(address, Err(why.to_string()))
    }

    fn end_remote(&self, address: &str, outcome: Result<(), String>) -> bool {
        let mut state = self.state.lock().unwrap();
        state.remotes.retain(|(_, tx)| !tx.is_closed());
        match state.remotes.iter().position(|(addr, _)| addr == address) {
            Some(i) => {
                let (_, tx) = state.remotes.remove(i);
                tx.send(outcome).is_ok()
            }
            None => false,
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn ClientSession>, ConnectionError> {
        let gate = self.state.lock().unwrap().gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        state.connected_to.push(address.to_string());
        if let Some(reason) = &state.refuse {
            return Err(ConnectionError::Connect(reason.clone()));
        }
        let (remote_tx, remote_rx) = oneshot::channel();
        state.remotes.push((address.to_string(), remote_tx));
        Ok(Box::new(FakeSession {
            address: address.to_string(),
            remote_rx: Some(remote_rx),
            connector: self.clone(),
        }))
    }
}

struct FakeSession {
    address: String,
    remote_rx: Option<oneshot::Receiver<Result<(), String>>>,
    connector: FakeConnector,
}

#[async_trait]
impl ClientSession for FakeSession {
    async fn wait_closed(&mut self) -> Result<(), ConnectionError> {
        let Some(rx) = self.remote_rx.as_mut() else {
            return Ok(());
        };
        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(why)) => Err(ConnectionError::Connect(why)),
            // The test never ended this session; stay open.
            Err(_) => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.remote_rx = None;
        self.connector
            .state
            .lock()
            .unwrap()
            .closed
            .push(self.address.clone());
        Ok(())
    }
}

#[derive(Default)]
struct TunnelState {
    refuse: Option<String>,
    opened: Vec<TunnelSpec>,
    closed: Vec<SocketAddr>,
    next_port: u16,
}

#[derive(Clone, Default)]
pub struct FakeTunnelOpener {
    state: Arc<Mutex<TunnelState>>,
}

impl FakeTunnelOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every following `open` fails, as a rejected SSH login would.
    pub fn refuse(&self, reason: &str) {
        self.state.lock().unwrap().refuse = Some(reason.to_string());
    }

    pub fn opened(&self) -> Vec<TunnelSpec> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn closed(&self) -> Vec<SocketAddr> {
        self.state.lock().unwrap().closed.clone()
    }
}

#[async_trait]
impl TunnelOpener for FakeTunnelOpener {
    async fn open(&self, spec: &TunnelSpec) -> Result<Box<dyn Tunnel>, ConnectionError> {
        let mut state = self.state.lock().unwrap();
        state.opened.push(spec.clone());
        if let Some(reason) = &state.refuse {
            return Err(ConnectionError::Tunnel(reason.clone()));
        }
        let local_addr = SocketAddr::from(([127, 0, 0, 1], 40000 + state.next_port));
        state.next_port += 1;
        Ok(Box::new(FakeTunnel {
            local_addr,
            opener: self.clone(),
        }))
    }
}

struct FakeTunnel {
    local_addr: SocketAddr,
    opener: FakeTunnelOpener,
}

#[async_trait]
impl Tunnel for FakeTunnel {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.opener.state.lock().unwrap().closed.push(self.local_addr);
        Ok(())
    }
}
