use crate::connections::{
    connection::{Tunnel, TunnelOpener, TunnelSpec},
    errors::ConnectionError,
};
use async_trait::async_trait;
use log::{debug, error, info};
use ssh2::{Channel, Session};

use std::io::ErrorKind;
use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tokio::sync::oneshot;

/// Brings up `ssh2` tunnels. Each tunnel owns a blocking worker thread.
#[derive(Debug, Clone)]
pub struct SshTunnelOpener {
    io_timeout: Duration,
}

impl Default for SshTunnelOpener {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl SshTunnelOpener {
    pub fn new(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }
}

pub struct SshTunnel {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

#[async_trait]
impl TunnelOpener for SshTunnelOpener {
    async fn open(&self, spec: &TunnelSpec) -> Result<Box<dyn Tunnel>, ConnectionError> {
        info!(
            "Opening SSH tunnel via {} as {} to {}:{}",
            spec.ssh_addr(),
            spec.username,
            spec.remote_host,
            spec.remote_port
        );
        let spec = spec.clone();
        let io_timeout = self.io_timeout;
        let shutdown = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();

        let worker = {
            let shutdown = shutdown.clone();
            thread::spawn(move || run_tunnel(spec, io_timeout, shutdown, ready_tx))
        };

        match ready_rx.await {
            Ok(Ok(local_addr)) => Ok(Box::new(SshTunnel {
                local_addr,
                shutdown,
                worker: Some(worker),
            })),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ConnectionError::Tunnel(
                "tunnel worker exited before reporting readiness".into(),
            )),
        }
    }
}

#[async_trait]
impl Tunnel for SshTunnel {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(jh) = self.worker.take() {
            let _ = tokio::task::spawn_blocking(move || jh.join()).await;
        }
        Ok(())
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        // tell worker to exit
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

// ---------------- blocking worker -----------------------------

fn run_tunnel(
    spec: TunnelSpec,
    io_timeout: Duration,
    shutdown: Arc<AtomicBool>,
    ready_tx: oneshot::Sender<Result<SocketAddr, ConnectionError>>,
) {
    let (session, listener, local_addr) = match establish(&spec, io_timeout) {
        Ok(v) => v,
        Err(e) => {
            error!("SSH tunnel via {} failed: {}", spec.ssh_addr(), e);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    if ready_tx.send(Ok(local_addr)).is_err() {
        return; // opener gone
    }
    info!("SSH tunnel established on {}", local_addr);
    session.set_blocking(false);

    // ---- forwarding loop --------------------------------------
    let mut pumps: Vec<Pump> = Vec::new();
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => match open_forward(&session, &spec, stream) {
                Ok(pump) => {
                    debug!("Forwarding {} through tunnel {}", peer, local_addr);
                    pumps.push(pump);
                }
                Err(e) => error!("Could not open direct-tcpip channel: {}", e),
            },
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => {
                error!("Tunnel accept error: {}", e);
                break;
            }
        }

        pumps.retain_mut(Pump::pump);
        thread::sleep(Duration::from_millis(2));
    }

    drop(pumps);
    session.set_blocking(true);
    let _ = session.disconnect(None, "tunnel closed", None);
    info!("SSH tunnel on {} closed", local_addr);
}

fn establish(
    spec: &TunnelSpec,
    io_timeout: Duration,
) -> Result<(Session, TcpListener, SocketAddr), ConnectionError> {
    let addr = spec
        .ssh_addr()
        .to_socket_addrs()
        .map_err(|e| tunnel_error("resolve", e))?
        .next()
        .ok_or_else(|| ConnectionError::Tunnel(format!("{} did not resolve", spec.ssh_addr())))?;
    let tcp = TcpStream::connect_timeout(&addr, io_timeout)
        .map_err(|e| tunnel_error("TCP connect", e))?;

    let mut session = Session::new().map_err(|e| tunnel_error("session", e))?;
    session.set_timeout(u32::try_from(io_timeout.as_millis()).unwrap_or(u32::MAX));
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| tunnel_error("handshake", e))?;
    session
        .userauth_password(&spec.username, &spec.password)
        .map_err(|e| tunnel_error("authentication", e))?;
    if !session.authenticated() {
        return Err(ConnectionError::Tunnel("SSH authentication failed".into()));
    }

    let listener = TcpListener::bind(("127.0.0.1", 0)).map_err(|e| tunnel_error("bind", e))?;
    listener
        .set_nonblocking(true)
        .map_err(|e| tunnel_error("bind", e))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| tunnel_error("bind", e))?;
    Ok((session, listener, local_addr))
}

fn open_forward(
    session: &Session,
    spec: &TunnelSpec,
    stream: TcpStream,
) -> Result<Pump, ConnectionError> {
    session.set_blocking(true);
    let channel = session.channel_direct_tcpip(&spec.remote_host, spec.remote_port, None);
    session.set_blocking(false);
    let channel = channel.map_err(|e| tunnel_error("direct-tcpip", e))?;
    stream.set_nonblocking(true)?;
    Ok(Pump {
        stream,
        channel,
        to_remote: Vec::new(),
        to_local: Vec::new(),
    })
}

fn tunnel_error(stage: &str, err: impl std::fmt::Display) -> ConnectionError {
    ConnectionError::Tunnel(format!("{stage}: {err}"))
}

/// One local client stream spliced onto one SSH channel.
struct Pump {
    stream: TcpStream,
    channel: Channel,
    to_remote: Vec<u8>,
    to_local: Vec<u8>,
}

impl Pump {
    /// Moves whatever is ready in both directions. Returns `false` once
    /// either side is finished.
    fn pump(&mut self) -> bool {
        let mut buf = [0u8; 4096];

        // outgoing
        if self.to_remote.is_empty() {
            match self.stream.read(&mut buf) {
                Ok(0) => return false,
                Ok(n) => self.to_remote.extend_from_slice(&buf[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => {
                    debug!("Local read error: {}", e);
                    return false;
                }
            }
        }
        if !flush_pending(&mut self.channel, &mut self.to_remote) {
            return false;
        }

        // incoming
        if self.to_local.is_empty() {
            match self.channel.read(&mut buf) {
                Ok(0) if self.channel.eof() => return false,
                Ok(0) => {}
                Ok(n) => self.to_local.extend_from_slice(&buf[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => {
                    debug!("Channel read error: {}", e);
                    return false;
                }
            }
        }
        flush_pending(&mut self.stream, &mut self.to_local)
    }
}

impl Drop for Pump {
    fn drop(&mut self) {
        let _ = self.channel.close();
    }
}

/// Writes as much of `pending` as the sink accepts without blocking.
fn flush_pending(sink: &mut impl Write, pending: &mut Vec<u8>) -> bool {
    while !pending.is_empty() {
        match sink.write(pending) {
            Ok(0) => return false,
            Ok(n) => {
                pending.drain(..n);
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => return true,
            Err(_) => return false,
        }
    }
    true
}
