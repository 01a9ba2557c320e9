use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::connections::{connection::ClientSession, connection::Connector, errors::ConnectionError};

/// Opens a plain TCP transport to the coordination service.
///
/// The coordination wire protocol is layered on top by whoever consumes the
/// session; this type only owns the socket and notices when it goes away.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn ClientSession>, ConnectionError> {
        info!("Connecting to coordination service at {}", address);
        let stream = timeout(self.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| ConnectionError::Connect(format!("timed out connecting to {address}")))?
            .map_err(|e| ConnectionError::Connect(format!("{address}: {e}")))?;
        stream.set_nodelay(true)?;
        Ok(Box::new(TcpSession {
            address: address.to_string(),
            stream: Some(stream),
        }))
    }
}

struct TcpSession {
    address: String,
    stream: Option<TcpStream>,
}

#[async_trait]
impl ClientSession for TcpSession {
    async fn wait_closed(&mut self) -> Result<(), ConnectionError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        let mut buf = [0u8; 1024];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => {
                    debug!("Peer {} closed the stream", self.address);
                    return Ok(());
                }
                Ok(n) => debug!("Discarding {} unsolicited byte(s) from {}", n, self.address),
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("Closed TCP session to {}", self.address);
        }
        Ok(())
    }
}
