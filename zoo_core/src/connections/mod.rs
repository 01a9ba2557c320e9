pub mod connection;
pub mod errors;
#[cfg(feature = "ssh")]
pub mod ssh;
pub mod tcp;

// Re-export the modules here for easy import elsewhere.
pub use connection::*;
pub use errors::*;
#[cfg(feature = "ssh")]
pub use ssh::SshTunnelOpener;
pub use tcp::TcpConnector;
