pub mod connection_broker;
pub mod errors;
pub mod lifecycle;
pub mod session_registry;

// Re-export the modules here for easy import elsewhere.
pub use connection_broker::*;
pub use errors::*;
pub use lifecycle::*;
pub use session_registry::*;
