pub mod config;
pub mod connections;
pub mod core;
pub mod storage;
pub mod utils;
pub mod validator;

// re‑export ergonomic entry points
pub use config::Settings;
pub use crate::core::connection_broker::ConnectionBroker;
pub use crate::core::errors::ProfileError;
pub use crate::core::lifecycle::{ProfileEvent, ProfileManager, ProfileState};
pub use crate::core::session_registry::{CloseEvent, CloseReason, SessionHandle, SessionRegistry};
pub use storage::{Profile, ProfileDraft, ProfileStore};
