pub mod errors;
pub mod json_file;
pub mod persistence;
pub mod profile;
pub mod secrets;
pub mod store;

// Re-export the modules here for easy import elsewhere.
pub use errors::*;
pub use json_file::*;
pub use persistence::*;
pub use profile::*;
pub use secrets::*;
pub use store::*;
