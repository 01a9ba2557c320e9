pub mod ssh_tunnel;

pub use ssh_tunnel::*;
