// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

pub mod fake_collaborators;
pub mod fake_secrets;

use std::sync::Arc;

use log::LevelFilter;
use tokio::time::{timeout, Duration};
use zoo_core::storage::MemoryPersistence;
use zoo_core::{
    ConnectionBroker, ProfileDraft, ProfileError, ProfileEvent, ProfileManager, ProfileStore,
};

use fake_collaborators::{FakeConnector, FakeTunnelOpener};

/// Logs will appear only when you run with `-- --nocapture`
/// or when the test fails.
pub fn init_logs() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

pub struct Harness {
    pub manager: ProfileManager,
    pub connector: FakeConnector,
    pub tunnels: FakeTunnelOpener,
    pub persistence: MemoryPersistence,
}

pub fn harness() -> Harness {
    harness_with(MemoryPersistence::new())
}

pub fn harness_with(persistence: MemoryPersistence) -> Harness {
    init_logs();
    let connector = FakeConnector::new();
    let tunnels = FakeTunnelOpener::new();
    let broker = ConnectionBroker::new(Arc::new(connector.clone()))
        .with_tunnels(Arc::new(tunnels.clone()));
    let store = ProfileStore::load(Box::new(persistence.clone())).expect("memory store loads");
    Harness {
        manager: ProfileManager::new(store, broker),
        connector,
        tunnels,
        persistence,
    }
}

pub fn tunnelled_draft(server: &str) -> ProfileDraft {
    ProfileDraft::new(server).with_tunnel("bastion:22", "zk", "secret", "10.0.0.5:2181")
}

/// A small timeout converts hangs into readable test failures.
pub async fn next(manager: &mut ProfileManager) -> Result<Option<ProfileEvent>, ProfileError> {
    timeout(Duration::from_secs(2), manager.process_next())
        .await
        .expect("timed out waiting for a lifecycle event")
}
