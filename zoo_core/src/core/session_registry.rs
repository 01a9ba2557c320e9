use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::connections::errors::ConnectionError;

/// Identifies one live session. Two sessions opened for the same profile
/// one after another get different `session_id`s, so a late close
/// notification can never be mistaken for the current session's.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    profile_id: String,
    session_id: u64,
}

impl SessionHandle {
    pub fn new(profile_id: impl Into<String>, session_id: u64) -> Self {
        Self {
            profile_id: profile_id.into(),
            session_id,
        }
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called on this side.
    Local,
    /// The remote end shut the session down in an orderly way.
    Remote,
    /// The session broke (network failure, tunnel dropped, ...).
    Failed(String),
    /// A listener was attached after the session had already gone away.
    AlreadyClosed,
}

/// Delivered exactly once per session, whatever ended it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub handle: SessionHandle,
    pub reason: CloseReason,
}

pub type CloseCallback = Box<dyn FnOnce(CloseEvent) + Send>;

/// What the registry keeps per connected profile.
///
/// Close listeners fire when the entry is consumed by
/// [`RegistryEntry::notify_closed`] or, failing that, when it is dropped.
/// Either way each listener runs once.
pub struct RegistryEntry {
    handle: SessionHandle,
    stop_tx: Option<oneshot::Sender<()>>,
    watcher: Option<JoinHandle<()>>,
    listeners: Vec<CloseCallback>,
}

impl RegistryEntry {
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn notify_closed(mut self, reason: CloseReason) {
        self.fire(reason);
    }

    fn fire(&mut self, reason: CloseReason) {
        for listener in self.listeners.drain(..) {
            listener(CloseEvent {
                handle: self.handle.clone(),
                reason: reason.clone(),
            });
        }
    }
}

impl Drop for RegistryEntry {
    fn drop(&mut self) {
        self.fire(CloseReason::Local);
    }
}

/// Process-wide table of connected profile identifiers.
///
/// This is the only guard against two concurrent sessions under one profile,
/// and the lookup the broker uses to route a close back to its owner.
/// Cloning is cheap and shares the table.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, RegistryEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `handle.profile_id()`. Fails with
    /// [`ConnectionError::AlreadyConnected`] if the identifier is taken.
    pub async fn register(&self, handle: SessionHandle) -> Result<(), ConnectionError> {
        self.insert(handle, None).await
    }

    pub(crate) async fn register_with_stop(
        &self,
        handle: SessionHandle,
        stop_tx: oneshot::Sender<()>,
    ) -> Result<(), ConnectionError> {
        self.insert(handle, Some(stop_tx)).await
    }

    async fn insert(
        &self,
        handle: SessionHandle,
        stop_tx: Option<oneshot::Sender<()>>,
    ) -> Result<(), ConnectionError> {
        let mut map = self.inner.lock().await;
        if map.contains_key(handle.profile_id()) {
            return Err(ConnectionError::AlreadyConnected(
                handle.profile_id().to_string(),
            ));
        }
        debug!(
            "Registered session {} for '{}'",
            handle.session_id(),
            handle.profile_id()
        );
        map.insert(
            handle.profile_id().to_string(),
            RegistryEntry {
                handle,
                stop_tx,
                watcher: None,
                listeners: Vec::new(),
            },
        );
        Ok(())
    }

    /// Removes whatever is registered under `id`. Unknown ids are a no-op.
    ///
    /// Dropping the returned entry fires its close listeners.
    pub async fn unregister(&self, id: &str) -> Option<RegistryEntry> {
        let removed = self.inner.lock().await.remove(id);
        if removed.is_some() {
            debug!("Unregistered '{}'", id);
        }
        removed
    }

    /// Like [`unregister`](Self::unregister), but only if `handle` is still
    /// the registered session.
    pub(crate) async fn unregister_session(&self, handle: &SessionHandle) -> Option<RegistryEntry> {
        let mut map = self.inner.lock().await;
        if !map
            .get(handle.profile_id())
            .is_some_and(|entry| entry.handle == *handle)
        {
            return None;
        }
        debug!(
            "Unregistered session {} for '{}'",
            handle.session_id(),
            handle.profile_id()
        );
        map.remove(handle.profile_id())
    }

    pub async fn is_registered(&self, id: &str) -> bool {
        self.inner.lock().await.contains_key(id)
    }

    pub async fn handle_of(&self, id: &str) -> Option<SessionHandle> {
        self.inner.lock().await.get(id).map(|e| e.handle.clone())
    }

    /// Registered identifiers, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub(crate) async fn attach_watcher(&self, handle: &SessionHandle, watcher: JoinHandle<()>) {
        let mut map = self.inner.lock().await;
        match map.get_mut(handle.profile_id()) {
            Some(entry) if entry.handle == *handle => entry.watcher = Some(watcher),
            // Session already ended; dropping the JoinHandle just detaches it.
            _ => {}
        }
    }

    /// Hands the listener back if `handle` is no longer registered.
    pub(crate) async fn add_listener(
        &self,
        handle: &SessionHandle,
        listener: CloseCallback,
    ) -> Result<(), CloseCallback> {
        let mut map = self.inner.lock().await;
        match map.get_mut(handle.profile_id()) {
            Some(entry) if entry.handle == *handle => {
                entry.listeners.push(listener);
                Ok(())
            }
            _ => Err(listener),
        }
    }

    /// Takes the session's stop signal and watcher. A second close of the same
    /// session finds both already taken and returns without waiting.
    pub(crate) async fn begin_close(
        &self,
        handle: &SessionHandle,
    ) -> Option<(Option<oneshot::Sender<()>>, Option<JoinHandle<()>>)> {
        let mut map = self.inner.lock().await;
        match map.get_mut(handle.profile_id()) {
            Some(entry) if entry.handle == *handle => {
                Some((entry.stop_tx.take(), entry.watcher.take()))
            }
            _ => None,
        }
    }
}
