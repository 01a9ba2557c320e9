//! The profile state machine.
//!
//! ```text
//!  Draft --save--> Saved --connect--> Connecting --ok--> Connected
//!                    ^                    |                  |
//!                    +------- failure ----+                  |
//!                    +------- close (local or remote) -------+
//! ```
//!
//! [`ProfileManager`] is the single writer of every profile's state. Work
//! that happens elsewhere (broker opens on a spawned task, close callbacks
//! from session watchers) is pushed onto an internal channel as a
//! [`LifecycleEvent`] and only applied when the owner calls
//! [`ProfileManager::process_next`] / [`ProfileManager::process_pending`].

use std::collections::HashMap;

use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc};

use crate::connections::errors::ConnectionError;
use crate::core::connection_broker::ConnectionBroker;
use crate::core::errors::ProfileError;
use crate::core::session_registry::{CloseEvent, SessionHandle};
use crate::storage::{Profile, ProfileDraft, ProfileStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileState {
    /// Not persisted yet, no identifier committed.
    Draft,
    /// Persisted, not connected.
    Saved,
    /// A connection attempt is in flight.
    Connecting,
    Connected,
}

/// What observers (views, the CLI) are told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileEvent {
    StateChanged { id: String, state: ProfileState },
    Removed { id: String },
    ConnectFailed { id: String, reason: String },
}

#[derive(Debug)]
pub enum LifecycleEvent {
    ConnectFinished {
        id: String,
        result: Result<SessionHandle, ConnectionError>,
    },
    Closed(CloseEvent),
}

/// Marshals close notifications from any task into the manager's queue.
#[derive(Clone)]
pub struct CloseNotifier {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl CloseNotifier {
    pub fn notify(&self, event: CloseEvent) {
        if self.tx.send(LifecycleEvent::Closed(event)).is_err() {
            debug!("Profile manager gone; dropping close notification");
        }
    }
}

pub struct ProfileManager {
    store: ProfileStore,
    broker: ConnectionBroker,
    states: HashMap<String, ProfileState>,
    /// Current session per connected profile.
    sessions: HashMap<String, SessionHandle>,
    events_tx: mpsc::UnboundedSender<LifecycleEvent>,
    events_rx: mpsc::UnboundedReceiver<LifecycleEvent>,
    observers: broadcast::Sender<ProfileEvent>,
}

impl ProfileManager {
    /// Every profile already in the store starts out `Saved`.
    pub fn new(store: ProfileStore, broker: ConnectionBroker) -> Self {
        let states = store
            .list()
            .map(|p| (p.id().to_string(), ProfileState::Saved))
            .collect();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (observers, _) = broadcast::channel(256);
        Self {
            store,
            broker,
            states,
            sessions: HashMap::new(),
            events_tx,
            events_rx,
            observers,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProfileEvent> {
        self.observers.subscribe()
    }

    pub fn close_notifier(&self) -> CloseNotifier {
        CloseNotifier {
            tx: self.events_tx.clone(),
        }
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn broker(&self) -> &ConnectionBroker {
        &self.broker
    }

    pub fn state(&self, id: &str) -> Option<ProfileState> {
        self.states.get(id).copied()
    }

    /// State of the profile a draft edits, or `Draft` if it is new.
    pub fn draft_state(&self, draft: &ProfileDraft) -> ProfileState {
        if draft.is_new_draft() {
            return ProfileState::Draft;
        }
        self.state(&draft.server).unwrap_or(ProfileState::Draft)
    }

    pub fn session(&self, id: &str) -> Option<&SessionHandle> {
        self.sessions.get(id)
    }

    /// Saved profiles with their current state, ordered by identifier.
    pub fn profiles(&self) -> Vec<(&Profile, ProfileState)> {
        self.store
            .list()
            .map(|p| {
                let state = self.state(p.id()).unwrap_or(ProfileState::Saved);
                (p, state)
            })
            .collect()
    }

    /// `Draft --save--> Saved`; for an existing profile, updates it in place
    /// without touching its connection state.
    pub fn save(&mut self, draft: &ProfileDraft) -> Result<Profile, ProfileError> {
        let profile = self.store.save(draft)?;
        if self.states.contains_key(profile.id()) {
            debug!("Updated profile '{}' in place", profile.id());
        } else {
            self.set_state(profile.id(), ProfileState::Saved);
        }
        Ok(profile)
    }

    /// `Saved --connect--> Connecting`.
    ///
    /// The open runs on a spawned task; its outcome is applied by a later
    /// [`process_next`](Self::process_next). There is no cancellation.
    pub fn connect(&mut self, id: &str) -> Result<(), ProfileError> {
        match self.state(id) {
            None | Some(ProfileState::Draft) => return Err(ProfileError::NotSaved(id.to_string())),
            Some(ProfileState::Connecting) => {
                return Err(ProfileError::AlreadyConnecting(id.to_string()))
            }
            Some(ProfileState::Connected) => {
                return Err(ProfileError::AlreadyConnected(id.to_string()))
            }
            Some(ProfileState::Saved) => {}
        }
        let profile = self
            .store
            .get(id)
            .cloned()
            .ok_or_else(|| ProfileError::NotSaved(id.to_string()))?;

        self.set_state(id, ProfileState::Connecting);

        let broker = self.broker.clone();
        let events_tx = self.events_tx.clone();
        let notifier = self.close_notifier();
        let id = id.to_string();
        tokio::spawn(async move {
            let result = broker.open(&profile).await;
            let handle = result.as_ref().ok().cloned();
            // Completion goes out before the close listener is attached so the
            // manager always sees ConnectFinished ahead of its Closed.
            if events_tx
                .send(LifecycleEvent::ConnectFinished { id, result })
                .is_err()
            {
                if let Some(handle) = handle {
                    debug!(
                        "Profile manager gone; closing new session for '{}'",
                        handle.profile_id()
                    );
                    let _ = broker.close(&handle).await;
                }
                return;
            }
            if let Some(handle) = handle {
                broker
                    .on_close(&handle, move |event| notifier.notify(event))
                    .await;
            }
        });
        Ok(())
    }

    /// `Connected --disconnect--> Saved`. Waits for the broker to tear the
    /// session down. A `Saved` profile is left alone.
    pub async fn disconnect(&mut self, id: &str) -> Result<(), ProfileError> {
        match self.state(id) {
            None => Err(ProfileError::NotFound(id.to_string())),
            Some(ProfileState::Connecting) => Err(ProfileError::AlreadyConnecting(id.to_string())),
            Some(ProfileState::Saved) | Some(ProfileState::Draft) => Ok(()),
            Some(ProfileState::Connected) => {
                if let Some(handle) = self.sessions.remove(id) {
                    match self.broker.close(&handle).await {
                        Ok(()) => {}
                        Err(ConnectionError::NoSession(_)) => {
                            debug!("Session for '{}' was already closed", id)
                        }
                        Err(e) => warn!("Error closing session for '{}': {}", id, e),
                    }
                }
                self.set_state(id, ProfileState::Saved);
                Ok(())
            }
        }
    }

    /// Removes a profile. A connected profile is closed fire-and-forget
    /// first; the removal does not wait for the broker.
    pub fn delete(&mut self, id: &str) -> Result<(), ProfileError> {
        match self.state(id) {
            None => return Err(ProfileError::NotFound(id.to_string())),
            Some(ProfileState::Connecting) => {
                return Err(ProfileError::AlreadyConnecting(id.to_string()))
            }
            _ => {}
        }

        if let Some(handle) = self.sessions.get(id).cloned() {
            let broker = self.broker.clone();
            tokio::spawn(async move {
                if let Err(e) = broker.close(&handle).await {
                    debug!("Close on delete for '{}': {}", handle.profile_id(), e);
                }
            });
        }

        // If this fails the pending close still brings the profile back to Saved.
        self.store.remove(id)?;
        self.sessions.remove(id);
        self.states.remove(id);
        info!("Profile '{}' deleted", id);
        self.publish(ProfileEvent::Removed { id: id.to_string() });
        Ok(())
    }

    /// Waits for the next queued event and applies it.
    ///
    /// `Ok(None)` means the event was a no-op (a duplicate or stale close, or
    /// the completion of an attempt whose profile is gone). A failed connect
    /// attempt comes back as `Err` after the profile returned to `Saved`.
    pub async fn process_next(&mut self) -> Result<Option<ProfileEvent>, ProfileError> {
        match self.events_rx.recv().await {
            Some(event) => self.apply(event),
            None => Ok(None),
        }
    }

    /// Applies everything already queued without waiting. No-ops are skipped.
    pub fn process_pending(&mut self) -> Vec<Result<ProfileEvent, ProfileError>> {
        let mut out = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            match self.apply(event) {
                Ok(Some(change)) => out.push(Ok(change)),
                Ok(None) => {}
                Err(e) => out.push(Err(e)),
            }
        }
        out
    }

    /// Drives the queue until `id` has left `Connecting`.
    pub async fn wait_settled(&mut self, id: &str) -> Result<ProfileState, ProfileError> {
        loop {
            match self.state(id) {
                Some(ProfileState::Connecting) => {
                    if let Err(e) = self.process_next().await {
                        if e.concerns(id) {
                            return Err(e);
                        }
                        warn!("{}", e);
                    }
                }
                Some(state) => return Ok(state),
                None => return Err(ProfileError::NotFound(id.to_string())),
            }
        }
    }

    fn apply(&mut self, event: LifecycleEvent) -> Result<Option<ProfileEvent>, ProfileError> {
        match event {
            LifecycleEvent::ConnectFinished { id, result } => self.finish_connect(id, result),
            LifecycleEvent::Closed(event) => Ok(self.handle_close(event)),
        }
    }

    fn finish_connect(
        &mut self,
        id: String,
        result: Result<SessionHandle, ConnectionError>,
    ) -> Result<Option<ProfileEvent>, ProfileError> {
        let connecting = self.state(&id) == Some(ProfileState::Connecting);
        match result {
            Ok(handle) if connecting => {
                self.sessions.insert(id.clone(), handle);
                Ok(Some(self.set_state(&id, ProfileState::Connected)))
            }
            Ok(handle) => {
                warn!("'{}' no longer awaits a session; closing it", id);
                let broker = self.broker.clone();
                tokio::spawn(async move {
                    let _ = broker.close(&handle).await;
                });
                Ok(None)
            }
            Err(e) if connecting => {
                self.set_state(&id, ProfileState::Saved);
                let err = ProfileError::from_connection(&id, e);
                warn!("{}", err);
                self.publish(ProfileEvent::ConnectFailed {
                    id,
                    reason: err.to_string(),
                });
                Err(err)
            }
            Err(e) => {
                debug!("Ignoring failed attempt for '{}': {}", id, e);
                Ok(None)
            }
        }
    }

    /// `Connected --close--> Saved`, once. Anything that is not the
    /// profile's current session is ignored.
    fn handle_close(&mut self, event: CloseEvent) -> Option<ProfileEvent> {
        let id = event.handle.profile_id().to_string();
        if self.sessions.get(&id) != Some(&event.handle) {
            debug!(
                "Ignoring close of session {} for '{}' ({:?})",
                event.handle.session_id(),
                id,
                event.reason
            );
            return None;
        }
        self.sessions.remove(&id);
        info!("'{}' disconnected: {:?}", id, event.reason);
        Some(self.set_state(&id, ProfileState::Saved))
    }

    fn set_state(&mut self, id: &str, state: ProfileState) -> ProfileEvent {
        let previous = self.states.insert(id.to_string(), state);
        debug!("'{}': {:?} -> {:?}", id, previous, state);
        let event = ProfileEvent::StateChanged {
            id: id.to_string(),
            state,
        };
        self.publish(event.clone());
        event
    }

    fn publish(&self, event: ProfileEvent) {
        // No subscribers is fine.
        let _ = self.observers.send(event);
    }
}

