//! Shared controller state
//!
//! Thread-safe view of the controller, shared between the actor task and the
//! owning application: which pin is on air, plus the event broadcast bus.

use crate::events::PlaylistEvent;
use tokio::sync::{broadcast, RwLock};

/// Shared state accessible by all components
pub struct SharedState {
    /// Playlist index of the source currently on air (None before the first
    /// switch and after exhaustion drains)
    playing: RwLock<Option<usize>>,

    /// Event broadcaster for controller lifecycle events
    event_tx: broadcast::Sender<PlaylistEvent>,
}

impl SharedState {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            playing: RwLock::new(None),
            event_tx,
        }
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast_event(&self, event: PlaylistEvent) {
        // Ignore send errors (no receivers is OK)
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to the controller's event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<PlaylistEvent> {
        self.event_tx.subscribe()
    }

    /// Playlist index of the source currently on air
    pub async fn playing(&self) -> Option<usize> {
        *self.playing.read().await
    }

    pub async fn set_playing(&self, index: Option<usize>) {
        *self.playing.write().await = index;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
