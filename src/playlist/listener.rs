//! Shared listener registry
//!
//! One socket, many logical sources: listener-mode SRT and RTMP nodes are
//! created once per `(protocol, port)` at controller construction and live
//! for the controller's lifetime. Playlist slots bind to them with a
//! per-handle event callback; the registry fans each engine event out to
//! every currently attached handle.
//!
//! RTP and WHIP are deliberately absent here: items of those types create a
//! fresh standalone node per use.

use crate::engine::{
    InputEvent, InputEventSender, InputNode, ListenerProtocol, StreamGate, StreamKey,
    StreamPublishAccept,
};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-handle event callback. Invoked by the fan-out task outside the
/// registry lock, so a callback may detach itself.
pub type ListenerCallback = Arc<dyn Fn(&InputEvent) + Send + Sync>;

type CallbackMap = Arc<Mutex<HashMap<Uuid, ListenerCallback>>>;

struct ListenerEntry {
    node: Arc<dyn InputNode>,
    callbacks: CallbackMap,
    fan_out: JoinHandle<()>,
}

/// A handle's registration on a listener; detaching it is the handle's unit
/// of release. Cheap to clone so a callback can carry its own registration
/// and detach itself after firing.
#[derive(Clone)]
pub struct ListenerAttachment {
    callbacks: Weak<Mutex<HashMap<Uuid, ListenerCallback>>>,
    handle_id: Uuid,
}

impl ListenerAttachment {
    /// Remove this handle's callback. No-op if already detached or the
    /// registry is gone.
    pub fn detach(&self) {
        if let Some(callbacks) = self.callbacks.upgrade() {
            let mut map = callbacks.lock().unwrap();
            if map.remove(&self.handle_id).is_some() {
                debug!("Detached listener callback {}", self.handle_id);
            }
        }
    }
}

/// Registry of shared listener nodes, keyed by `(protocol, port)`.
pub struct ListenerRegistry {
    entries: HashMap<(ListenerProtocol, u16), ListenerEntry>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create the listener node for `(protocol, port)` if absent. Idempotent.
    ///
    /// `create` receives the event sender the node must report on; the
    /// registry owns the receiving side and fans events out to attached
    /// handles.
    pub async fn ensure<F, Fut>(
        &mut self,
        protocol: ListenerProtocol,
        port: u16,
        create: F,
    ) -> Result<()>
    where
        F: FnOnce(InputEventSender) -> Fut,
        Fut: Future<Output = Result<Arc<dyn InputNode>>>,
    {
        if self.entries.contains_key(&(protocol, port)) {
            debug!("Listener {}:{} already registered", protocol, port);
            return Ok(());
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let node = create(event_tx).await?;

        let callbacks: CallbackMap = Arc::new(Mutex::new(HashMap::new()));
        let fan_out = tokio::spawn(fan_out_events(event_rx, Arc::clone(&callbacks)));

        debug!("Registered {} listener on port {}", protocol, port);
        self.entries.insert(
            (protocol, port),
            ListenerEntry {
                node,
                callbacks,
                fan_out,
            },
        );
        Ok(())
    }

    /// The shared node for `(protocol, port)`.
    pub fn get(&self, protocol: ListenerProtocol, port: u16) -> Result<Arc<dyn InputNode>> {
        self.entries
            .get(&(protocol, port))
            .map(|entry| Arc::clone(&entry.node))
            .ok_or(Error::NoListener { protocol, port })
    }

    /// Register a per-handle event callback on a listener.
    pub fn attach(
        &self,
        protocol: ListenerProtocol,
        port: u16,
        handle_id: Uuid,
        callback: ListenerCallback,
    ) -> Result<ListenerAttachment> {
        let entry = self
            .entries
            .get(&(protocol, port))
            .ok_or(Error::NoListener { protocol, port })?;

        entry.callbacks.lock().unwrap().insert(handle_id, callback);
        Ok(ListenerAttachment {
            callbacks: Arc::downgrade(&entry.callbacks),
            handle_id,
        })
    }

    /// Remove a per-handle callback. No-op if absent.
    pub fn detach(&self, protocol: ListenerProtocol, port: u16, handle_id: Uuid) {
        if let Some(entry) = self.entries.get(&(protocol, port)) {
            entry.callbacks.lock().unwrap().remove(&handle_id);
        }
    }

    /// Number of handles currently attached to a listener.
    pub fn attached(&self, protocol: ListenerProtocol, port: u16) -> usize {
        self.entries
            .get(&(protocol, port))
            .map(|entry| entry.callbacks.lock().unwrap().len())
            .unwrap_or(0)
    }

    pub fn contains(&self, protocol: ListenerProtocol, port: u16) -> bool {
        self.entries.contains_key(&(protocol, port))
    }

    /// Close every listener node and stop the fan-out tasks.
    pub async fn shutdown(&mut self) {
        for ((protocol, port), entry) in self.entries.drain() {
            debug!("Closing {} listener on port {}", protocol, port);
            entry.fan_out.abort();
            entry.node.close().await;
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain a listener node's events, invoking every attached callback.
///
/// Callbacks are snapshotted under the lock and invoked outside it, so a
/// callback may attach or detach handles without deadlocking.
async fn fan_out_events(mut rx: mpsc::UnboundedReceiver<InputEvent>, callbacks: CallbackMap) {
    while let Some(event) = rx.recv().await {
        let snapshot: Vec<ListenerCallback> =
            callbacks.lock().unwrap().values().cloned().collect();
        for callback in snapshot {
            callback(&event);
        }
    }
    if !callbacks.lock().unwrap().is_empty() {
        warn!("Listener event stream ended with handles still attached");
    }
}

/// Publish gate installed on every RTMP listener node: accept each publish
/// under `source_name = "<app>/<publishing_name>"` with fixed rendition
/// `default` for both stream keys. This is what makes multi-publisher
/// demultiplexing work.
pub fn rtmp_publish_gate() -> StreamGate {
    Arc::new(|request| {
        let source_name = format!("{}/{}", request.app, request.publishing_name);
        Some(StreamPublishAccept {
            audio_key: StreamKey::new(1, "default", 257, source_name.clone()),
            video_key: StreamKey::new(1, "default", 256, source_name.clone()),
            source_name,
        })
    })
}
