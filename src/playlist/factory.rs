//! Source factory
//!
//! Turns one playlist item into a running source handle: either a freshly
//! created standalone input node, or a handle onto a shared listener from
//! the registry. Either way the caller gets the same shape back (a node to
//! subscribe, a stream-key filter, a duration probe, and an idempotent
//! close handle), plus source-type-specific event routing that feeds the
//! controller's advance logic.

use crate::engine::{
    InputEvent, InputNode, InputSpec, ListenerProtocol, MediaEngine, NodeId,
};
use crate::error::Result;
use crate::events::EndReason;
use crate::playlist::item::{PlaylistItem, PlaylistSource, SourceKind, SrtMode};
use crate::playlist::listener::{ListenerAttachment, ListenerCallback, ListenerRegistry};
use crate::playlist::select::{accept_all, source_name_filter, StreamKeyFilter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

/// Events the factory's routing raises towards the controller.
#[derive(Debug)]
pub enum SourceEvent {
    /// The source stopped producing (EOF or transport loss)
    Ended { index: usize, reason: EndReason },

    /// The source node's visible streams changed; readiness may have too
    StreamsChanged { index: usize },

    /// An engine node finished tearing down
    NodeClosed { node_id: NodeId },
}

/// Resolves to the item's playing duration once the engine knows it.
///
/// Known immediately for everything except MP4 files, whose natural
/// duration arrives asynchronously with container metadata.
pub enum DurationProbe {
    Known(Option<u64>),
    Pending(oneshot::Receiver<Option<u64>>),
}

impl DurationProbe {
    pub async fn resolve(self) -> Option<u64> {
        match self {
            DurationProbe::Known(duration) => duration,
            // A dropped sender (node closed before metadata) means no duration
            DurationProbe::Pending(rx) => rx.await.ok().flatten(),
        }
    }
}

/// Idempotent teardown for one slot's source handle.
///
/// Standalone nodes are closed after a grace delay so the switcher's
/// crossfade can drain; shared listener handles only detach their event
/// callback and leave the node running.
#[derive(Clone)]
pub struct CloseHandle {
    inner: Arc<CloseInner>,
}

struct CloseInner {
    closed: AtomicBool,
    action: CloseAction,
}

enum CloseAction {
    Standalone {
        node: Arc<dyn InputNode>,
        grace: Duration,
    },
    Detach(ListenerAttachment),
}

impl CloseHandle {
    pub(crate) fn standalone(node: Arc<dyn InputNode>, grace: Duration) -> Self {
        Self {
            inner: Arc::new(CloseInner {
                closed: AtomicBool::new(false),
                action: CloseAction::Standalone { node, grace },
            }),
        }
    }

    pub(crate) fn detach(attachment: ListenerAttachment) -> Self {
        Self {
            inner: Arc::new(CloseInner {
                closed: AtomicBool::new(false),
                action: CloseAction::Detach(attachment),
            }),
        }
    }

    /// Release the handle. Safe to call any number of times.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match &self.inner.action {
            CloseAction::Standalone { node, grace } => {
                let node = Arc::clone(node);
                let grace = *grace;
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    debug!("Closing input node {} after grace delay", node.id());
                    node.close().await;
                });
            }
            CloseAction::Detach(attachment) => attachment.detach(),
        }
    }
}

/// Everything the controller needs to run one playlist item.
pub struct CreatedSource {
    pub node: Arc<dyn InputNode>,
    pub node_id: NodeId,
    pub kind: SourceKind,
    pub filter: StreamKeyFilter,
    pub duration: DurationProbe,
    pub close: CloseHandle,
}

/// How the per-node router reacts to source events.
enum RouterProfile {
    /// EOF closes the node and advances
    File,
    /// Transport loss closes the node and advances
    SrtCaller,
    /// Images, RTP, WHIP: nothing ends these from the engine side
    Passive,
}

pub struct SourceFactory {
    engine: Arc<dyn MediaEngine>,
    events: mpsc::UnboundedSender<SourceEvent>,
    close_grace: Duration,
}

impl SourceFactory {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        events: mpsc::UnboundedSender<SourceEvent>,
        close_grace: Duration,
    ) -> Self {
        Self {
            engine,
            events,
            close_grace,
        }
    }

    /// Produce the source handle for `item` at playlist position `index`.
    ///
    /// Listener-mode SRT and RTMP items bind to a pre-created registry node;
    /// everything else gets a fresh standalone node named `"input-<index>"`.
    pub async fn create(
        &self,
        item: &PlaylistItem,
        index: usize,
        registry: &ListenerRegistry,
    ) -> Result<CreatedSource> {
        let kind = item.source.kind();
        debug!(
            "Creating source for item {} ({})",
            index,
            item.source.describe()
        );

        match &item.source {
            PlaylistSource::TsFile { file_name } => {
                self.standalone(
                    index,
                    kind,
                    InputSpec::TsFile {
                        path: file_name.clone(),
                        begin_ms: item.begin_ms,
                    },
                    RouterProfile::File,
                    false,
                )
                .await
            }
            PlaylistSource::Mp4File { file_name } => {
                self.standalone(
                    index,
                    kind,
                    InputSpec::Mp4File {
                        path: file_name.clone(),
                        begin_ms: item.begin_ms,
                    },
                    RouterProfile::File,
                    true,
                )
                .await
            }
            PlaylistSource::Srt {
                mode: SrtMode::Caller,
                ip,
                port,
            } => {
                self.standalone(
                    index,
                    kind,
                    InputSpec::SrtCaller {
                        ip: ip.clone(),
                        port: *port,
                    },
                    RouterProfile::SrtCaller,
                    false,
                )
                .await
            }
            PlaylistSource::Srt {
                mode: SrtMode::Listener,
                port,
                ..
            } => self.srt_listener(index, kind, *port, registry),
            PlaylistSource::Rtmp { port, app, stream } => {
                self.rtmp(index, kind, *port, app.as_deref(), stream.as_deref(), registry)
            }
            PlaylistSource::Image { file_name, image_format } => {
                self.standalone(
                    index,
                    kind,
                    InputSpec::Image {
                        path: file_name.clone(),
                        format: *image_format,
                    },
                    RouterProfile::Passive,
                    false,
                )
                .await
            }
            PlaylistSource::Rtp { streams } => {
                self.standalone(
                    index,
                    kind,
                    InputSpec::Rtp {
                        streams: streams.clone(),
                    },
                    RouterProfile::Passive,
                    false,
                )
                .await
            }
            PlaylistSource::Whip {} => {
                self.standalone(index, kind, InputSpec::Whip, RouterProfile::Passive, false)
                    .await
            }
        }
    }

    /// Create a fresh standalone node and spawn its event router.
    async fn standalone(
        &self,
        index: usize,
        kind: SourceKind,
        spec: InputSpec,
        profile: RouterProfile,
        probe_duration: bool,
    ) -> Result<CreatedSource> {
        let node_id: NodeId = format!("input-{index}");
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let node = self
            .engine
            .create_input(node_id.clone(), spec, event_tx)
            .await?;

        let close = CloseHandle::standalone(Arc::clone(&node), self.close_grace);

        let (duration, duration_tx) = if probe_duration {
            let (tx, rx) = oneshot::channel();
            (DurationProbe::Pending(rx), Some(tx))
        } else {
            (DurationProbe::Known(None), None)
        };

        tokio::spawn(route_node_events(
            profile,
            index,
            node_id.clone(),
            event_rx,
            close.clone(),
            self.events.clone(),
            duration_tx,
        ));

        Ok(CreatedSource {
            node,
            node_id,
            kind,
            filter: accept_all(),
            duration,
            close,
        })
    }

    /// Bind to the shared SRT listener; the disconnect callback fires once
    /// and then removes itself.
    fn srt_listener(
        &self,
        index: usize,
        kind: SourceKind,
        port: u16,
        registry: &ListenerRegistry,
    ) -> Result<CreatedSource> {
        let node = registry.get(ListenerProtocol::Srt, port)?;

        let attachment_slot: Arc<Mutex<Option<ListenerAttachment>>> =
            Arc::new(Mutex::new(None));
        let callback: ListenerCallback = {
            let events = self.events.clone();
            let attachment_slot = Arc::clone(&attachment_slot);
            Arc::new(move |event| match event {
                InputEvent::ConnectionChange {
                    connected: false, ..
                } => {
                    let _ = events.send(SourceEvent::Ended {
                        index,
                        reason: EndReason::Disconnected,
                    });
                    if let Some(attachment) = attachment_slot.lock().unwrap().take() {
                        attachment.detach();
                    }
                }
                InputEvent::StreamsChanged => {
                    let _ = events.send(SourceEvent::StreamsChanged { index });
                }
                _ => {}
            })
        };

        let attachment =
            registry.attach(ListenerProtocol::Srt, port, Uuid::new_v4(), callback)?;
        *attachment_slot.lock().unwrap() = Some(attachment.clone());

        Ok(CreatedSource {
            node_id: node.id().to_string(),
            node,
            kind,
            filter: accept_all(),
            duration: DurationProbe::Known(None),
            close: CloseHandle::detach(attachment),
        })
    }

    /// Bind to the shared RTMP listener. With `app` and `stream` configured,
    /// both the stream-key filter and the disconnect trigger are scoped to
    /// that one publisher.
    fn rtmp(
        &self,
        index: usize,
        kind: SourceKind,
        port: u16,
        app: Option<&str>,
        stream: Option<&str>,
        registry: &ListenerRegistry,
    ) -> Result<CreatedSource> {
        let node = registry.get(ListenerProtocol::Rtmp, port)?;

        let wanted = match (app, stream) {
            (Some(app), Some(stream)) => Some(format!("{app}/{stream}")),
            _ => None,
        };
        let filter = wanted
            .clone()
            .map(source_name_filter)
            .unwrap_or_else(accept_all);

        let callback: ListenerCallback = {
            let events = self.events.clone();
            let wanted = wanted.clone();
            Arc::new(move |event| match event {
                InputEvent::ConnectionChange {
                    connected: false,
                    source_name,
                } => {
                    let concerns_us = match (&wanted, source_name) {
                        (Some(wanted), Some(gone)) => wanted == gone,
                        (Some(_), None) => false,
                        (None, _) => true,
                    };
                    if concerns_us {
                        let _ = events.send(SourceEvent::Ended {
                            index,
                            reason: EndReason::Disconnected,
                        });
                    }
                }
                InputEvent::StreamsChanged => {
                    let _ = events.send(SourceEvent::StreamsChanged { index });
                }
                _ => {}
            })
        };

        let attachment =
            registry.attach(ListenerProtocol::Rtmp, port, Uuid::new_v4(), callback)?;

        Ok(CreatedSource {
            node_id: node.id().to_string(),
            node,
            kind,
            filter,
            duration: DurationProbe::Known(None),
            close: CloseHandle::detach(attachment),
        })
    }
}

/// Drain a standalone node's events and translate them for the controller.
async fn route_node_events(
    profile: RouterProfile,
    index: usize,
    node_id: NodeId,
    mut rx: mpsc::UnboundedReceiver<InputEvent>,
    close: CloseHandle,
    events: mpsc::UnboundedSender<SourceEvent>,
    mut duration_tx: Option<oneshot::Sender<Option<u64>>>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            InputEvent::Eof => {
                if matches!(profile, RouterProfile::File) {
                    close.close();
                    let _ = events.send(SourceEvent::Ended {
                        index,
                        reason: EndReason::Eof,
                    });
                }
            }
            InputEvent::Info { duration_ms } => {
                if let Some(tx) = duration_tx.take() {
                    let _ = tx.send(duration_ms);
                }
            }
            InputEvent::ConnectionChange {
                connected: false, ..
            } => {
                if matches!(profile, RouterProfile::SrtCaller) {
                    close.close();
                    let _ = events.send(SourceEvent::Ended {
                        index,
                        reason: EndReason::Disconnected,
                    });
                }
            }
            InputEvent::ConnectionChange { .. } => {}
            InputEvent::StreamsChanged => {
                let _ = events.send(SourceEvent::StreamsChanged { index });
            }
            InputEvent::Closed => {
                let _ = events.send(SourceEvent::NodeClosed {
                    node_id: node_id.clone(),
                });
            }
        }
    }
}
