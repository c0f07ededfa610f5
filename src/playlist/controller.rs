//! Playlist controller
//!
//! The state machine that walks the playlist: it advances the three-slot
//! playout window, wires source handles into the switcher, schedules
//! duration-based advances, prewarms upcoming live items, and decides when
//! the crossfade actually happens.
//!
//! All state transitions run on a single actor task draining a command
//! channel. Engine callbacks, timers, and the public API post commands; an
//! `update` runs to completion before the next command is seen, so
//! transitions never interleave.

use crate::config::PlaylistConfig;
use crate::engine::{
    audio_output_key, video_output_key, AudioGainConfig, AudioSignalConfig, InputNode,
    InputSpec, ListenerProtocol, MediaEngine, MediaNode, NodeId, PinSubscription,
    StreamKeyOverrideConfig, SwitcherConfig,
};
use crate::error::{Error, Result};
use crate::events::{EndReason, PlaylistEvent};
use crate::playlist::factory::{CloseHandle, CreatedSource, SourceEvent, SourceFactory};
use crate::playlist::item::{PlaylistItem, PlaylistSource, SourceKind, SrtMode};
use crate::playlist::listener::{rtmp_publish_gate, ListenerRegistry};
use crate::playlist::select::{is_ready, pin_selector, silence_selector, StreamKeyFilter};
use crate::playlist::slots::{PlayingItem, Slots};
use crate::playlist::switcher::SwitcherBinding;
use crate::state::SharedState;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Commands processed by the controller actor.
enum Command {
    Start,
    Switch,
    DurationElapsed { index: usize },
    CommitSwitch { index: usize },
    Shutdown,
}

/// Which slot an installed source lands in.
enum SlotKind {
    Current,
    Next,
}

/// Handle onto a running playlist controller.
///
/// Created with [`Playlist::create`]; playback begins with [`Playlist::start`].
/// Downstream consumers subscribe to the [`Playlist::video`] and
/// [`Playlist::audio`] output nodes.
pub struct Playlist {
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<SharedState>,
    video: Arc<dyn MediaNode>,
    audio: Arc<dyn MediaNode>,
}

impl Playlist {
    /// Build the controller: switcher, silence chain and output overrides
    /// are created up front, and one listener node is pre-created for every
    /// listener-mode SRT or RTMP port the playlist references. Returns only
    /// once all of those exist.
    pub async fn create(
        engine: Arc<dyn MediaEngine>,
        items: Vec<PlaylistItem>,
        config: PlaylistConfig,
    ) -> Result<Self> {
        let switcher = engine
            .create_smooth_switcher(SwitcherConfig {
                transition_duration_ms: config.transition_duration_ms,
                output: config.output.clone(),
            })
            .await?;

        let signal = engine
            .create_audio_signal(AudioSignalConfig {
                channels: config.output.channels,
                sample_rate: config.output.sample_rate,
            })
            .await?;
        let silence = engine
            .create_audio_gain(AudioGainConfig {
                source: signal.id().to_string(),
                channel_gains: vec![0.0; config.output.channels as usize],
            })
            .await?;

        let video = engine
            .create_stream_key_override(StreamKeyOverrideConfig {
                source: switcher.id().to_string(),
                key: video_output_key(),
            })
            .await?;
        let audio = engine
            .create_stream_key_override(StreamKeyOverrideConfig {
                source: switcher.id().to_string(),
                key: audio_output_key(),
            })
            .await?;

        let mut registry = ListenerRegistry::new();
        for item in &items {
            match &item.source {
                PlaylistSource::Srt {
                    mode: SrtMode::Listener,
                    ip,
                    port,
                } => {
                    let id: NodeId = format!("listener-srt-{port}");
                    let spec = InputSpec::SrtListener {
                        ip: ip.clone(),
                        port: *port,
                    };
                    let engine = Arc::clone(&engine);
                    registry
                        .ensure(ListenerProtocol::Srt, *port, move |events| async move {
                            engine.create_input(id, spec, events).await
                        })
                        .await?;
                }
                PlaylistSource::Rtmp { port, .. } => {
                    let id: NodeId = format!("listener-rtmp-{port}");
                    let spec = InputSpec::RtmpServer {
                        port: *port,
                        on_stream: rtmp_publish_gate(),
                    };
                    let engine = Arc::clone(&engine);
                    registry
                        .ensure(ListenerProtocol::Rtmp, *port, move |events| async move {
                            engine.create_input(id, spec, events).await
                        })
                        .await?;
                }
                _ => {}
            }
        }

        let state = Arc::new(SharedState::new());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (source_tx, source_rx) = mpsc::unbounded_channel();
        let factory = SourceFactory::new(
            Arc::clone(&engine),
            source_tx,
            Duration::from_millis(config.close_grace_ms),
        );

        let controller = Controller {
            config,
            items,
            factory,
            registry,
            binding: SwitcherBinding::new(switcher),
            signal,
            silence,
            video: Arc::clone(&video),
            audio: Arc::clone(&audio),
            slots: Slots::new(),
            next_index: 0,
            playing: None,
            duration_timer: None,
            exhausted: false,
            commands: commands_tx.clone(),
            state: Arc::clone(&state),
        };
        tokio::spawn(controller.run(commands_rx, source_rx));

        Ok(Self {
            commands: commands_tx,
            state,
            video,
            audio,
        })
    }

    /// Begin playback from item 0.
    pub fn start(&self) -> Result<()> {
        self.send(Command::Start)
    }

    /// Advance to the next item now.
    pub fn switch(&self) -> Result<()> {
        self.send(Command::Switch)
    }

    /// Relabelled video output node.
    pub fn video(&self) -> Arc<dyn MediaNode> {
        Arc::clone(&self.video)
    }

    /// Relabelled audio output node.
    pub fn audio(&self) -> Arc<dyn MediaNode> {
        Arc::clone(&self.audio)
    }

    /// Subscribe to controller lifecycle events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<PlaylistEvent> {
        self.state.subscribe_events()
    }

    /// Playlist index of the source currently on air.
    pub async fn playing(&self) -> Option<usize> {
        self.state.playing().await
    }

    /// Tear down all controller-owned nodes and stop the actor.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::InvalidState("controller task has stopped".to_string()))
    }
}

impl Drop for Playlist {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Actor-side controller state.
struct Controller {
    config: PlaylistConfig,
    items: Vec<PlaylistItem>,
    factory: SourceFactory,
    registry: ListenerRegistry,
    binding: SwitcherBinding,
    signal: Arc<dyn MediaNode>,
    silence: Arc<dyn MediaNode>,
    video: Arc<dyn MediaNode>,
    audio: Arc<dyn MediaNode>,
    slots: Slots,

    /// Playlist position the next advance will play
    next_index: usize,

    /// Pin currently marked active (the switch command may still be in its
    /// arm delay)
    playing: Option<usize>,

    /// Advance timer for the current bounded item
    duration_timer: Option<JoinHandle<()>>,

    exhausted: bool,
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<SharedState>,
}

impl Controller {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut sources: mpsc::UnboundedReceiver<SourceEvent>,
    ) {
        info!("Playlist controller running ({} items)", self.items.len());
        loop {
            tokio::select! {
                Some(command) = commands.recv() => {
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                Some(event) = sources.recv() => {
                    self.handle_source_event(event).await;
                }
                else => break,
            }
        }
        info!("Playlist controller stopped");
    }

    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start => {
                info!("Start requested");
                self.advance().await;
            }
            Command::Switch => {
                info!("Manual switch requested");
                if let Some(current) = &self.slots.current {
                    self.state.broadcast_event(PlaylistEvent::SourceEnded {
                        index: current.index,
                        reason: EndReason::Manual,
                        timestamp: Utc::now(),
                    });
                }
                self.advance().await;
            }
            Command::DurationElapsed { index } => {
                let concerns_current = self
                    .slots
                    .current
                    .as_ref()
                    .map(|current| current.index == index)
                    .unwrap_or(false);
                if !concerns_current {
                    debug!("Stale duration timer for item {} ignored", index);
                    return true;
                }
                debug!("Duration elapsed for item {}", index);
                let close = self.slots.current.as_ref().map(|current| current.close.clone());
                self.state.broadcast_event(PlaylistEvent::SourceEnded {
                    index,
                    reason: EndReason::DurationElapsed,
                    timestamp: Utc::now(),
                });
                self.advance().await;
                // The outgoing node keeps feeding the crossfade; its close
                // handle defers the actual teardown by the grace delay.
                if let Some(close) = close {
                    close.close();
                }
            }
            Command::CommitSwitch { index } => {
                self.binding.switch_to(&index.to_string()).await;
                self.state.set_playing(Some(index)).await;
                self.state.broadcast_event(PlaylistEvent::Switched {
                    pin: index.to_string(),
                    index,
                    timestamp: Utc::now(),
                });
            }
            Command::Shutdown => {
                self.teardown().await;
                return false;
            }
        }
        true
    }

    async fn handle_source_event(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::Ended { index, reason } => {
                let concerns_current = self
                    .slots
                    .current
                    .as_ref()
                    .map(|current| current.index == index)
                    .unwrap_or(false);
                if concerns_current {
                    info!("Source {} ended ({:?}), advancing", index, reason);
                    self.state.broadcast_event(PlaylistEvent::SourceEnded {
                        index,
                        reason,
                        timestamp: Utc::now(),
                    });
                    self.advance().await;
                } else {
                    debug!("Source {} ended ({:?}) while not current, ignoring", index, reason);
                }
            }
            SourceEvent::StreamsChanged { index } => {
                self.refresh_readiness(index);
            }
            SourceEvent::NodeClosed { node_id } => {
                if self.slots.clear_prev_if_node(&node_id) {
                    debug!("Previous node {} closed, clearing slot", node_id);
                    self.refresh_subs().await;
                }
            }
        }
    }

    async fn advance(&mut self) {
        if let Err(err) = self.update().await {
            error!("Playlist update failed: {}", err);
            self.state.broadcast_event(PlaylistEvent::Failed {
                message: err.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    /// One advance of the playout window.
    async fn update(&mut self) -> Result<()> {
        if self.exhausted {
            return Ok(());
        }

        // The outgoing item's timer must not fire a second advance
        if let Some(timer) = self.duration_timer.take() {
            timer.abort();
        }

        let index = self.next_index;
        if index >= self.items.len() {
            info!("Playlist exhausted after {} items", self.items.len());
            self.exhausted = true;
            self.state.broadcast_event(PlaylistEvent::PlaylistExhausted {
                timestamp: Utc::now(),
            });
            return Ok(());
        }
        self.next_index += 1;

        // Release whatever was still lingering in prev before it is
        // displaced; close handles are idempotent and grace-delayed.
        if let Some(displaced) = self.slots.shift() {
            displaced.close.close();
        }

        self.state.broadcast_event(PlaylistEvent::ItemStarted {
            index,
            timestamp: Utc::now(),
        });

        if self.slots.promote_next() {
            debug!("Promoting prewarmed item {}", index);
            // The shift above may have evicted an occupied prev; republish
            // so its pin leaves the switcher (the install path does this via
            // install itself)
            self.refresh_subs().await;
            self.refresh_active();
        } else {
            let item = self.items[index].clone();
            let created = self.factory.create(&item, index, &self.registry).await?;
            let CreatedSource {
                node,
                node_id,
                kind,
                filter,
                duration,
                close,
            } = created;
            self.install(SlotKind::Current, item.clone(), index, node, node_id, kind, filter, close)
                .await;

            // Explicit item duration wins; otherwise wait for the engine to
            // report one (MP4 container metadata).
            let duration_ms = match item.duration_ms {
                Some(duration_ms) => Some(duration_ms),
                None => duration.resolve().await,
            };
            if let Some(current) = self.slots.current.as_mut() {
                current.duration_ms = duration_ms;
            }
        }

        // Bounded items advance themselves one transition early, so the
        // crossfade completes right as the duration runs out.
        let timer_target = self
            .slots
            .current
            .as_ref()
            .and_then(|current| current.duration_ms.map(|d| (current.index, d)));
        if let Some((timer_index, duration_ms)) = timer_target {
            let delay = Duration::from_millis(
                duration_ms.saturating_sub(self.config.transition_duration_ms),
            );
            debug!("Scheduling advance from item {} in {:?}", timer_index, delay);
            let commands = self.commands.clone();
            self.duration_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = commands.send(Command::DurationElapsed { index: timer_index });
            }));
        }

        // Prewarm the upcoming item so the next transition is instant.
        // Only live sources: a file starts fast anyway, and prewarming it
        // would start its decode clock early.
        if let Some(next_item) = self.items.get(index + 1) {
            if next_item.source.is_live() {
                let next_item = next_item.clone();
                debug!("Prewarming live item {}", index + 1);
                let created = self
                    .factory
                    .create(&next_item, index + 1, &self.registry)
                    .await?;
                let CreatedSource {
                    node,
                    node_id,
                    kind,
                    filter,
                    duration,
                    close,
                } = created;
                self.install(
                    SlotKind::Next,
                    next_item.clone(),
                    index + 1,
                    node,
                    node_id,
                    kind,
                    filter,
                    close,
                )
                .await;

                let duration_ms = match next_item.duration_ms {
                    Some(duration_ms) => Some(duration_ms),
                    None => duration.resolve().await,
                };
                if let Some(next) = self.slots.next.as_mut() {
                    next.duration_ms = duration_ms;
                }
            }
        }

        Ok(())
    }

    /// Install a created source into a slot: build its subscriptions,
    /// republish the pin-set, and re-evaluate the active pin.
    #[allow(clippy::too_many_arguments)]
    async fn install(
        &mut self,
        slot: SlotKind,
        item: PlaylistItem,
        index: usize,
        node: Arc<dyn InputNode>,
        node_id: NodeId,
        kind: SourceKind,
        filter: StreamKeyFilter,
        close: CloseHandle,
    ) {
        let pin = index.to_string();
        let sub = PinSubscription {
            pin: pin.clone(),
            source: node_id,
            selector: pin_selector(pin.clone(), filter.clone()),
        };
        // Video-only sources get silent audio on the same pin so the
        // switcher always sees A+V per pin.
        let silence_sub = (kind == SourceKind::Video).then(|| PinSubscription {
            pin: pin.clone(),
            source: self.silence.id().to_string(),
            selector: silence_selector(pin),
        });

        let ready = is_ready(&node.streams(), &filter, kind);
        let playing_item = PlayingItem {
            item,
            index,
            ready,
            duration_ms: None,
            kind,
            node,
            filter,
            close,
            sub: Some(sub),
            silence_sub,
        };
        match slot {
            SlotKind::Current => self.slots.current = Some(playing_item),
            SlotKind::Next => self.slots.next = Some(playing_item),
        }

        self.refresh_subs().await;
        if ready {
            self.state.broadcast_event(PlaylistEvent::ItemReady {
                index,
                timestamp: Utc::now(),
            });
        }
        self.refresh_active();
    }

    /// Recompute a slot's readiness after its node's streams changed.
    fn refresh_readiness(&mut self, index: usize) {
        let Some(item) = self.slots.find_by_index_mut(index) else {
            return;
        };
        let now_ready = is_ready(&item.node.streams(), &item.filter, item.kind);
        if now_ready == item.ready {
            return;
        }
        item.ready = now_ready;
        if now_ready {
            debug!("Item {} became ready", index);
            self.state.broadcast_event(PlaylistEvent::ItemReady {
                index,
                timestamp: Utc::now(),
            });
            self.refresh_active();
        } else {
            debug!("Item {} lost readiness", index);
        }
    }

    /// Republish the complete pin-set derived from the slots.
    async fn refresh_subs(&self) {
        self.binding.refresh(self.slots.subscriptions()).await;
    }

    /// Decide which pin should be on air. The switch command itself is
    /// issued after a short arm delay so the republished subscriptions land
    /// in the switcher first.
    fn refresh_active(&mut self) {
        if let Some(current) = &self.slots.current {
            if current.ready && self.playing != Some(current.index) {
                self.playing = Some(current.index);
                self.arm_switch(current.index);
                return;
            }
        }
        // Recovery path: nothing has ever been on air but the previous slot
        // is usable
        if self.playing.is_none() {
            if let Some(prev) = &self.slots.prev {
                if prev.ready {
                    self.playing = Some(prev.index);
                    self.arm_switch(prev.index);
                }
            }
        }
    }

    fn arm_switch(&self, index: usize) {
        let commands = self.commands.clone();
        let delay = Duration::from_millis(self.config.switch_arm_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(Command::CommitSwitch { index });
        });
    }

    async fn teardown(&mut self) {
        info!("Shutting down playlist controller");
        if let Some(timer) = self.duration_timer.take() {
            timer.abort();
        }
        for item in self.slots.drain() {
            item.close.close();
        }
        self.registry.shutdown().await;
        self.binding.node().close().await;
        self.silence.close().await;
        self.signal.close().await;
        self.video.close().await;
        self.audio.close().await;
    }
}
