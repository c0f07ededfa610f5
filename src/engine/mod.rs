//! Contract consumed from the external media engine
//!
//! The controller never decodes or switches media itself; it drives an engine
//! that does. This module pins down exactly what it needs from that engine:
//! node creation with per-source configuration, a small event stream per
//! input node, and a smooth-switcher node that accepts pin subscriptions and
//! crossfade commands.
//!
//! All traits are object-safe so the controller can hold `Arc<dyn ...>`
//! handles and tests can substitute a mock engine.

mod stream;

pub use stream::{
    audio_output_key, video_output_key, MediaType, StreamKey, StreamMetadata,
};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Identifier of an engine node.
///
/// Input nodes created for playlist slots are named `"input-<index>"`;
/// listener nodes `"listener-<protocol>-<port>"`.
pub type NodeId = String;

/// Channel on which an input node reports lifecycle events.
pub type InputEventSender = mpsc::UnboundedSender<InputEvent>;

/// Events an input node reports back to its creator.
#[derive(Debug, Clone)]
pub enum InputEvent {
    /// End of file reached (file sources only)
    Eof,

    /// Container metadata became available
    Info { duration_ms: Option<u64> },

    /// Transport connection status changed
    ///
    /// `source_name` is set by listener nodes so the creator can tell which
    /// of the multiplexed publishers went away.
    ConnectionChange {
        connected: bool,
        source_name: Option<String>,
    },

    /// The node's set of visible streams changed
    StreamsChanged,

    /// The node finished tearing down
    Closed,
}

/// Protocols whose listener-mode nodes are shared across playlist items.
///
/// RTP and WHIP items are not listed: they create a fresh standalone node per
/// item rather than sharing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerProtocol {
    Srt,
    Rtmp,
}

impl fmt::Display for ListenerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerProtocol::Srt => write!(f, "SRT"),
            ListenerProtocol::Rtmp => write!(f, "RTMP"),
        }
    }
}

/// Still-image container formats accepted by image inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

/// One RTP stream of an RTP input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtpStreamConfig {
    pub port: u16,
    pub payload_type: u8,
    pub media: MediaType,
}

/// An incoming publish on an RTMP listener node.
#[derive(Debug, Clone)]
pub struct StreamPublishRequest {
    pub app: String,
    pub url: String,
    pub stream_id: String,
    pub publishing_name: String,
}

/// Decision returned by an RTMP `on_stream` gate: accept the publish and
/// label its streams with these keys.
#[derive(Debug, Clone)]
pub struct StreamPublishAccept {
    pub source_name: String,
    pub audio_key: StreamKey,
    pub video_key: StreamKey,
}

/// Gate invoked by an RTMP listener node for every incoming publish.
/// Returning `None` rejects the publish.
pub type StreamGate =
    Arc<dyn Fn(&StreamPublishRequest) -> Option<StreamPublishAccept> + Send + Sync>;

/// Per-source configuration handed to [`MediaEngine::create_input`].
///
/// `begin_ms` is an advisory in-file start offset, passed through untouched.
#[derive(Clone)]
pub enum InputSpec {
    TsFile {
        path: PathBuf,
        begin_ms: Option<u64>,
    },
    Mp4File {
        path: PathBuf,
        begin_ms: Option<u64>,
    },
    SrtCaller {
        ip: String,
        port: u16,
    },
    SrtListener {
        ip: String,
        port: u16,
    },
    RtmpServer {
        port: u16,
        on_stream: StreamGate,
    },
    Image {
        path: PathBuf,
        format: ImageFormat,
    },
    Rtp {
        streams: Vec<RtpStreamConfig>,
    },
    Whip,
}

impl fmt::Debug for InputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSpec::TsFile { path, begin_ms } => f
                .debug_struct("TsFile")
                .field("path", path)
                .field("begin_ms", begin_ms)
                .finish(),
            InputSpec::Mp4File { path, begin_ms } => f
                .debug_struct("Mp4File")
                .field("path", path)
                .field("begin_ms", begin_ms)
                .finish(),
            InputSpec::SrtCaller { ip, port } => f
                .debug_struct("SrtCaller")
                .field("ip", ip)
                .field("port", port)
                .finish(),
            InputSpec::SrtListener { ip, port } => f
                .debug_struct("SrtListener")
                .field("ip", ip)
                .field("port", port)
                .finish(),
            InputSpec::RtmpServer { port, .. } => f
                .debug_struct("RtmpServer")
                .field("port", port)
                .finish_non_exhaustive(),
            InputSpec::Image { path, format } => f
                .debug_struct("Image")
                .field("path", path)
                .field("format", format)
                .finish(),
            InputSpec::Rtp { streams } => {
                f.debug_struct("Rtp").field("streams", streams).finish()
            }
            InputSpec::Whip => write!(f, "Whip"),
        }
    }
}

/// Switcher output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSpec {
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channels: u8,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

/// Configuration for the smooth-switcher node.
#[derive(Debug, Clone)]
pub struct SwitcherConfig {
    pub transition_duration_ms: u64,
    pub output: OutputSpec,
}

/// Configuration for a constant audio signal generator.
#[derive(Debug, Clone)]
pub struct AudioSignalConfig {
    pub channels: u8,
    pub sample_rate: u32,
}

/// Configuration for a per-channel gain node. All-zero gains make a silence
/// generator out of any audio source.
#[derive(Debug, Clone)]
pub struct AudioGainConfig {
    pub source: NodeId,
    pub channel_gains: Vec<f32>,
}

/// Configuration for a stream-key relabelling node.
#[derive(Debug, Clone)]
pub struct StreamKeyOverrideConfig {
    pub source: NodeId,
    pub key: StreamKey,
}

/// The assignment a selector produces for its pin: which of the source's
/// stream keys the switcher should route there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinAssignment {
    pub pin: String,
    pub keys: Vec<StreamKey>,
}

/// Pure function from a node's visible streams to the keys routed to a pin.
///
/// The switcher re-evaluates selectors whenever a subscribed node's stream
/// set changes, so a subscription can be installed before any stream exists.
pub type StreamSelector =
    Arc<dyn Fn(&[StreamMetadata]) -> Option<PinAssignment> + Send + Sync>;

/// One source the switcher may crossfade to.
#[derive(Clone)]
pub struct PinSubscription {
    pub pin: String,
    pub source: NodeId,
    pub selector: StreamSelector,
}

impl fmt::Debug for PinSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinSubscription")
            .field("pin", &self.pin)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Base behaviour common to every engine node.
#[async_trait]
pub trait MediaNode: Send + Sync {
    fn id(&self) -> &str;

    /// Tear the node down. Must tolerate being called more than once.
    async fn close(&self);
}

/// An input node: a media source with observable stream metadata.
pub trait InputNode: MediaNode {
    /// Streams currently visible on this node's output.
    fn streams(&self) -> Vec<StreamMetadata>;
}

/// The smooth-switcher node: crossfades between subscribed pins.
#[async_trait]
pub trait SwitcherNode: MediaNode {
    /// Replace the complete subscription set.
    async fn subscribe_to_pins(&self, subs: Vec<PinSubscription>);

    /// Crossfade to the named pin over the configured transition duration.
    async fn switch_source(&self, pin: &str);
}

/// Factory surface of the media engine.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Create an input node. The returned node is addressable for
    /// subscriptions the moment this resolves; lifecycle events arrive on
    /// `events` from then on.
    async fn create_input(
        &self,
        id: NodeId,
        spec: InputSpec,
        events: InputEventSender,
    ) -> Result<Arc<dyn InputNode>>;

    async fn create_smooth_switcher(&self, cfg: SwitcherConfig) -> Result<Arc<dyn SwitcherNode>>;

    async fn create_audio_signal(&self, cfg: AudioSignalConfig) -> Result<Arc<dyn MediaNode>>;

    async fn create_audio_gain(&self, cfg: AudioGainConfig) -> Result<Arc<dyn MediaNode>>;

    async fn create_stream_key_override(
        &self,
        cfg: StreamKeyOverrideConfig,
    ) -> Result<Arc<dyn MediaNode>>;
}
