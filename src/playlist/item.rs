//! Playlist item model
//!
//! A playlist is an ordered list of [`PlaylistItem`]s. The source variant is
//! a closed sum; `kind()` and `is_live()` are total over it, so there is no
//! "unknown source type" failure mode at runtime.

use crate::engine::{ImageFormat, RtpStreamConfig};
use serde::Deserialize;
use std::path::PathBuf;

/// One entry of the playlist.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    /// Advisory in-file start offset, passed through to the engine
    #[serde(default)]
    pub begin_ms: Option<u64>,

    /// Bounded playing time; absent means play to natural end
    #[serde(default)]
    pub duration_ms: Option<u64>,

    pub source: PlaylistSource,
}

impl PlaylistItem {
    pub fn new(source: PlaylistSource) -> Self {
        Self {
            begin_ms: None,
            duration_ms: None,
            source,
        }
    }

    pub fn with_duration(source: PlaylistSource, duration_ms: u64) -> Self {
        Self {
            begin_ms: None,
            duration_ms: Some(duration_ms),
            source,
        }
    }
}

/// Connection mode of an SRT source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SrtMode {
    Caller,
    Listener,
}

/// The media source behind one playlist item.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaylistSource {
    #[serde(rename = "localTsFile", rename_all = "camelCase")]
    TsFile { file_name: PathBuf },

    /// Natural duration discoverable at runtime from container metadata
    #[serde(rename = "localMp4File", rename_all = "camelCase")]
    Mp4File { file_name: PathBuf },

    Srt {
        mode: SrtMode,
        ip: String,
        port: u16,
    },

    /// Always listener-side; when both `app` and `stream` are set, input is
    /// filtered to the publisher named `"<app>/<stream>"`
    Rtmp {
        port: u16,
        #[serde(default)]
        app: Option<String>,
        #[serde(default)]
        stream: Option<String>,
    },

    /// Video-only; the controller supplies silent audio for its pin
    #[serde(rename_all = "camelCase")]
    Image {
        file_name: PathBuf,
        image_format: ImageFormat,
    },

    Rtp { streams: Vec<RtpStreamConfig> },

    Whip {},
}

/// Whether a source carries both media types or video alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Audio and video; both must be visible before the slot is ready
    Av,
    /// Video only (images); readiness requires video alone
    Video,
}

impl PlaylistSource {
    /// Media kind of the source. Controls whether audio readiness is
    /// required before switching.
    pub fn kind(&self) -> SourceKind {
        match self {
            PlaylistSource::Image { .. } => SourceKind::Video,
            _ => SourceKind::Av,
        }
    }

    /// Live sources are prewarmed ahead of their turn; file sources are not.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            PlaylistSource::Srt { .. }
                | PlaylistSource::Rtmp { .. }
                | PlaylistSource::Rtp { .. }
                | PlaylistSource::Whip {}
        )
    }

    /// Short label for logging.
    pub fn describe(&self) -> &'static str {
        match self {
            PlaylistSource::TsFile { .. } => "localTsFile",
            PlaylistSource::Mp4File { .. } => "localMp4File",
            PlaylistSource::Srt { .. } => "srt",
            PlaylistSource::Rtmp { .. } => "rtmp",
            PlaylistSource::Image { .. } => "image",
            PlaylistSource::Rtp { .. } => "rtp",
            PlaylistSource::Whip {} => "whip",
        }
    }
}
