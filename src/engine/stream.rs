//! Stream identity types
//!
//! A `StreamKey` names one logical stream inside a node's output; every
//! subscription, selector, and relabelled output speaks in these keys.

use serde::{Deserialize, Serialize};

/// Identity of one logical stream inside a node's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamKey {
    /// MPEG-style program number
    pub program_number: u16,

    /// Rendition label ("default", "video", "audio", ...)
    pub rendition_name: String,

    /// Numeric stream identifier within the program
    pub stream_id: u32,

    /// Logical publisher name; listener nodes demultiplex on this
    /// (for RTMP: `"<app>/<publishing_name>"`)
    pub source_name: String,
}

impl StreamKey {
    pub fn new(
        program_number: u16,
        rendition_name: impl Into<String>,
        stream_id: u32,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            program_number,
            rendition_name: rendition_name.into(),
            stream_id,
            source_name: source_name.into(),
        }
    }
}

/// Media type of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Video,
}

/// Metadata an input node reports for one of its visible streams.
#[derive(Debug, Clone)]
pub struct StreamMetadata {
    pub key: StreamKey,
    pub media: MediaType,
}

impl StreamMetadata {
    pub fn audio(key: StreamKey) -> Self {
        Self {
            key,
            media: MediaType::Audio,
        }
    }

    pub fn video(key: StreamKey) -> Self {
        Self {
            key,
            media: MediaType::Video,
        }
    }
}

/// Stream key of the relabelled video output.
pub fn video_output_key() -> StreamKey {
    StreamKey::new(1, "video", 256, "input")
}

/// Stream key of the relabelled audio output.
pub fn audio_output_key() -> StreamKey {
    StreamKey::new(1, "audio", 257, "input")
}
