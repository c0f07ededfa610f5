//! Stream-key selection helpers
//!
//! Pure functions that pick which of a node's streams feed a switcher pin.
//! A slot is ready once `is_ready` holds for its filtered streams; until
//! then the subscription exists with whatever partial mapping is available
//! so the downstream synchroniser can start assembling.

use crate::engine::{MediaType, PinAssignment, StreamKey, StreamMetadata, StreamSelector};
use crate::playlist::item::SourceKind;
use std::sync::Arc;

/// Predicate over stream keys; items can restrict which of a shared node's
/// streams they see.
pub type StreamKeyFilter = Arc<dyn Fn(&StreamKey) -> bool + Send + Sync>;

/// Filter that accepts every stream.
pub fn accept_all() -> StreamKeyFilter {
    Arc::new(|_| true)
}

/// Filter that accepts only streams published under `source_name`
/// (for RTMP: `"<app>/<stream>"`).
pub fn source_name_filter(source_name: String) -> StreamKeyFilter {
    Arc::new(move |key| key.source_name == source_name)
}

/// Keys of all audio streams.
pub fn audio_stream_keys(streams: &[StreamMetadata]) -> Vec<StreamKey> {
    streams
        .iter()
        .filter(|s| s.media == MediaType::Audio)
        .map(|s| s.key.clone())
        .collect()
}

/// Keys of all video streams.
pub fn video_stream_keys(streams: &[StreamMetadata]) -> Vec<StreamKey> {
    streams
        .iter()
        .filter(|s| s.media == MediaType::Video)
        .map(|s| s.key.clone())
        .collect()
}

/// Pick at most one audio and one video stream after applying `filter`.
pub fn pick_av(
    streams: &[StreamMetadata],
    filter: &StreamKeyFilter,
) -> (Option<StreamKey>, Option<StreamKey>) {
    let mut audio = None;
    let mut video = None;
    for s in streams {
        if !filter(&s.key) {
            continue;
        }
        match s.media {
            MediaType::Audio if audio.is_none() => audio = Some(s.key.clone()),
            MediaType::Video if video.is_none() => video = Some(s.key.clone()),
            _ => {}
        }
    }
    (audio, video)
}

/// Readiness rule: video must be visible, and for A/V sources audio too.
pub fn is_ready(streams: &[StreamMetadata], filter: &StreamKeyFilter, kind: SourceKind) -> bool {
    let (audio, video) = pick_av(streams, filter);
    (kind == SourceKind::Video || audio.is_some()) && video.is_some()
}

/// Selector mapping a pin only when both an audio and a video stream are
/// present. For consumers that need synchronised A/V and nothing less.
pub fn av_to_pin(pin: impl Into<String>) -> StreamSelector {
    let pin = pin.into();
    Arc::new(move |streams| {
        let filter = accept_all();
        let (audio, video) = pick_av(streams, &filter);
        match (audio, video) {
            (Some(a), Some(v)) => Some(PinAssignment {
                pin: pin.clone(),
                keys: vec![a, v],
            }),
            _ => None,
        }
    })
}

/// Selector for a slot's main subscription: maps the pin as soon as at least
/// one filtered stream is present, audio key first.
pub fn pin_selector(pin: impl Into<String>, filter: StreamKeyFilter) -> StreamSelector {
    let pin = pin.into();
    Arc::new(move |streams| {
        let (audio, video) = pick_av(streams, &filter);
        let keys: Vec<StreamKey> = audio.into_iter().chain(video).collect();
        if keys.is_empty() {
            None
        } else {
            Some(PinAssignment {
                pin: pin.clone(),
                keys,
            })
        }
    })
}

/// Selector for the auxiliary silence subscription of a video-only slot:
/// routes the silent source's audio onto the same pin.
pub fn silence_selector(pin: impl Into<String>) -> StreamSelector {
    let pin = pin.into();
    Arc::new(move |streams| {
        let keys = audio_stream_keys(streams);
        if keys.is_empty() {
            None
        } else {
            Some(PinAssignment {
                pin: pin.clone(),
                keys,
            })
        }
    })
}
