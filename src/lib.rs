//! # segue
//!
//! Playlist orchestrator for a media-processing engine.
//!
//! **Purpose:** sequence an ordered list of media sources (local files,
//! SRT/RTMP/RTP/WHIP ingests, stills) into one continuous A/V program by
//! driving a downstream smooth-switcher node: create the right input node
//! for each item at the right time, prewarm the next live item so the
//! transition is instant, time out bounded items, share listener sockets
//! across items, and command the crossfade at the right moment.
//!
//! **Architecture:** a single controller actor over an engine abstraction
//! (`engine::MediaEngine`); the engine does all decoding and switching, this
//! crate decides what exists and when.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod playlist;
pub mod state;

pub use config::PlaylistConfig;
pub use error::{Error, Result};
pub use events::{EndReason, PlaylistEvent};
pub use playlist::{Playlist, PlaylistItem, PlaylistSource, SourceKind, SrtMode};
pub use state::SharedState;
