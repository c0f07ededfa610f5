//! Playlist lifecycle events
//!
//! Broadcast to whoever owns the controller (see [`crate::state::SharedState`]).
//! Events are serializable so a control surface can forward them verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a playing item stopped being the active source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// File source reached its natural end
    Eof,
    /// Live source's transport went away
    Disconnected,
    /// The item's bounded duration elapsed
    DurationElapsed,
    /// Caller requested a manual advance
    Manual,
}

/// Playlist controller event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlaylistEvent {
    /// An item took the `current` slot and its node is subscribed
    ItemStarted {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    /// A slot's required streams became visible (video, plus audio for A/V
    /// sources); the switcher may now crossfade to it
    ItemReady {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    /// The switcher was commanded to crossfade to this pin
    Switched {
        pin: String,
        index: usize,
        timestamp: DateTime<Utc>,
    },

    /// A source stopped (EOF, disconnect, duration timeout, manual advance)
    SourceEnded {
        index: usize,
        reason: EndReason,
        timestamp: DateTime<Utc>,
    },

    /// The playlist ran past its last item; output halts after the final
    /// crossfade drains. The owner decides what happens next.
    PlaylistExhausted { timestamp: DateTime<Utc> },

    /// An unrecoverable error surfaced from the engine; playback halts
    Failed {
        message: String,
        timestamp: DateTime<Utc>,
    },
}
