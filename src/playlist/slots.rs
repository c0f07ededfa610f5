//! Slot bookkeeping
//!
//! Tracks which playlist items are where in the playout window:
//! - `prev`: previous source, kept alive while the crossfade drains
//! - `current`: the source on air (or about to be)
//! - `next`: prewarmed live source for the upcoming item
//!
//! At most one item per slot; `next.index == current.index + 1` whenever
//! both are set.

use crate::engine::{InputNode, PinSubscription};
use crate::playlist::factory::CloseHandle;
use crate::playlist::item::{PlaylistItem, SourceKind};
use crate::playlist::select::StreamKeyFilter;
use std::sync::Arc;

/// One occupied slot.
pub struct PlayingItem {
    pub item: PlaylistItem,

    /// Monotonic playlist position; doubles as the switcher pin name
    pub index: usize,

    /// Required streams visible (video, plus audio for A/V sources)
    pub ready: bool,

    /// Bounded playing time, from the item or learned from the engine
    pub duration_ms: Option<u64>,

    pub kind: SourceKind,
    pub node: Arc<dyn InputNode>,
    pub filter: StreamKeyFilter,
    pub close: CloseHandle,

    /// Main subscription feeding this slot's pin
    pub sub: Option<PinSubscription>,

    /// Silent-audio subscription for video-only sources
    pub silence_sub: Option<PinSubscription>,
}

/// The three-slot playout window.
pub struct Slots {
    pub prev: Option<PlayingItem>,
    pub current: Option<PlayingItem>,
    pub next: Option<PlayingItem>,
}

impl Slots {
    pub fn new() -> Self {
        Self {
            prev: None,
            current: None,
            next: None,
        }
    }

    /// Shift `prev ← current`, returning whatever previously occupied
    /// `prev` so the caller can release it.
    pub fn shift(&mut self) -> Option<PlayingItem> {
        let displaced = self.prev.take();
        self.prev = self.current.take();
        displaced
    }

    /// Promote the prewarmed `next` into `current`. Returns false if there
    /// was nothing prewarmed.
    pub fn promote_next(&mut self) -> bool {
        match self.next.take() {
            Some(item) => {
                self.current = Some(item);
                true
            }
            None => false,
        }
    }

    /// Every subscription across all slots, silence subscriptions included.
    /// This is the complete pin-set the switcher should hold.
    pub fn subscriptions(&self) -> Vec<PinSubscription> {
        let mut subs = Vec::new();
        for slot in [&self.prev, &self.current, &self.next] {
            if let Some(item) = slot {
                if let Some(sub) = &item.sub {
                    subs.push(sub.clone());
                }
                if let Some(silence) = &item.silence_sub {
                    subs.push(silence.clone());
                }
            }
        }
        subs
    }

    /// The occupied slot holding this playlist index, if any.
    pub fn find_by_index_mut(&mut self, index: usize) -> Option<&mut PlayingItem> {
        [&mut self.prev, &mut self.current, &mut self.next]
            .into_iter()
            .flatten()
            .find(|item| item.index == index)
    }

    /// Clear `prev` if its node is the one that closed. Returns true if
    /// cleared.
    pub fn clear_prev_if_node(&mut self, node_id: &str) -> bool {
        let matches = self
            .prev
            .as_ref()
            .map(|item| item.node.id() == node_id)
            .unwrap_or(false);
        if matches {
            self.prev = None;
        }
        matches
    }

    /// Drain all slots for teardown, prev-first.
    pub fn drain(&mut self) -> Vec<PlayingItem> {
        [self.prev.take(), self.current.take(), self.next.take()]
            .into_iter()
            .flatten()
            .collect()
    }
}

impl Default for Slots {
    fn default() -> Self {
        Self::new()
    }
}
