//! Switcher binding
//!
//! Thin adapter between controller slot state and the engine's
//! smooth-switcher node: republish the complete pin-set, command crossfades.

use crate::engine::{PinSubscription, SwitcherNode};
use std::sync::Arc;
use tracing::debug;

pub struct SwitcherBinding {
    switcher: Arc<dyn SwitcherNode>,
}

impl SwitcherBinding {
    pub fn new(switcher: Arc<dyn SwitcherNode>) -> Self {
        Self { switcher }
    }

    /// Replace the switcher's subscription set with the given pins. This is
    /// the single point that tells the switcher which sources it may
    /// crossfade between.
    pub async fn refresh(&self, subs: Vec<PinSubscription>) {
        let pins: Vec<&str> = subs.iter().map(|s| s.pin.as_str()).collect();
        debug!("Republishing switcher pins: {:?}", pins);
        self.switcher.subscribe_to_pins(subs).await;
    }

    /// Crossfade to the named pin.
    pub async fn switch_to(&self, pin: &str) {
        debug!("Switching to pin {}", pin);
        self.switcher.switch_source(pin).await;
    }

    pub fn node(&self) -> Arc<dyn SwitcherNode> {
        Arc::clone(&self.switcher)
    }
}
