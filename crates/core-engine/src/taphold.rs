//! Tap/hold detection for virtual-modifier triggers.
//!
//! Each registered trigger runs the state machine
//! `Idle -> Pressed(t) -> Activated -> Idle`, with the tap exit
//! (`Pressed -> Idle` emitting the tap output) available only while the hold
//! threshold has not elapsed. Threshold expiry is checked lazily on every
//! processed event and eagerly by the engine's deadline timer, so activation
//! latency is bounded by the threshold itself even when no further input
//! arrives.

use core_keymap::VirtualTrigger;
use core_keys::ScanCode;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::time::Instant;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Pressed(Instant),
    Activated,
}

/// State changes the processor must apply, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapHoldEffect {
    /// Emit the tap output as a press+release pair.
    EmitTap(ScanCode),
    /// Assert a virtual modifier slot. No OS-visible event.
    VirtualOn(u8),
    /// Clear a virtual modifier slot. No OS-visible event.
    VirtualOff(u8),
}

pub type Effects = SmallVec<[TapHoldEffect; 2]>;

#[derive(Debug, Default)]
pub struct TapHoldDetector {
    triggers: HashMap<u32, VirtualTrigger>,
    states: HashMap<u32, TriggerState>,
}

impl TapHoldDetector {
    pub fn new(triggers: HashMap<u32, VirtualTrigger>) -> Self {
        Self {
            triggers,
            states: HashMap::new(),
        }
    }

    /// Swap the trigger table on config reload. Any in-flight trigger state
    /// is dropped; the caller applies the returned effects (virtual-off for
    /// every activated slot) so no slot stays stuck across a reload.
    pub fn rebuild(&mut self, triggers: HashMap<u32, VirtualTrigger>) -> Effects {
        let effects = self.drain();
        self.triggers = triggers;
        effects
    }

    pub fn is_trigger(&self, scan: ScanCode) -> bool {
        self.triggers.contains_key(&scan.packed())
    }

    pub fn state(&self, scan: ScanCode) -> TriggerState {
        self.states
            .get(&scan.packed())
            .copied()
            .unwrap_or(TriggerState::Idle)
    }

    /// Feed a press/release of a registered trigger key. Returns the effects
    /// plus whether the original event is suppressed (everything except a
    /// stale release in `Idle` is).
    pub fn on_trigger_event(&mut self, scan: ScanCode, press: bool, now: Instant) -> (Effects, bool) {
        let key = scan.packed();
        let trigger = match self.triggers.get(&key) {
            Some(t) => t.clone(),
            None => return (Effects::new(), false),
        };
        let state = self.states.get(&key).copied().unwrap_or(TriggerState::Idle);
        let mut effects = Effects::new();

        let next = match (state, press) {
            (TriggerState::Idle, true) => TriggerState::Pressed(now),
            // Auto-repeat while held: swallow.
            (TriggerState::Pressed(t), true) => TriggerState::Pressed(t),
            (TriggerState::Activated, true) => TriggerState::Activated,
            (TriggerState::Pressed(t), false) => {
                if now.duration_since(t) < trigger.hold_threshold {
                    // Tap: emit the configured output, or nothing at all.
                    if let Some(tap) = trigger.tap {
                        effects.push(TapHoldEffect::EmitTap(tap));
                    }
                    TriggerState::Idle
                } else {
                    // The deadline timer lost the race; activate and release
                    // in one step.
                    effects.push(TapHoldEffect::VirtualOn(trigger.slot));
                    effects.push(TapHoldEffect::VirtualOff(trigger.slot));
                    TriggerState::Idle
                }
            }
            (TriggerState::Activated, false) => {
                effects.push(TapHoldEffect::VirtualOff(trigger.slot));
                TriggerState::Idle
            }
            // A release with no matching press predates the engine; let the
            // OS keep it.
            (TriggerState::Idle, false) => {
                return (effects, false);
            }
        };
        trace!(
            target: "engine.taphold",
            scan = %scan,
            slot = trigger.slot,
            press,
            ?state,
            ?next,
            "trigger_event"
        );
        self.states.insert(key, next);
        (effects, true)
    }

    /// A non-trigger key event arrived. Pressed triggers without
    /// `retain_tap_on_sequence` lose their tap and activate immediately so
    /// the interleaved event is processed under the new modifier state.
    pub fn on_other_event(&mut self, _now: Instant) -> Effects {
        let mut effects = Effects::new();
        for (key, state) in self.states.iter_mut() {
            if let TriggerState::Pressed(_) = *state {
                let trigger = &self.triggers[key];
                if !trigger.retain_tap_on_sequence {
                    *state = TriggerState::Activated;
                    effects.push(TapHoldEffect::VirtualOn(trigger.slot));
                }
            }
        }
        effects
    }

    /// Activate every pressed trigger whose threshold has elapsed.
    pub fn check_deadlines(&mut self, now: Instant) -> Effects {
        let mut effects = Effects::new();
        for (key, state) in self.states.iter_mut() {
            if let TriggerState::Pressed(t) = *state {
                let trigger = &self.triggers[key];
                if now.duration_since(t) >= trigger.hold_threshold {
                    *state = TriggerState::Activated;
                    effects.push(TapHoldEffect::VirtualOn(trigger.slot));
                    trace!(
                        target: "engine.taphold",
                        slot = trigger.slot,
                        "hold_threshold_elapsed"
                    );
                }
            }
        }
        effects
    }

    /// Earliest pending hold deadline, for the eager timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.states
            .iter()
            .filter_map(|(key, state)| match state {
                TriggerState::Pressed(t) => Some(*t + self.triggers[key].hold_threshold),
                _ => None,
            })
            .min()
    }

    /// Clear all trigger state; virtual-off for everything activated.
    /// Pending taps are cancelled outright.
    pub fn drain(&mut self) -> Effects {
        let mut effects = Effects::new();
        for (key, state) in self.states.drain() {
            if let TriggerState::Activated = state {
                effects.push(TapHoldEffect::VirtualOff(self.triggers[&key].slot));
            }
        }
        effects
    }
}
