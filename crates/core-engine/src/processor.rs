//! The hot path: one raw key event in, a suppress decision and zero or more
//! synthetic events out.
//!
//! The processor owns the live modifier state, the tap/hold detector, and a
//! memory of what each pressed key was mapped to. Release events replay the
//! binding recorded at press time, so a rule that stops matching mid-hold
//! (modifier released first) still produces the matching release and no key
//! sticks. All lookups run against one immutable [`CompiledConfig`] snapshot;
//! the facade swaps the snapshot between events.

use crate::taphold::{TapHoldDetector, TapHoldEffect};
use core_config::CompiledConfig;
use core_events::{KeyInput, KeyOutput, SourceTag};
use core_keymap::{Action, Resolver};
use core_keys::{ModifierMask, ModifierState, ScanCode};
use core_platform::WindowContext;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// What a pressed key was mapped to, replayed on its release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PressBinding {
    Replaced(ScanCode),
    /// Sequence already emitted in full on press; release is silent.
    Sequence,
    Suppressed,
    Passthrough,
}

/// Result of processing one event.
#[derive(Debug, Default)]
pub struct ProcessResult {
    /// Synthetic events to inject, in emission order.
    pub outputs: SmallVec<[KeyOutput; 4]>,
    /// Whether the OS should drop the original event.
    pub suppress: bool,
    /// Set when the modifier state changed during this event.
    pub modifier_changed: Option<ModifierMask>,
}

impl ProcessResult {
    fn passthrough() -> Self {
        Self::default()
    }
}

/// Window-investigation snapshot for one `(class, title)` context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvestigateInfo {
    pub keymap_name: String,
    pub matched_class_regex: String,
    pub matched_title_regex: String,
    pub active_modifiers: String,
    pub is_default: bool,
}

pub struct Processor {
    config: Arc<CompiledConfig>,
    resolver: Resolver,
    state: ModifierState,
    taphold: TapHoldDetector,
    pressed: HashMap<u32, PressBinding>,
    foreground: WindowContext,
    enabled: bool,
}

impl Processor {
    pub fn new(config: Arc<CompiledConfig>) -> Self {
        let resolver = Resolver::new(config.keymaps.clone());
        let taphold = TapHoldDetector::new(config.triggers.clone());
        Self {
            config,
            resolver,
            state: ModifierState::new(),
            taphold,
            pressed: HashMap::new(),
            foreground: WindowContext::default(),
            enabled: true,
        }
    }

    /// Swap in a new snapshot between two events. Press bindings survive so
    /// in-flight keys release against the rules they were pressed under;
    /// trigger state is drained (virtual slots cleared) because the trigger
    /// table may have changed.
    pub fn rebuild(&mut self, config: Arc<CompiledConfig>) {
        self.resolver.rebuild(config.keymaps.clone());
        for effect in self.taphold.rebuild(config.triggers.clone()) {
            self.apply_state_effect(effect);
        }
        self.config = config;
    }

    pub fn set_foreground(&mut self, context: WindowContext) {
        self.foreground = context;
    }

    pub fn foreground(&self) -> &WindowContext {
        &self.foreground
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Name of the first keymap in the active chain for the current
    /// foreground window.
    pub fn current_keymap_name(&self) -> String {
        self.resolver
            .select(&self.foreground.class, &self.foreground.title)
            .first()
            .map(|m| m.name().to_string())
            .unwrap_or_default()
    }

    pub fn modifier_snapshot(&self) -> ModifierMask {
        self.state.snapshot()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.taphold.next_deadline()
    }

    /// Gate transformation without changing lifecycle state. Disabling emits
    /// synthetic releases for everything the engine holds down.
    pub fn set_enabled(&mut self, enabled: bool) -> SmallVec<[KeyOutput; 4]> {
        if self.enabled == enabled {
            return SmallVec::new();
        }
        self.enabled = enabled;
        if enabled {
            SmallVec::new()
        } else {
            self.release_everything()
        }
    }

    /// Synthetic releases for engine-held keys plus a full state clear.
    /// Used on disable and on engine stop.
    pub fn release_everything(&mut self) -> SmallVec<[KeyOutput; 4]> {
        let mut outputs = SmallVec::new();
        for (_, binding) in self.pressed.drain() {
            if let PressBinding::Replaced(scan) = binding {
                outputs.push(KeyOutput::release(scan));
            }
        }
        let _ = self.taphold.drain();
        self.state.clear();
        outputs
    }

    /// Fire the eager tap/hold deadline timer. Returns the new modifier mask
    /// when any slot was asserted.
    pub fn fire_deadlines(&mut self, now: Instant) -> Option<ModifierMask> {
        let effects = self.taphold.check_deadlines(now);
        if effects.is_empty() {
            return None;
        }
        for effect in effects {
            self.apply_state_effect(effect);
        }
        Some(self.state.snapshot())
    }

    /// The hot path entry point.
    pub fn process(&mut self, input: KeyInput) -> ProcessResult {
        // Re-entrancy guard: our own injected events pass through untouched.
        if input.source == SourceTag::Injected {
            return ProcessResult::passthrough();
        }
        if !self.enabled {
            return ProcessResult::passthrough();
        }

        let before = self.state.snapshot();
        let mut result = ProcessResult::default();

        // Lazy deadline check keeps tap/hold honest even if the timer thread
        // is behind.
        for effect in self.taphold.check_deadlines(input.timestamp) {
            self.apply_effect(effect, &mut result);
        }

        if self.taphold.is_trigger(input.scan) {
            let (effects, suppress) =
                self.taphold
                    .on_trigger_event(input.scan, input.press, input.timestamp);
            for effect in effects {
                self.apply_effect(effect, &mut result);
            }
            result.suppress = suppress;
            self.finish(before, &mut result);
            return result;
        }

        // Any other key while a trigger is pressed resolves the tap/hold
        // race first, so this event sees the new modifier state.
        for effect in self.taphold.on_other_event(input.timestamp) {
            self.apply_effect(effect, &mut result);
        }

        let packed = input.scan.packed();
        if let Some(&modifier) = self.config.modifier_keys.get(&packed) {
            // Observing applications still need the native modifier, so the
            // event passes through while the state updates.
            if input.press {
                self.state.press(modifier);
            } else {
                self.state.release(modifier);
            }
            self.finish(before, &mut result);
            return result;
        }

        if let Some(&lock) = self.config.lock_keys.get(&packed) {
            if input.press {
                self.state.toggle(lock);
            }
            self.finish(before, &mut result);
            return result;
        }

        if input.press {
            self.process_press(input.scan, &mut result);
        } else {
            self.process_release(packed, &mut result);
        }
        self.finish(before, &mut result);
        result
    }

    fn process_press(&mut self, scan: ScanCode, result: &mut ProcessResult) {
        // Auto-repeat of a key we already bound: replay the binding rather
        // than re-running lookup under possibly different modifiers.
        if let Some(&binding) = self.pressed.get(&scan.packed()) {
            match binding {
                PressBinding::Replaced(out) => {
                    result.outputs.push(KeyOutput::press(out));
                    result.suppress = true;
                }
                PressBinding::Sequence | PressBinding::Suppressed => result.suppress = true,
                PressBinding::Passthrough => {}
            }
            return;
        }

        let chain = self
            .resolver
            .select(&self.foreground.class, &self.foreground.title);
        let mut action = None;
        for keymap in chain.iter() {
            match keymap.query(scan, &self.state).map(|rule| &rule.action) {
                None | Some(Action::Passthrough) => continue,
                Some(found) => {
                    action = Some(found.clone());
                    break;
                }
            }
        }

        match action {
            Some(Action::Replace(out)) => {
                self.pressed
                    .insert(scan.packed(), PressBinding::Replaced(out));
                result.outputs.push(KeyOutput::press(out));
                result.suppress = true;
            }
            Some(Action::Sequence(seq)) => {
                self.pressed.insert(scan.packed(), PressBinding::Sequence);
                for out in seq {
                    result.outputs.push(KeyOutput::press(out));
                    result.outputs.push(KeyOutput::release(out));
                }
                result.suppress = true;
            }
            Some(Action::Suppress) => {
                self.pressed.insert(scan.packed(), PressBinding::Suppressed);
                result.suppress = true;
            }
            Some(Action::Passthrough) | None => {
                self.pressed
                    .insert(scan.packed(), PressBinding::Passthrough);
            }
        }
    }

    fn process_release(&mut self, packed: u32, result: &mut ProcessResult) {
        match self.pressed.remove(&packed) {
            Some(PressBinding::Replaced(out)) => {
                result.outputs.push(KeyOutput::release(out));
                result.suppress = true;
            }
            Some(PressBinding::Sequence) | Some(PressBinding::Suppressed) => {
                result.suppress = true;
            }
            // Unknown releases (pressed before the engine started) pass
            // through like explicit passthrough bindings.
            Some(PressBinding::Passthrough) | None => {}
        }
    }

    fn apply_effect(&mut self, effect: TapHoldEffect, result: &mut ProcessResult) {
        match effect {
            TapHoldEffect::EmitTap(scan) => {
                result.outputs.push(KeyOutput::press(scan));
                result.outputs.push(KeyOutput::release(scan));
            }
            TapHoldEffect::VirtualOn(slot) => self.state.set_virtual(slot, true),
            TapHoldEffect::VirtualOff(slot) => self.state.set_virtual(slot, false),
        }
    }

    fn apply_state_effect(&mut self, effect: TapHoldEffect) {
        match effect {
            TapHoldEffect::EmitTap(_) => {}
            TapHoldEffect::VirtualOn(slot) => self.state.set_virtual(slot, true),
            TapHoldEffect::VirtualOff(slot) => self.state.set_virtual(slot, false),
        }
    }

    fn finish(&self, before: ModifierMask, result: &mut ProcessResult) {
        let after = self.state.snapshot();
        if after != before {
            result.modifier_changed = Some(after);
        }
        trace!(
            target: "engine.hot",
            outputs = result.outputs.len(),
            suppress = result.suppress,
            "processed"
        );
    }

    /// Resolve the active chain for an arbitrary window context; serves the
    /// investigate-window command.
    pub fn investigate(&self, class: &str, title: &str) -> InvestigateInfo {
        let chain = self.resolver.select(class, title);
        let (keymap_name, matched_class, matched_title, is_default) = match chain.first() {
            Some(map) => (
                map.name().to_string(),
                map.class_regex_source().unwrap_or_default().to_string(),
                map.title_regex_source().unwrap_or_default().to_string(),
                map.is_global(),
            ),
            None => (String::new(), String::new(), String::new(), true),
        };
        InvestigateInfo {
            keymap_name,
            matched_class_regex: matched_class,
            matched_title_regex: matched_title,
            active_modifiers: self.state.snapshot().to_string(),
            is_default,
        }
    }
}
