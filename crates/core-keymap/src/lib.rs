//! core-keymap: compiled remapping rules and per-keymap lookup tables.
//!
//! Everything here is immutable after the config compiler builds it. The hot
//! path does one hash probe per event and then scans a short, pre-sorted rule
//! list; specificity ordering (popcount of `required_on` descending, then
//! declaration order) is baked in at build time so queries are first-match.

pub mod resolver;

pub use resolver::Resolver;

use core_keys::{ModifierMask, ModifierState, ScanCode};
use regex::Regex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;

// -------------------------------------------------------------------------------------------------
// Actions
// -------------------------------------------------------------------------------------------------

/// What a matched rule does with the input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Substitute a single key; release is mapped when the input releases.
    Replace(ScanCode),
    /// Emit each key as a press+release pair on the input's press; the
    /// input's release emits nothing.
    Sequence(SmallVec<[ScanCode; 4]>),
    /// Drop the event.
    Suppress,
    /// Forward unchanged. Also the implicit result when no rule matches.
    Passthrough,
}

// -------------------------------------------------------------------------------------------------
// Rules
// -------------------------------------------------------------------------------------------------

/// A compiled rule. `order` is the declaration index used to break
/// specificity ties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub input: ScanCode,
    pub required_on: ModifierMask,
    pub required_off: ModifierMask,
    pub action: Action,
    pub order: u32,
}

/// Per-input-scancode rule index. One hash probe, then a short scan of rules
/// sorted most-specific-first.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: HashMap<u32, SmallVec<[Rule; 8]>>,
    rule_count: usize,
}

impl LookupTable {
    pub fn build(rules: Vec<Rule>) -> Self {
        let mut entries: HashMap<u32, SmallVec<[Rule; 8]>> = HashMap::new();
        let rule_count = rules.len();
        for rule in rules {
            entries.entry(rule.input.packed()).or_default().push(rule);
        }
        for bucket in entries.values_mut() {
            bucket.sort_by(|a, b| {
                b.required_on
                    .popcount()
                    .cmp(&a.required_on.popcount())
                    .then(a.order.cmp(&b.order))
            });
        }
        Self {
            entries,
            rule_count,
        }
    }

    /// First rule whose masks match the current modifier state.
    pub fn lookup(&self, scan: ScanCode, state: &ModifierState) -> Option<&Rule> {
        let bucket = self.entries.get(&scan.packed())?;
        bucket
            .iter()
            .find(|rule| state.matches(&rule.required_on, &rule.required_off))
    }

    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    /// All rules across every bucket, in no particular order.
    pub fn iter_rules(&self) -> impl Iterator<Item = &Rule> {
        self.entries.values().flat_map(|bucket| bucket.iter())
    }

    pub fn rules_for(&self, scan: ScanCode) -> &[Rule] {
        self.entries
            .get(&scan.packed())
            .map(|bucket| bucket.as_slice())
            .unwrap_or(&[])
    }
}

// -------------------------------------------------------------------------------------------------
// Virtual-modifier triggers
// -------------------------------------------------------------------------------------------------

pub const DEFAULT_HOLD_THRESHOLD: Duration = Duration::from_millis(200);

/// A tap/hold trigger binding a physical key to a virtual modifier slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualTrigger {
    pub scan: ScanCode,
    pub slot: u8,
    /// Key emitted as press+release when the trigger is tapped. `None` means
    /// a tap emits nothing.
    pub tap: Option<ScanCode>,
    pub hold_threshold: Duration,
    /// When `false` (the default), any interleaved key event while the
    /// trigger is held cancels the tap and activates the hold immediately.
    pub retain_tap_on_sequence: bool,
}

impl VirtualTrigger {
    pub fn new(scan: ScanCode, slot: u8) -> Self {
        Self {
            scan,
            slot,
            tap: None,
            hold_threshold: DEFAULT_HOLD_THRESHOLD,
            retain_tap_on_sequence: false,
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Keymaps
// -------------------------------------------------------------------------------------------------

/// A named, window-scoped rule collection. Parent rules are already inlined
/// by the compiler; keymaps are read-only at runtime and replaced wholesale
/// on reload.
#[derive(Debug)]
pub struct Keymap {
    name: String,
    class_regex: Option<Regex>,
    title_regex: Option<Regex>,
    table: LookupTable,
    local_triggers: Vec<VirtualTrigger>,
}

impl Keymap {
    pub fn new(
        name: impl Into<String>,
        class_regex: Option<Regex>,
        title_regex: Option<Regex>,
        table: LookupTable,
        local_triggers: Vec<VirtualTrigger>,
    ) -> Self {
        Self {
            name: name.into(),
            class_regex,
            title_regex,
            table,
            local_triggers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &LookupTable {
        &self.table
    }

    pub fn local_triggers(&self) -> &[VirtualTrigger] {
        &self.local_triggers
    }

    pub fn class_regex_source(&self) -> Option<&str> {
        self.class_regex.as_ref().map(Regex::as_str)
    }

    pub fn title_regex_source(&self) -> Option<&str> {
        self.title_regex.as_ref().map(Regex::as_str)
    }

    /// Window predicate: declared regexes must all match; a keymap with no
    /// regexes matches everything.
    pub fn matches_window(&self, class: &str, title: &str) -> bool {
        if let Some(re) = &self.class_regex
            && !re.is_match(class)
        {
            return false;
        }
        if let Some(re) = &self.title_regex
            && !re.is_match(title)
        {
            return false;
        }
        true
    }

    /// A keymap with no window scoping; the compiler keeps exactly one of
    /// these (the global fallback) at the end of the keymap list.
    pub fn is_global(&self) -> bool {
        self.class_regex.is_none() && self.title_regex.is_none()
    }

    pub fn query(&self, scan: ScanCode, state: &ModifierState) -> Option<&Rule> {
        let hit = self.table.lookup(scan, state);
        if let Some(rule) = hit {
            trace!(
                target: "keymap.lookup",
                keymap = self.name.as_str(),
                input = %scan,
                order = rule.order,
                "rule_hit"
            );
        }
        hit
    }
}
