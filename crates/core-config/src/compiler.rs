//! The compile pipeline: schema -> keys -> virtual modifiers -> rules ->
//! inheritance flattening -> lookup tables.
//!
//! Diagnostics accumulate across phases; a reference to a key that failed to
//! parse earlier produces its own error rather than aborting the walk, so a
//! broken file reports as much as possible in one pass. Any diagnostic fails
//! the compile as a whole.

use crate::schema::{RawConfig, RawMapping, RawTo, RawVirtualModifier};
use crate::{CONFIG_VERSION, CompileError, CompileFailure, CompiledConfig};
use core_keys::{
    Key, KeyTable, LockMod, ModifierKind, ModifierMask, PhysicalMod, ScanCode, fold_key_name,
    modifier::parse_virtual_name,
};
use core_keymap::{Action, Keymap, LookupTable, Rule, VirtualTrigger};
use regex::Regex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Name of the implicit always-match fallback keymap.
pub const GLOBAL_KEYMAP: &str = "Global";

// -------------------------------------------------------------------------------------------------
// Entry points
// -------------------------------------------------------------------------------------------------

pub fn load_file(path: &Path) -> Result<CompiledConfig, CompileFailure> {
    load_file_with_cancel(path, None)
}

pub fn load_file_with_cancel(
    path: &Path,
    cancel: Option<&AtomicBool>,
) -> Result<CompiledConfig, CompileFailure> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        CompileFailure::single("$", format!("failed to read {}: {e}", path.display()))
    })?;
    if text.trim().is_empty() {
        return Err(CompileFailure::single(
            "$",
            format!("configuration file is empty: {}", path.display()),
        ));
    }
    compile_str_with_cancel(&text, path, cancel)
}

pub fn compile_str(json: &str, source: &Path) -> Result<CompiledConfig, CompileFailure> {
    compile_str_with_cancel(json, source, None)
}

pub fn compile_str_with_cancel(
    json: &str,
    source: &Path,
    cancel: Option<&AtomicBool>,
) -> Result<CompiledConfig, CompileFailure> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| CompileFailure::single("$", format!("JSON parse error: {e}")))?;
    validate_shape(&value)?;
    let raw: RawConfig = serde_json::from_value(value)
        .map_err(|e| CompileFailure::single("$", format!("schema error: {e}")))?;
    compile_document_with_cancel(&raw, source, cancel)
}

/// Structural checks with stable messages before typed deserialization takes
/// over. The required sections get named explicitly so a missing
/// `keyboard.keys` reads as such instead of a bare serde field error.
fn validate_shape(value: &serde_json::Value) -> Result<(), CompileFailure> {
    let Some(root) = value.as_object() else {
        return Err(CompileFailure::single(
            "$",
            "configuration root must be a JSON object",
        ));
    };
    match root.get("version") {
        None => {
            return Err(CompileFailure::single(
                "version",
                "missing required 'version' field",
            ));
        }
        Some(v) if !v.is_string() => {
            return Err(CompileFailure::single(
                "version",
                "'version' field must be a string",
            ));
        }
        Some(_) => {}
    }
    let Some(keyboard) = root.get("keyboard") else {
        return Err(CompileFailure::single(
            "keyboard",
            "missing required 'keyboard' section",
        ));
    };
    let Some(keyboard) = keyboard.as_object() else {
        return Err(CompileFailure::single(
            "keyboard",
            "'keyboard' must be an object",
        ));
    };
    match keyboard.get("keys") {
        None => Err(CompileFailure::single(
            "keyboard.keys",
            "missing required 'keyboard.keys' section",
        )),
        Some(keys) if !keys.is_object() => Err(CompileFailure::single(
            "keyboard.keys",
            "'keyboard.keys' must be an object",
        )),
        Some(_) => Ok(()),
    }
}

pub fn compile_document(raw: &RawConfig, source: &Path) -> Result<CompiledConfig, CompileFailure> {
    compile_document_with_cancel(raw, source, None)
}

pub fn compile_document_with_cancel(
    raw: &RawConfig,
    source: &Path,
    cancel: Option<&AtomicBool>,
) -> Result<CompiledConfig, CompileFailure> {
    Compiler {
        raw,
        source,
        cancel,
        errors: Vec::new(),
    }
    .run()
}

// -------------------------------------------------------------------------------------------------
// Compiler
// -------------------------------------------------------------------------------------------------

/// A rule as parsed from one mapping row. `required_off` is assigned in its
/// own phase once the keymap's full mentioned-modifier set is known.
#[derive(Debug, Clone)]
struct ParsedRule {
    input: ScanCode,
    required_on: ModifierMask,
    required_off: ModifierMask,
    action: Action,
    order: u32,
}

#[derive(Debug, Default)]
struct KeymapDef {
    parent: Option<String>,
    window_class: Option<String>,
    window_title: Option<String>,
    rules: Vec<ParsedRule>,
}

/// One keymap after inheritance flattening, ready for table construction.
struct FlattenedKeymap {
    name: String,
    window_class: Option<String>,
    window_title: Option<String>,
    rules: Vec<Rule>,
}

struct Compiler<'a> {
    raw: &'a RawConfig,
    source: &'a Path,
    cancel: Option<&'a AtomicBool>,
    errors: Vec<CompileError>,
}

impl Compiler<'_> {
    fn run(mut self) -> Result<CompiledConfig, CompileFailure> {
        self.check_version();
        self.checkpoint()?;

        let (keys, modifier_keys, lock_keys) = self.compile_keys();
        self.checkpoint()?;

        let triggers = self.compile_virtual_modifiers(&keys);
        self.checkpoint()?;

        let (order, mut defs) = self.compile_mappings(&keys);
        self.checkpoint()?;

        self.assign_required_off(&mut defs);
        let flattened = self.flatten_inheritance(&order, &mut defs);
        self.checkpoint()?;

        let mut keymaps = Vec::with_capacity(flattened.len());
        for map in flattened {
            let class_regex =
                self.build_regex(&map.name, "windowClass", map.window_class.as_deref());
            let title_regex =
                self.build_regex(&map.name, "windowTitle", map.window_title.as_deref());
            let local_triggers = if map.name == GLOBAL_KEYMAP {
                let mut all: Vec<VirtualTrigger> = triggers.values().cloned().collect();
                all.sort_by_key(|t| t.slot);
                all
            } else {
                Vec::new()
            };
            keymaps.push(Arc::new(Keymap::new(
                map.name,
                class_regex,
                title_regex,
                LookupTable::build(map.rules),
                local_triggers,
            )));
        }

        if !self.errors.is_empty() {
            return Err(CompileFailure {
                errors: self.errors,
            });
        }

        let name = self
            .source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "inline".to_string());
        info!(
            target: "config.compile",
            config = name.as_str(),
            keys = keys.len(),
            keymaps = keymaps.len(),
            triggers = triggers.len(),
            mappings = self.raw.mappings.len(),
            "compile_ok"
        );
        Ok(CompiledConfig {
            name,
            source_path: PathBuf::from(self.source),
            keys,
            keymaps,
            triggers,
            modifier_keys,
            lock_keys,
            virtual_modifier_count: self.raw.virtual_modifiers.len(),
            mapping_count: self.raw.mappings.len(),
        })
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        let err = CompileError::new(path, message);
        debug!(
            target: "config.compile",
            path = err.path.as_str(),
            detail = err.message.as_str(),
            "diagnostic"
        );
        self.errors.push(err);
    }

    /// Phase boundary: honor cancellation requests from the lifecycle thread.
    fn checkpoint(&mut self) -> Result<(), CompileFailure> {
        if let Some(flag) = self.cancel
            && flag.load(Ordering::Relaxed)
        {
            return Err(CompileFailure::single("$", "compile cancelled"));
        }
        Ok(())
    }

    // ---------------------------------------------------------------------------------------------
    // Phase: version
    // ---------------------------------------------------------------------------------------------

    fn check_version(&mut self) {
        if self.raw.version != CONFIG_VERSION {
            self.error(
                "version",
                format!(
                    "unsupported version '{}': expected '{CONFIG_VERSION}'",
                    self.raw.version
                ),
            );
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Phase: keyboard keys
    // ---------------------------------------------------------------------------------------------

    fn compile_keys(&mut self) -> (KeyTable, HashMap<u32, PhysicalMod>, HashMap<u32, LockMod>) {
        let raw = self.raw;
        let mut table = KeyTable::new();
        let mut modifier_keys = HashMap::new();
        let mut lock_keys = HashMap::new();

        for (name, hex) in &raw.keyboard.keys {
            let path = format!("keyboard.keys.{name}");
            let Some(scan) = parse_scan_code(&mut self.errors, &path, hex) else {
                continue;
            };
            if let Err(e) = table.add(Key::with_scan_code(name.clone(), scan)) {
                self.error(path, e.to_string());
                continue;
            }
            match classify_key_name(&fold_key_name(name)) {
                Some(KeyClass::Physical(m)) => {
                    modifier_keys.insert(scan.packed(), m);
                }
                Some(KeyClass::Lock(l)) => {
                    lock_keys.insert(scan.packed(), l);
                }
                None => {}
            }
        }
        (table, modifier_keys, lock_keys)
    }

    // ---------------------------------------------------------------------------------------------
    // Phase: virtual modifiers
    // ---------------------------------------------------------------------------------------------

    fn compile_virtual_modifiers(&mut self, keys: &KeyTable) -> HashMap<u32, VirtualTrigger> {
        let raw = self.raw;
        let mut triggers: HashMap<u32, VirtualTrigger> = HashMap::new();
        for (name, def) in &raw.virtual_modifiers {
            let path = format!("virtualModifiers.{name}");
            let Some(slot) = parse_virtual_name(name) else {
                self.error(
                    &path,
                    format!("invalid virtual modifier name '{name}': must be M00-MFF"),
                );
                continue;
            };
            let Some(scan) = self.resolve_key_scan(&format!("{path}.trigger"), keys, &def.trigger)
            else {
                continue;
            };
            let mut trigger = VirtualTrigger::new(scan, slot);
            if let Some(tap_name) = &def.tap {
                let Some(tap_scan) = self.resolve_key_scan(&format!("{path}.tap"), keys, tap_name)
                else {
                    continue;
                };
                trigger.tap = Some(tap_scan);
            }
            if let Some(ms) = def.hold_threshold_ms {
                trigger.hold_threshold = Duration::from_millis(ms);
            }
            trigger.retain_tap_on_sequence = def.retain_tap_on_sequence.unwrap_or(false);

            if let Some(existing) = triggers.get(&scan.packed()) {
                let message = format!(
                    "trigger key '{}' already drives M{:02X}",
                    def.trigger, existing.slot
                );
                self.error(&path, message);
                continue;
            }
            triggers.insert(scan.packed(), trigger);
        }
        triggers
    }

    fn resolve_key_scan(&mut self, path: &str, keys: &KeyTable, name: &str) -> Option<ScanCode> {
        let Some(key) = keys.find(name) else {
            self.error(path, format!("unknown key name '{name}'"));
            return None;
        };
        let Some(scan) = key.primary_scan() else {
            self.error(path, format!("key '{name}' has no scan codes"));
            return None;
        };
        Some(scan)
    }

    // ---------------------------------------------------------------------------------------------
    // Phase: mappings -> per-keymap rule lists
    // ---------------------------------------------------------------------------------------------

    fn compile_mappings(&mut self, keys: &KeyTable) -> (Vec<String>, HashMap<String, KeymapDef>) {
        let raw = self.raw;
        // First-mention order of keymap names; the global fallback is always
        // appended last during flattening.
        let mut order: Vec<String> = Vec::new();
        let mut defs: HashMap<String, KeymapDef> = HashMap::new();

        for (index, mapping) in raw.mappings.iter().enumerate() {
            let path = format!("mappings[{index}]");
            let target = mapping
                .keymap
                .clone()
                .unwrap_or_else(|| GLOBAL_KEYMAP.to_string());
            if !defs.contains_key(&target) {
                order.push(target.clone());
                defs.insert(target.clone(), KeymapDef::default());
            }
            let def = defs.get_mut(&target).expect("definition just ensured");
            self.merge_keymap_attrs(&path, &target, mapping, def);

            let Some((input, required_on)) =
                self.parse_modified_key(&format!("{path}.from"), keys, &mapping.from)
            else {
                continue;
            };
            let Some(action) = self.parse_action(&format!("{path}.to"), keys, &mapping.to) else {
                continue;
            };
            defs.get_mut(&target)
                .expect("definition exists")
                .rules
                .push(ParsedRule {
                    input,
                    required_on,
                    required_off: ModifierMask::EMPTY,
                    action,
                    order: index as u32,
                });
        }
        (order, defs)
    }

    /// The first row naming a keymap fixes its parent and window regexes;
    /// later rows may repeat identical values, anything else conflicts.
    fn merge_keymap_attrs(
        &mut self,
        path: &str,
        target: &str,
        mapping: &RawMapping,
        def: &mut KeymapDef,
    ) {
        if target == GLOBAL_KEYMAP
            && (mapping.window_class.is_some() || mapping.window_title.is_some())
        {
            self.error(path, "the global keymap cannot be window-scoped");
            return;
        }
        merge_attr(
            &mut self.errors,
            path,
            target,
            "parent",
            &mut def.parent,
            mapping.parent.as_deref(),
        );
        merge_attr(
            &mut self.errors,
            path,
            target,
            "windowClass",
            &mut def.window_class,
            mapping.window_class.as_deref(),
        );
        merge_attr(
            &mut self.errors,
            path,
            target,
            "windowTitle",
            &mut def.window_title,
            mapping.window_title.as_deref(),
        );
    }

    fn parse_modified_key(
        &mut self,
        path: &str,
        keys: &KeyTable,
        expr: &str,
    ) -> Option<(ScanCode, ModifierMask)> {
        let parts: Vec<&str> = expr.split('-').filter(|p| !p.is_empty()).collect();
        let Some((key_name, modifier_tokens)) = parts.split_last() else {
            self.error(path, "empty key expression");
            return None;
        };
        let mut mask = ModifierMask::EMPTY;
        for token in modifier_tokens {
            let Some(kind) = ModifierKind::parse_expr_token(token) else {
                self.error(
                    path,
                    format!("unknown modifier '{token}' in expression '{expr}'"),
                );
                return None;
            };
            mask.insert(kind);
        }
        let scan = self.resolve_key_scan(path, keys, key_name)?;
        Some((scan, mask))
    }

    fn parse_action(&mut self, path: &str, keys: &KeyTable, to: &RawTo) -> Option<Action> {
        match to {
            RawTo::Single(name) => {
                let scan = self.resolve_key_scan(path, keys, name)?;
                Some(Action::Replace(scan))
            }
            RawTo::Sequence(names) => {
                if names.is_empty() {
                    self.error(path, "'to' array is empty");
                    return None;
                }
                let mut seq = SmallVec::new();
                for (i, name) in names.iter().enumerate() {
                    let scan = self.resolve_key_scan(&format!("{path}[{i}]"), keys, name)?;
                    seq.push(scan);
                }
                Some(Action::Sequence(seq))
            }
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Phase: implicit required_off
    // ---------------------------------------------------------------------------------------------

    /// A modifier mentioned by some `from` in a keymap but absent from this
    /// rule's `from` is implicitly forbidden; modifiers the keymap never
    /// mentions are don't-cares. Keeps `M00-H` from also firing on
    /// `M00-Shift-H` when the keymap distinguishes Shift.
    fn assign_required_off(&mut self, defs: &mut HashMap<String, KeymapDef>) {
        for def in defs.values_mut() {
            let mut mentioned = ModifierMask::EMPTY;
            for rule in &def.rules {
                mentioned |= rule.required_on;
            }
            for rule in &mut def.rules {
                rule.required_off = mentioned.difference(&rule.required_on);
                if rule.required_on.intersects(&rule.required_off) {
                    // Unreachable with set subtraction; the invariant stays
                    // checked because downstream matching depends on it.
                    self.errors.push(CompileError::new(
                        format!("mappings[{}]", rule.order),
                        "rule requires and forbids the same modifier",
                    ));
                }
            }
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Phase: inheritance flattening
    // ---------------------------------------------------------------------------------------------

    /// Depth-first parent walk per keymap. Child rules win over parent rules
    /// with an identical `(input, required_on, required_off)` identity;
    /// surviving rules are renumbered so specificity ties resolve child
    /// first.
    fn flatten_inheritance(
        &mut self,
        order: &[String],
        defs: &mut HashMap<String, KeymapDef>,
    ) -> Vec<FlattenedKeymap> {
        defs.entry(GLOBAL_KEYMAP.to_string()).or_default();
        let mut names: Vec<String> = order
            .iter()
            .filter(|n| n.as_str() != GLOBAL_KEYMAP)
            .cloned()
            .collect();
        names.push(GLOBAL_KEYMAP.to_string());

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let mut combined: Vec<ParsedRule> = Vec::new();
            let mut seen: Vec<(u32, ModifierMask, ModifierMask)> = Vec::new();
            let mut chain: Vec<String> = Vec::new();
            let mut cursor = Some(name.clone());
            let mut broken = false;

            while let Some(current) = cursor {
                if chain.contains(&current) {
                    self.error(
                        format!("mappings(keymap '{name}')"),
                        format!("cyclic inheritance through '{current}'"),
                    );
                    broken = true;
                    break;
                }
                let Some(def) = defs.get(&current) else {
                    self.error(
                        format!("mappings(keymap '{name}')"),
                        format!("unknown parent keymap '{current}'"),
                    );
                    broken = true;
                    break;
                };
                for rule in &def.rules {
                    let shadow = (rule.input.packed(), rule.required_on, rule.required_off);
                    if seen.contains(&shadow) {
                        continue;
                    }
                    seen.push(shadow);
                    combined.push(rule.clone());
                }
                chain.push(current.clone());
                cursor = def.parent.clone();
            }
            if broken {
                continue;
            }

            let def = defs.get(&name).expect("walked above");
            out.push(FlattenedKeymap {
                name: name.clone(),
                window_class: def.window_class.clone(),
                window_title: def.window_title.clone(),
                rules: combined
                    .into_iter()
                    .enumerate()
                    .map(|(i, rule)| Rule {
                        input: rule.input,
                        required_on: rule.required_on,
                        required_off: rule.required_off,
                        action: rule.action,
                        order: i as u32,
                    })
                    .collect(),
            });
        }
        out
    }

    fn build_regex(&mut self, keymap: &str, field: &str, source: Option<&str>) -> Option<Regex> {
        let source = source?;
        match Regex::new(source) {
            Ok(re) => Some(re),
            Err(e) => {
                self.error(
                    format!("mappings(keymap '{keymap}').{field}"),
                    format!("invalid regex '{source}': {e}"),
                );
                None
            }
        }
    }
}

fn merge_attr(
    errors: &mut Vec<CompileError>,
    path: &str,
    target: &str,
    field: &str,
    current: &mut Option<String>,
    incoming: Option<&str>,
) {
    match (current.as_deref(), incoming) {
        (_, None) => {}
        (None, Some(v)) => *current = Some(v.to_string()),
        (Some(old), Some(new)) if old == new => {}
        (Some(old), Some(new)) => errors.push(CompileError::new(
            format!("{path}.{field}"),
            format!("keymap '{target}' already declares {field} '{old}', got '{new}'"),
        )),
    }
}

fn parse_scan_code(errors: &mut Vec<CompileError>, path: &str, hex: &str) -> Option<ScanCode> {
    let digits = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X"));
    let Some(digits) = digits else {
        errors.push(CompileError::new(
            path,
            format!("invalid scan code '{hex}': must start with '0x'"),
        ));
        return None;
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        errors.push(CompileError::new(
            path,
            format!("invalid scan code '{hex}': contains invalid characters"),
        ));
        return None;
    }
    match u16::from_str_radix(digits, 16) {
        Ok(raw) => Some(ScanCode::from_raw(raw)),
        Err(_) => {
            errors.push(CompileError::new(
                path,
                format!("invalid scan code '{hex}': value too large (max 0xFFFF)"),
            ));
            None
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Modifier-key recognition
// -------------------------------------------------------------------------------------------------

enum KeyClass {
    Physical(PhysicalMod),
    Lock(LockMod),
}

/// Keyboard-section names that drive the modifier state directly. Compared
/// after [`fold_key_name`].
fn classify_key_name(folded: &str) -> Option<KeyClass> {
    use KeyClass::*;
    match folded {
        "shift" | "lshift" | "rshift" | "leftshift" | "rightshift" => {
            Some(Physical(PhysicalMod::Shift))
        }
        "ctrl" | "control" | "lctrl" | "rctrl" | "lcontrol" | "rcontrol" | "leftctrl"
        | "rightctrl" => Some(Physical(PhysicalMod::Control)),
        "alt" | "lalt" | "ralt" | "leftalt" | "rightalt" => Some(Physical(PhysicalMod::Alt)),
        "win" | "lwin" | "rwin" | "windows" | "meta" | "super" => Some(Physical(PhysicalMod::Meta)),
        "capslock" => Some(Lock(LockMod::CapsLock)),
        "numlock" => Some(Lock(LockMod::NumLock)),
        "scrolllock" => Some(Lock(LockMod::ScrollLock)),
        _ => None,
    }
}

// -------------------------------------------------------------------------------------------------
// Document reconstruction (round-trip support)
// -------------------------------------------------------------------------------------------------

/// Render a compiled configuration back into a raw document. Inheritance is
/// already flattened and implicit `required_off` masks are recomputed on the
/// next compile, so `compile(to_document(compile(x)))` matches `compile(x)`
/// up to rule ordering within identical specificity.
pub fn to_document(cfg: &CompiledConfig) -> RawConfig {
    use std::collections::BTreeMap;

    let mut keys = BTreeMap::new();
    for key in cfg.keys.iter() {
        if let Some(scan) = key.primary_scan() {
            keys.insert(key.name().to_string(), format_scan(scan));
        }
    }

    // Triggers live on the global keymap; the flat `triggers` index is the
    // same data keyed for the hot path.
    let global_triggers = cfg
        .keymaps
        .iter()
        .find(|m| m.name() == GLOBAL_KEYMAP)
        .map(|m| m.local_triggers().to_vec())
        .unwrap_or_default();
    let mut virtual_modifiers = BTreeMap::new();
    for trigger in &global_triggers {
        let Some(trigger_name) = cfg.keys.name_for_scan(trigger.scan) else {
            continue;
        };
        virtual_modifiers.insert(
            format!("M{:02X}", trigger.slot),
            RawVirtualModifier {
                trigger: trigger_name.to_string(),
                tap: trigger
                    .tap
                    .and_then(|scan| cfg.keys.name_for_scan(scan))
                    .map(str::to_string),
                hold_threshold_ms: Some(trigger.hold_threshold.as_millis() as u64),
                retain_tap_on_sequence: trigger.retain_tap_on_sequence.then_some(true),
            },
        );
    }

    let mut mappings = Vec::new();
    for keymap in &cfg.keymaps {
        let mut rules: Vec<&Rule> = keymap.table().iter_rules().collect();
        rules.sort_by_key(|r| r.order);
        for rule in rules {
            let Some(from) = render_from(cfg, rule) else {
                continue;
            };
            let Some(to) = render_to(cfg, &rule.action) else {
                continue;
            };
            mappings.push(RawMapping {
                keymap: (keymap.name() != GLOBAL_KEYMAP).then(|| keymap.name().to_string()),
                parent: None,
                window_class: keymap.class_regex_source().map(str::to_string),
                window_title: keymap.title_regex_source().map(str::to_string),
                from,
                to,
            });
        }
    }

    RawConfig {
        version: CONFIG_VERSION.to_string(),
        keyboard: crate::schema::RawKeyboard { keys },
        virtual_modifiers,
        mappings,
    }
}

fn format_scan(scan: ScanCode) -> String {
    if scan.extended {
        format!("0xE0{:02X}", scan.code)
    } else {
        format!("0x{:02X}", scan.code)
    }
}

fn render_from(cfg: &CompiledConfig, rule: &Rule) -> Option<String> {
    let key_name = cfg.keys.name_for_scan(rule.input)?;
    let mut tokens: Vec<String> = Vec::new();
    for kind in rule.required_on.iter_kinds() {
        match kind {
            ModifierKind::Physical(p) => tokens.push(p.name().to_string()),
            ModifierKind::Virtual(slot) => tokens.push(format!("M{slot:02X}")),
            // Locks cannot be written in `from` expressions.
            ModifierKind::Lock(_) => {}
        }
    }
    tokens.push(key_name.to_string());
    Some(tokens.join("-"))
}

fn render_to(cfg: &CompiledConfig, action: &Action) -> Option<RawTo> {
    match action {
        Action::Replace(scan) => Some(RawTo::Single(cfg.keys.name_for_scan(*scan)?.to_string())),
        Action::Sequence(seq) => {
            let mut names = Vec::with_capacity(seq.len());
            for scan in seq {
                names.push(cfg.keys.name_for_scan(*scan)?.to_string());
            }
            Some(RawTo::Sequence(names))
        }
        // Not expressible in the document schema.
        Action::Suppress | Action::Passthrough => None,
    }
}
