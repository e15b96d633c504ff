//! core-keys: scan codes, key definitions, and the modifier model.
//!
//! Pure value types shared by the config compiler, the lookup tables, and the
//! hot-path processor. Nothing in this crate performs I/O or locking; the
//! processor owns a [`ModifierState`] and everything else treats masks as
//! plain data.

pub mod modifier;

pub use modifier::{LockMod, ModifierKind, ModifierMask, ModifierState, PhysicalMod};

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

// -------------------------------------------------------------------------------------------------
// Scan codes
// -------------------------------------------------------------------------------------------------

/// Hardware-level key identifier: a 16-bit make code plus the E0 "extended"
/// tag. Extended keys (arrows, navigation cluster) are distinct inputs from
/// their non-extended aliases, so `extended` participates in equality and in
/// table keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScanCode {
    pub code: u16,
    pub extended: bool,
}

impl ScanCode {
    pub const fn new(code: u16, extended: bool) -> Self {
        Self { code, extended }
    }

    /// A plain (non-E0) scan code.
    pub const fn basic(code: u16) -> Self {
        Self {
            code,
            extended: false,
        }
    }

    /// Decode a raw 16-bit value as found in configuration files. Values with
    /// an `E0` high byte (`0xE04B` = extended Left) carry the extended tag in
    /// the value itself; everything else is a plain make code.
    pub const fn from_raw(raw: u16) -> Self {
        if raw & 0xFF00 == 0xE000 {
            Self {
                code: raw & 0x00FF,
                extended: true,
            }
        } else {
            Self {
                code: raw,
                extended: false,
            }
        }
    }

    /// Stable `u32` form used as a lookup-table key: extended flag in bit 16.
    pub const fn packed(self) -> u32 {
        ((self.extended as u32) << 16) | self.code as u32
    }

    pub const fn from_packed(packed: u32) -> Self {
        Self {
            code: (packed & 0xFFFF) as u16,
            extended: packed & 0x1_0000 != 0,
        }
    }
}

impl fmt::Display for ScanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "0xE0{:02X}", self.code)
        } else {
            write!(f, "0x{:02X}", self.code)
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Key definitions
// -------------------------------------------------------------------------------------------------

/// A named key: one primary name, zero or more aliases, at least one scan
/// code. Aliases share the primary's lookup entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    name: String,
    aliases: Vec<String>,
    scan_codes: Vec<ScanCode>,
}

impl Key {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            scan_codes: Vec::new(),
        }
    }

    pub fn with_scan_code(name: impl Into<String>, scan: ScanCode) -> Self {
        let mut key = Self::new(name);
        key.add_scan_code(scan);
        key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn add_alias(&mut self, alias: impl Into<String>) {
        self.aliases.push(alias.into());
    }

    pub fn add_scan_code(&mut self, scan: ScanCode) {
        self.scan_codes.push(scan);
    }

    pub fn scan_codes(&self) -> &[ScanCode] {
        &self.scan_codes
    }

    /// The scan code used when this key appears as an output.
    pub fn primary_scan(&self) -> Option<ScanCode> {
        self.scan_codes.first().copied()
    }
}

/// Fold a key name for lookup: ASCII characters compare case-insensitively,
/// non-ASCII bytes must match exactly.
pub fn fold_key_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { c })
        .collect()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyTableError {
    #[error("duplicate key name '{0}'")]
    DuplicateName(String),
    #[error("duplicate alias '{alias}' for key '{key}'")]
    DuplicateAlias { key: String, alias: String },
}

/// Name-indexed collection of key definitions. Primary names and aliases
/// share one namespace; insertion order is preserved for introspection.
#[derive(Debug, Clone, Default)]
pub struct KeyTable {
    keys: Vec<Key>,
    by_name: HashMap<String, usize>,
}

impl KeyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: Key) -> Result<(), KeyTableError> {
        let folded = fold_key_name(key.name());
        if self.by_name.contains_key(&folded) {
            return Err(KeyTableError::DuplicateName(key.name().to_string()));
        }
        let mut alias_folds = Vec::with_capacity(key.aliases().len());
        for alias in key.aliases() {
            let alias_fold = fold_key_name(alias);
            if self.by_name.contains_key(&alias_fold) || alias_fold == folded {
                return Err(KeyTableError::DuplicateAlias {
                    key: key.name().to_string(),
                    alias: alias.clone(),
                });
            }
            alias_folds.push(alias_fold);
        }
        let index = self.keys.len();
        self.keys.push(key);
        self.by_name.insert(folded, index);
        for alias_fold in alias_folds {
            self.by_name.insert(alias_fold, index);
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&Key> {
        self.by_name
            .get(&fold_key_name(name))
            .map(|&idx| &self.keys[idx])
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter()
    }

    /// Primary name of the first key (insertion order) carrying `scan`.
    pub fn name_for_scan(&self, scan: ScanCode) -> Option<&str> {
        self.keys
            .iter()
            .find(|k| k.scan_codes().contains(&scan))
            .map(Key::name)
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scan_code_raw_decoding() {
        assert_eq!(ScanCode::from_raw(0x1E), ScanCode::basic(0x1E));
        assert_eq!(ScanCode::from_raw(0xE04B), ScanCode::new(0x4B, true));
        // A non-E0 high byte is an ordinary 16-bit make code.
        assert_eq!(ScanCode::from_raw(0x011E), ScanCode::basic(0x011E));
    }

    #[test]
    fn scan_code_packed_round_trip() {
        for scan in [
            ScanCode::basic(0x00),
            ScanCode::basic(0x1E),
            ScanCode::new(0x4B, true),
            ScanCode::new(0xFF, true),
        ] {
            assert_eq!(ScanCode::from_packed(scan.packed()), scan);
        }
        // Extended and basic forms of the same make code never collide.
        assert_ne!(
            ScanCode::basic(0x4B).packed(),
            ScanCode::new(0x4B, true).packed()
        );
    }

    #[test]
    fn scan_code_display() {
        assert_eq!(ScanCode::basic(0x1E).to_string(), "0x1E");
        assert_eq!(ScanCode::new(0x4B, true).to_string(), "0xE04B");
    }

    #[test]
    fn key_table_lookup_is_ascii_case_insensitive() {
        let mut table = KeyTable::new();
        table
            .add(Key::with_scan_code("CapsLock", ScanCode::basic(0x3A)))
            .unwrap();
        assert!(table.find("capslock").is_some());
        assert!(table.find("CAPSLOCK").is_some());
        assert!(table.find("Caps_Lock").is_none());
    }

    #[test]
    fn key_table_non_ascii_names_match_exactly() {
        let mut table = KeyTable::new();
        table
            .add(Key::with_scan_code("半角/全角", ScanCode::basic(0x29)))
            .unwrap();
        assert!(table.find("半角/全角").is_some());
        assert!(table.find("半角/全角 ").is_none());
    }

    #[test]
    fn key_table_rejects_duplicates() {
        let mut table = KeyTable::new();
        table
            .add(Key::with_scan_code("A", ScanCode::basic(0x1E)))
            .unwrap();
        let err = table
            .add(Key::with_scan_code("a", ScanCode::basic(0x1E)))
            .unwrap_err();
        assert_eq!(err, KeyTableError::DuplicateName("a".to_string()));
    }

    #[test]
    fn aliases_share_the_primary_lookup() {
        let mut table = KeyTable::new();
        let mut key = Key::with_scan_code("Escape", ScanCode::basic(0x01));
        key.add_alias("Esc");
        table.add(key).unwrap();
        let by_alias = table.find("esc").unwrap();
        assert_eq!(by_alias.name(), "Escape");
        assert_eq!(by_alias.primary_scan(), Some(ScanCode::basic(0x01)));
    }
}
