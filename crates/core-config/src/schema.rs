//! Raw document types for the version-2.0 JSON configuration.
//!
//! These mirror the on-disk schema one-to-one; semantic validation (key
//! resolution, modifier expressions, inheritance) happens in the compiler.
//! Unknown top-level keys and unknown fields inside known sections are
//! schema errors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub version: String,
    pub keyboard: RawKeyboard,
    #[serde(rename = "virtualModifiers", default)]
    pub virtual_modifiers: BTreeMap<String, RawVirtualModifier>,
    #[serde(default)]
    pub mappings: Vec<RawMapping>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawKeyboard {
    /// Key name -> hex scan code string (must start with `0x`).
    pub keys: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawVirtualModifier {
    pub trigger: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tap: Option<String>,
    #[serde(
        rename = "holdThresholdMs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub hold_threshold_ms: Option<u64>,
    #[serde(
        rename = "retainTapOnSequence",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub retain_tap_on_sequence: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawMapping {
    /// Target keymap; rows without one land in the global keymap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keymap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(
        rename = "windowClass",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub window_class: Option<String>,
    #[serde(
        rename = "windowTitle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub window_title: Option<String>,
    /// Hyphen-separated modifier expression; the last token is the key.
    pub from: String,
    pub to: RawTo,
}

/// `to` accepts a single key name or a sequence.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawTo {
    Single(String),
    Sequence(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_document_parses() {
        let doc: RawConfig = serde_json::from_str(
            r#"{ "version": "2.0", "keyboard": { "keys": { "A": "0x1E" } } }"#,
        )
        .unwrap();
        assert_eq!(doc.version, "2.0");
        assert_eq!(doc.keyboard.keys.len(), 1);
        assert!(doc.virtual_modifiers.is_empty());
        assert!(doc.mappings.is_empty());
    }

    #[test]
    fn unknown_top_level_keys_are_rejected() {
        let err = serde_json::from_str::<RawConfig>(
            r#"{ "version": "2.0", "keyboard": { "keys": {} }, "macros": [] }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("macros"));
    }

    #[test]
    fn missing_keyboard_keys_is_rejected() {
        let err =
            serde_json::from_str::<RawConfig>(r#"{ "version": "2.0", "keyboard": {} }"#)
                .unwrap_err();
        assert!(err.to_string().contains("keys"));
    }

    #[test]
    fn to_field_accepts_string_or_array() {
        let doc: RawConfig = serde_json::from_str(
            r#"{
                "version": "2.0",
                "keyboard": { "keys": { "A": "0x1E", "B": "0x30" } },
                "mappings": [
                    { "from": "A", "to": "B" },
                    { "from": "B", "to": ["A", "B"] }
                ]
            }"#,
        )
        .unwrap();
        assert!(matches!(doc.mappings[0].to, RawTo::Single(_)));
        assert!(matches!(&doc.mappings[1].to, RawTo::Sequence(seq) if seq.len() == 2));
    }
}
