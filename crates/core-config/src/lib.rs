//! core-config: declarative JSON configuration -> compiled lookup data.
//!
//! The compiler is all-or-nothing: every diagnostic is collected as a
//! `(path, message)` pair and a single failed phase fails the whole compile,
//! so the engine can keep running on its previous configuration. The output
//! ([`CompiledConfig`]) is the immutable snapshot the hot path borrows.

pub mod compiler;
pub mod schema;

pub use compiler::{
    GLOBAL_KEYMAP, compile_document, compile_document_with_cancel, compile_str,
    compile_str_with_cancel, load_file, load_file_with_cancel, to_document,
};
pub use schema::{RawConfig, RawKeyboard, RawMapping, RawTo, RawVirtualModifier};

use core_keys::{KeyTable, LockMod, PhysicalMod};
use core_keymap::{Keymap, VirtualTrigger};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Supported document version.
pub const CONFIG_VERSION: &str = "2.0";

// -------------------------------------------------------------------------------------------------
// Errors
// -------------------------------------------------------------------------------------------------

/// One diagnostic: a JSON-ish path into the document plus a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct CompileError {
    pub path: String,
    pub message: String,
}

impl CompileError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Compile failure carrying every collected diagnostic.
#[derive(Debug)]
pub struct CompileFailure {
    pub errors: Vec<CompileError>,
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration compile failed")?;
        for err in &self.errors {
            write!(f, "; {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileFailure {}

impl CompileFailure {
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![CompileError::new(path, message)],
        }
    }

    /// The first diagnostic, rendered; used for IPC error responses.
    pub fn summary(&self) -> String {
        self.errors
            .first()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown compile error".to_string())
    }
}

// -------------------------------------------------------------------------------------------------
// Compiled output
// -------------------------------------------------------------------------------------------------

/// Everything the runtime needs, produced by one compile and replaced
/// atomically on reload. Scan-code keyed maps use [`core_keys::ScanCode::packed`]
/// as the key.
#[derive(Debug)]
pub struct CompiledConfig {
    /// Display name (file stem, or "inline" for string compiles).
    pub name: String,
    pub source_path: PathBuf,
    pub keys: KeyTable,
    /// Declaration order, global fallback last.
    pub keymaps: Vec<Arc<Keymap>>,
    /// Tap/hold triggers, global plus keymap-local, by packed scan code.
    pub triggers: HashMap<u32, VirtualTrigger>,
    /// Physical modifier keys recognized from the keyboard section.
    pub modifier_keys: HashMap<u32, PhysicalMod>,
    /// Lock keys recognized from the keyboard section.
    pub lock_keys: HashMap<u32, LockMod>,
    pub virtual_modifier_count: usize,
    pub mapping_count: usize,
}

impl CompiledConfig {
    /// A configuration with no keys and no rules: every event passes
    /// through. Used before the first successful load.
    pub fn empty() -> Self {
        Self {
            name: "empty".to_string(),
            source_path: PathBuf::new(),
            keys: KeyTable::new(),
            keymaps: Vec::new(),
            triggers: HashMap::new(),
            modifier_keys: HashMap::new(),
            lock_keys: HashMap::new(),
            virtual_modifier_count: 0,
            mapping_count: 0,
        }
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}
