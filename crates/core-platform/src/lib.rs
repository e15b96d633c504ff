//! core-platform: contracts for the OS-facing collaborators.
//!
//! The engine consumes three capabilities: capturing raw key events
//! ([`InputHook`]), emitting synthetic ones ([`InputInjector`]), and querying
//! windows ([`WindowSystem`]). Real backends live outside the core; this
//! crate carries the trait surface, a null backend for headless operation,
//! and scriptable mocks for tests.

pub mod mock;
pub mod null;

pub use null::{NullHook, NullInjector, NullWindowSystem};

use core_events::KeyInput;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

// -------------------------------------------------------------------------------------------------
// Window types
// -------------------------------------------------------------------------------------------------

pub type WindowHandle = u64;

/// Foreground-window identity used for keymap resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowContext {
    pub class: String,
    pub title: String,
}

impl WindowContext {
    pub fn new(class: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub name: String,
    pub exe_path: PathBuf,
}

// -------------------------------------------------------------------------------------------------
// Capture / inject
// -------------------------------------------------------------------------------------------------

/// Hook callback: receives every raw key event and answers whether the OS
/// should suppress the original. Must be cheap and must never panic through
/// the FFI boundary (the engine wraps its processing accordingly).
pub type HookCallback = Arc<dyn Fn(KeyInput) -> bool + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum HookError {
    /// Worth one retry (device busy, transient permission race).
    #[error("transient hook failure: {0}")]
    Transient(String),
    /// Installation cannot succeed; the engine transitions to its error
    /// state.
    #[error("permanent hook failure: {0}")]
    Fatal(String),
}

pub trait InputHook: Send + Sync {
    fn install(&self, on_key: HookCallback) -> Result<(), HookError>;
    fn uninstall(&self);
}

/// Synthetic event emitter. Implementations must tag injected events so the
/// hook redelivers them with `SourceTag::Injected`.
pub trait InputInjector: Send + Sync {
    fn inject(&self, scan: core_keys::ScanCode, press: bool);
}

// -------------------------------------------------------------------------------------------------
// Window system
// -------------------------------------------------------------------------------------------------

pub trait WindowSystem: Send + Sync {
    fn foreground(&self) -> WindowContext;
    fn window_at(&self, point: Point) -> Option<WindowHandle>;
    fn window_class(&self, handle: WindowHandle) -> Option<String>;
    fn window_text(&self, handle: WindowHandle) -> Option<String>;
    fn window_geometry(&self, handle: WindowHandle) -> Option<Rect>;
    fn process_info(&self, pid: u32) -> Option<ProcessInfo>;
}
