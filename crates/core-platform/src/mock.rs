//! Scriptable backend for tests and benches.
//!
//! `MockHook::drive` plays the role of the OS: it pushes an event through
//! the installed callback and reports the suppress decision. `MockInjector`
//! records everything the engine emits so assertions can compare exact
//! output sequences. `MockWindowSystem` serves a scripted foreground window.

use crate::{
    HookCallback, HookError, InputHook, InputInjector, Point, ProcessInfo, Rect, WindowContext,
    WindowHandle, WindowSystem,
};
use core_events::{KeyInput, KeyOutput};
use core_keys::ScanCode;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Default)]
pub struct MockHook {
    callback: Mutex<Option<HookCallback>>,
    /// Remaining install attempts that should fail transiently.
    transient_failures: AtomicU32,
}

impl MockHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` install calls fail with [`HookError::Transient`].
    pub fn fail_next_installs(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    pub fn is_installed(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }

    /// Deliver an event as the OS would; returns the suppress decision, or
    /// `false` when no hook is installed (the OS keeps the event).
    pub fn drive(&self, event: KeyInput) -> bool {
        let callback = self.callback.lock().unwrap().clone();
        match callback {
            Some(cb) => cb(event),
            None => false,
        }
    }
}

impl InputHook for MockHook {
    fn install(&self, on_key: HookCallback) -> Result<(), HookError> {
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(HookError::Transient("scripted failure".into()));
        }
        *self.callback.lock().unwrap() = Some(on_key);
        Ok(())
    }

    fn uninstall(&self) {
        *self.callback.lock().unwrap() = None;
    }
}

#[derive(Default)]
pub struct MockInjector {
    injected: Mutex<Vec<KeyOutput>>,
}

impl MockInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the recorded output events.
    pub fn take(&self) -> Vec<KeyOutput> {
        std::mem::take(&mut self.injected.lock().unwrap())
    }

    pub fn recorded(&self) -> Vec<KeyOutput> {
        self.injected.lock().unwrap().clone()
    }
}

impl InputInjector for MockInjector {
    fn inject(&self, scan: ScanCode, press: bool) {
        self.injected.lock().unwrap().push(KeyOutput { scan, press });
    }
}

pub struct MockWindowSystem {
    foreground: Mutex<WindowContext>,
    windows: Mutex<HashMap<WindowHandle, WindowContext>>,
}

impl Default for MockWindowSystem {
    fn default() -> Self {
        Self {
            foreground: Mutex::new(WindowContext::default()),
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl MockWindowSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_foreground(&self, class: impl Into<String>, title: impl Into<String>) {
        *self.foreground.lock().unwrap() = WindowContext::new(class, title);
    }

    pub fn add_window(&self, handle: WindowHandle, class: &str, title: &str) {
        self.windows
            .lock()
            .unwrap()
            .insert(handle, WindowContext::new(class, title));
    }
}

impl WindowSystem for MockWindowSystem {
    fn foreground(&self) -> WindowContext {
        self.foreground.lock().unwrap().clone()
    }

    fn window_at(&self, _point: Point) -> Option<WindowHandle> {
        self.windows.lock().unwrap().keys().next().copied()
    }

    fn window_class(&self, handle: WindowHandle) -> Option<String> {
        self.windows
            .lock()
            .unwrap()
            .get(&handle)
            .map(|w| w.class.clone())
    }

    fn window_text(&self, handle: WindowHandle) -> Option<String> {
        self.windows
            .lock()
            .unwrap()
            .get(&handle)
            .map(|w| w.title.clone())
    }

    fn window_geometry(&self, _handle: WindowHandle) -> Option<Rect> {
        Some(Rect::default())
    }

    fn process_info(&self, _pid: u32) -> Option<ProcessInfo> {
        None
    }
}
