//! No-op backend: lets the daemon run headless on platforms without a real
//! input driver. Hook installation succeeds but never delivers events;
//! injected events are logged at TRACE and dropped.

use crate::{
    HookCallback, HookError, InputHook, InputInjector, Point, ProcessInfo, Rect, WindowContext,
    WindowHandle, WindowSystem,
};
use core_keys::ScanCode;
use tracing::trace;

#[derive(Default)]
pub struct NullHook;

impl InputHook for NullHook {
    fn install(&self, _on_key: HookCallback) -> Result<(), HookError> {
        trace!(target: "platform.null", "hook_install");
        Ok(())
    }

    fn uninstall(&self) {
        trace!(target: "platform.null", "hook_uninstall");
    }
}

#[derive(Default)]
pub struct NullInjector;

impl InputInjector for NullInjector {
    fn inject(&self, scan: ScanCode, press: bool) {
        trace!(target: "platform.null", scan = %scan, press, "inject_dropped");
    }
}

#[derive(Default)]
pub struct NullWindowSystem;

impl WindowSystem for NullWindowSystem {
    fn foreground(&self) -> WindowContext {
        WindowContext::default()
    }

    fn window_at(&self, _point: Point) -> Option<WindowHandle> {
        None
    }

    fn window_class(&self, _handle: WindowHandle) -> Option<String> {
        None
    }

    fn window_text(&self, _handle: WindowHandle) -> Option<String> {
        None
    }

    fn window_geometry(&self, _handle: WindowHandle) -> Option<Rect> {
        None
    }

    fn process_info(&self, _pid: u32) -> Option<ProcessInfo> {
        None
    }
}
