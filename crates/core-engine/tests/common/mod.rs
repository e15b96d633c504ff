#![allow(dead_code)] // Shared across integration test binaries; each uses a subset.

use core_engine::{Engine, EngineHandle};
use core_events::{KeyInput, KeyOutput, NotificationBus};
use core_keys::ScanCode;
use core_platform::mock::{MockHook, MockInjector, MockWindowSystem};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

/// A full engine over the mock platform, driven like the OS would drive it.
pub struct Harness {
    pub engine: Engine,
    pub handle: EngineHandle,
    pub hook: Arc<MockHook>,
    pub injector: Arc<MockInjector>,
    pub windows: Arc<MockWindowSystem>,
    pub bus: Arc<NotificationBus>,
    pub config_file: NamedTempFile,
}

pub fn write_config(json: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("yamy-config-")
        .suffix(".json")
        .tempfile()
        .expect("temp config file");
    file.write_all(json.as_bytes()).expect("write temp config");
    file
}

/// Build (but do not start) an engine bound to a temp config file.
pub fn harness(config_json: &str) -> Harness {
    let config_file = write_config(config_json);
    let bus = Arc::new(NotificationBus::new());
    let hook = Arc::new(MockHook::new());
    let injector = Arc::new(MockInjector::new());
    let windows = Arc::new(MockWindowSystem::new());
    let engine = Engine::new(
        bus.clone(),
        hook.clone(),
        injector.clone(),
        windows.clone(),
        Some(config_file.path().to_path_buf()),
    );
    let handle = engine.handle();
    Harness {
        engine,
        handle,
        hook,
        injector,
        windows,
        bus,
        config_file,
    }
}

/// Build and start.
pub fn running_harness(config_json: &str) -> Harness {
    let h = harness(config_json);
    h.handle.start().expect("engine should start");
    h
}

impl Harness {
    pub fn press_at(&self, scan: ScanCode, at: Instant) -> bool {
        self.hook.drive(KeyInput::at(scan, true, at))
    }

    pub fn release_at(&self, scan: ScanCode, at: Instant) -> bool {
        self.hook.drive(KeyInput::at(scan, false, at))
    }

    /// Press+release with the given hold duration, measured from `base`.
    pub fn tap(&self, scan: ScanCode, base: Instant, hold_ms: u64) -> (bool, bool) {
        let pressed = self.press_at(scan, base);
        let released = self.release_at(scan, base + Duration::from_millis(hold_ms));
        (pressed, released)
    }

    pub fn outputs(&self) -> Vec<KeyOutput> {
        self.injector.take()
    }
}

pub const SCENARIO_CONFIG: &str = r#"{
    "version": "2.0",
    "keyboard": { "keys": {
        "A": "0x1E", "H": "0x23", "Tab": "0x0F", "Escape": "0x01",
        "CapsLock": "0x3A", "F1": "0x3B", "Back": "0xE06A", "Left": "0xE04B"
    } },
    "virtualModifiers": {
        "M00": { "trigger": "CapsLock", "tap": "Escape", "holdThresholdMs": 200 }
    },
    "mappings": [
        { "from": "A", "to": "Tab" },
        { "from": "M00-H", "to": "Left" },
        { "keymap": "browser", "windowClass": "^Firefox$", "from": "F1", "to": "Back" },
        { "from": "F1", "to": "F1" }
    ]
}"#;
