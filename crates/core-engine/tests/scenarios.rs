//! End-to-end scenarios over the mock platform: simple remap, tap/hold both
//! paths, window-context switching, and stop-time cleanup.

mod common;

use common::{SCENARIO_CONFIG, running_harness};
use core_engine::EngineState;
use core_events::KeyOutput;
use core_keys::ScanCode;
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

const A: ScanCode = ScanCode::basic(0x1E);
const H: ScanCode = ScanCode::basic(0x23);
const TAB: ScanCode = ScanCode::basic(0x0F);
const ESC: ScanCode = ScanCode::basic(0x01);
const CAPS: ScanCode = ScanCode::basic(0x3A);
const F1: ScanCode = ScanCode::basic(0x3B);
const BACK: ScanCode = ScanCode::new(0x6A, true);
const LEFT: ScanCode = ScanCode::new(0x4B, true);

#[test]
fn simple_remap_a_to_tab() {
    let h = running_harness(SCENARIO_CONFIG);
    let t0 = Instant::now();

    assert!(h.press_at(A, t0), "mapped press must be suppressed");
    assert!(h.release_at(A, t0 + Duration::from_millis(30)));
    assert_eq!(
        h.outputs(),
        vec![KeyOutput::press(TAB), KeyOutput::release(TAB)]
    );
}

#[test]
fn tap_path_emits_escape() {
    let h = running_harness(SCENARIO_CONFIG);
    let t0 = Instant::now();

    assert!(h.press_at(CAPS, t0));
    assert!(h.outputs().is_empty(), "trigger press is queued, not emitted");
    assert!(h.release_at(CAPS, t0 + Duration::from_millis(50)));
    assert_eq!(
        h.outputs(),
        vec![KeyOutput::press(ESC), KeyOutput::release(ESC)]
    );
}

#[test]
fn hold_path_asserts_m00_and_maps_h_to_left() {
    let h = running_harness(SCENARIO_CONFIG);
    let t0 = Instant::now();

    h.press_at(CAPS, t0);
    // 250ms later H arrives; M00 is active (no OS-visible event for it).
    assert!(h.press_at(H, t0 + Duration::from_millis(250)));
    assert_eq!(h.outputs(), vec![KeyOutput::press(LEFT)]);

    assert!(h.release_at(H, t0 + Duration::from_millis(300)));
    assert_eq!(h.outputs(), vec![KeyOutput::release(LEFT)]);

    assert!(h.release_at(CAPS, t0 + Duration::from_millis(350)));
    assert!(h.outputs().is_empty(), "hold release emits nothing");
}

#[test]
fn window_context_switches_f1_behavior() {
    let h = running_harness(SCENARIO_CONFIG);
    let t0 = Instant::now();

    h.handle.notify_focus("Firefox", "GitHub - yamy");
    h.press_at(F1, t0);
    h.release_at(F1, t0 + Duration::from_millis(20));
    assert_eq!(
        h.outputs(),
        vec![KeyOutput::press(BACK), KeyOutput::release(BACK)]
    );

    h.handle.notify_focus("Terminal", "zsh");
    h.press_at(F1, t0 + Duration::from_millis(50));
    h.release_at(F1, t0 + Duration::from_millis(70));
    // Global F1 -> F1: replaced with itself, still synthesized.
    assert_eq!(
        h.outputs(),
        vec![KeyOutput::press(F1), KeyOutput::release(F1)]
    );
}

#[test]
fn unmapped_events_pass_through_untouched() {
    let h = running_harness(SCENARIO_CONFIG);
    let t0 = Instant::now();
    let unmapped = ScanCode::basic(0x10);
    assert!(!h.press_at(unmapped, t0));
    assert!(!h.release_at(unmapped, t0 + Duration::from_millis(10)));
    assert!(h.outputs().is_empty());
}

#[test]
fn stop_releases_held_synthetic_keys() {
    let h = running_harness(SCENARIO_CONFIG);
    let t0 = Instant::now();

    h.press_at(A, t0);
    assert_eq!(h.outputs(), vec![KeyOutput::press(TAB)]);

    h.handle.stop().unwrap();
    assert_eq!(h.outputs(), vec![KeyOutput::release(TAB)]);
    assert!(!h.hook.is_installed(), "stop must uninstall the hook");
    assert_eq!(h.handle.status().state, EngineState::Stopped);
}

#[test]
fn disable_passes_events_through_and_releases_held_keys() {
    let h = running_harness(SCENARIO_CONFIG);
    let t0 = Instant::now();

    h.press_at(A, t0);
    h.outputs();
    h.handle.set_enabled(false).unwrap();
    assert_eq!(h.outputs(), vec![KeyOutput::release(TAB)]);

    // Still running, but transforming nothing.
    assert!(!h.press_at(A, t0 + Duration::from_millis(10)));
    assert!(h.handle.status().running);
    assert!(!h.handle.status().enabled);

    h.handle.set_enabled(true).unwrap();
    assert!(h.press_at(A, t0 + Duration::from_millis(20)));
}

#[test]
fn status_reflects_running_engine() {
    let h = running_harness(SCENARIO_CONFIG);
    let t0 = Instant::now();
    h.tap(A, t0, 10);

    let status = h.handle.status();
    assert!(status.running);
    assert_eq!(status.state_str(), "running");
    assert!(status.key_count >= 2);
    assert!(status.config_path.ends_with(".json"));
    assert_eq!(status.current_keymap, "Global");
}

#[test]
fn start_is_rejected_while_running() {
    let h = running_harness(SCENARIO_CONFIG);
    let err = h.handle.start().unwrap_err();
    assert!(err.to_string().contains("invalid lifecycle transition"));
}

#[test]
fn transient_hook_failure_is_retried_once() {
    let h = common::harness(SCENARIO_CONFIG);
    h.hook.fail_next_installs(1);
    h.handle.start().expect("one transient failure is retried");
    assert!(h.hook.is_installed());
}

#[test]
fn persistent_hook_failure_moves_to_error_state() {
    let h = common::harness(SCENARIO_CONFIG);
    h.hook.fail_next_installs(2);
    let err = h.handle.start().unwrap_err();
    assert!(err.to_string().contains("platform failure"));
    assert_eq!(h.handle.status().state, EngineState::Error);

    // Error -> Stopped -> Running recovers.
    h.handle.stop().unwrap();
    h.handle.start().expect("start after recovery");
    assert!(h.handle.status().running);
}

#[test]
fn investigate_window_reports_the_active_keymap() {
    let h = running_harness(SCENARIO_CONFIG);
    h.windows.set_foreground("Firefox", "docs");
    let info = h.handle.investigate_window(0);
    assert_eq!(info.keymap_name, "browser");
    assert_eq!(info.matched_class_regex, "^Firefox$");
    assert!(!info.is_default);
}

#[test]
fn investigate_mode_streams_key_event_lines() {
    let h = running_harness(SCENARIO_CONFIG);
    let rx = h.handle.set_investigate_mode(true).expect("stream on enable");
    let t0 = Instant::now();
    h.tap(A, t0, 10);

    let line = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(line.contains("press"), "got line: {line}");
    assert!(line.contains("0x1E"), "got line: {line}");
    assert!(line.contains("0x0F"), "got line: {line}");

    assert!(h.handle.set_investigate_mode(false).is_none());
    h.tap(A, t0 + Duration::from_millis(50), 10);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}
