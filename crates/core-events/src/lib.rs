//! core-events: input event types and the in-process notification bus.
//!
//! The input structs here are the currency between the platform hook, the
//! hot-path processor, and the injector. The notification side is the
//! process-wide publish/subscribe registry that the engine, the IPC server,
//! and in-process subscribers (GUI, plugins) all share.

pub mod bus;

pub use bus::{NotificationBus, SubscriptionHandle};

use core_keys::ScanCode;
use std::time::Instant;

// -------------------------------------------------------------------------------------------------
// Input events
// -------------------------------------------------------------------------------------------------

/// Who originated an event. The injector tags everything it emits as
/// [`SourceTag::Injected`] so the hook's re-delivery of our own output is
/// passed through untouched instead of being remapped again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTag {
    User,
    Injected,
}

/// A raw key event as delivered by the platform hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub scan: ScanCode,
    pub press: bool,
    pub timestamp: Instant,
    pub source: SourceTag,
}

impl KeyInput {
    pub fn user(scan: ScanCode, press: bool) -> Self {
        Self {
            scan,
            press,
            timestamp: Instant::now(),
            source: SourceTag::User,
        }
    }

    pub fn at(scan: ScanCode, press: bool, timestamp: Instant) -> Self {
        Self {
            scan,
            press,
            timestamp,
            source: SourceTag::User,
        }
    }

    pub fn injected(scan: ScanCode, press: bool) -> Self {
        Self {
            scan,
            press,
            timestamp: Instant::now(),
            source: SourceTag::Injected,
        }
    }
}

/// A synthetic key event the processor wants injected into the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyOutput {
    pub scan: ScanCode,
    pub press: bool,
}

impl KeyOutput {
    pub const fn press(scan: ScanCode) -> Self {
        Self { scan, press: true }
    }

    pub const fn release(scan: ScanCode) -> Self {
        Self { scan, press: false }
    }
}

// -------------------------------------------------------------------------------------------------
// Notification kinds
// -------------------------------------------------------------------------------------------------

/// Bus notification identifiers. The numeric values are the wire-level ids
/// consumed by out-of-process subscribers; they live in a namespace distinct
/// from the IPC request/response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum NotificationKind {
    // Engine lifecycle
    EngineStarting = 0x1001,
    EngineStarted = 0x1002,
    EngineStopping = 0x1003,
    EngineStopped = 0x1004,
    EngineError = 0x1005,

    // Configuration
    ConfigLoading = 0x2001,
    ConfigLoaded = 0x2002,
    ConfigError = 0x2003,
    ConfigValidating = 0x2004,

    // Runtime
    KeymapSwitched = 0x3001,
    FocusChanged = 0x3002,
    ModifierChanged = 0x3003,

    // Metrics
    LatencyReport = 0x4001,
    CpuUsageReport = 0x4002,
}

impl NotificationKind {
    pub const fn code(self) -> u32 {
        self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn notification_wire_codes_are_stable() {
        assert_eq!(NotificationKind::EngineStarting.code(), 0x1001);
        assert_eq!(NotificationKind::EngineError.code(), 0x1005);
        assert_eq!(NotificationKind::ConfigLoading.code(), 0x2001);
        assert_eq!(NotificationKind::ConfigValidating.code(), 0x2004);
        assert_eq!(NotificationKind::KeymapSwitched.code(), 0x3001);
        assert_eq!(NotificationKind::ModifierChanged.code(), 0x3003);
        assert_eq!(NotificationKind::LatencyReport.code(), 0x4001);
        assert_eq!(NotificationKind::CpuUsageReport.code(), 0x4002);
    }

    #[test]
    fn injected_events_carry_the_tag() {
        let ev = KeyInput::injected(core_keys::ScanCode::basic(0x0F), true);
        assert_eq!(ev.source, SourceTag::Injected);
        let ev = KeyInput::user(core_keys::ScanCode::basic(0x0F), false);
        assert_eq!(ev.source, SourceTag::User);
    }
}
