//! JSON payload schemas for the introspection responses. Field names are
//! part of the wire contract and must not drift.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusPayload {
    /// `"running"` or `"stopped"`.
    pub state: String,
    /// Seconds since the engine entered `Running`; 0 while stopped.
    pub uptime: u64,
    pub config: String,
    pub key_count: u64,
    pub current_keymap: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsPayload {
    pub latency_avg_ns: u64,
    pub latency_p99_ns: u64,
    pub latency_max_ns: u64,
    pub cpu_usage_percent: f64,
    pub keys_per_second: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeymapsPayload {
    pub keymaps: Vec<KeymapEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeymapEntry {
    pub name: String,
    /// Regex sources as written in the configuration; empty when unscoped.
    pub window_class: String,
    pub window_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigPayload {
    pub path: String,
    pub version: String,
    pub keys: usize,
    pub virtual_modifiers: usize,
    pub mappings: usize,
    pub keymaps: usize,
}
