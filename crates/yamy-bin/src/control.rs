//! Bridge between the IPC server and the engine facade: snapshot structs in,
//! wire payloads out.

use core_engine::EngineHandle;
use core_ipc::{
    ConfigPayload, ControlBackend, InvestigateReply, KeymapEntry, KeymapsPayload, MetricsPayload,
    StatusPayload,
};
use crossbeam_channel::Receiver;
use std::path::PathBuf;

pub struct DaemonControl {
    handle: EngineHandle,
}

impl DaemonControl {
    pub fn new(handle: EngineHandle) -> Self {
        Self { handle }
    }
}

impl ControlBackend for DaemonControl {
    fn start(&self) -> Result<(), String> {
        self.handle.start().map_err(|e| e.to_string())
    }

    fn stop(&self) -> Result<(), String> {
        self.handle.stop().map_err(|e| e.to_string())
    }

    fn reload(&self, path: Option<&str>) -> Result<String, String> {
        self.handle
            .switch_configuration(path.map(PathBuf::from))
            .map(|()| "configuration reloaded".to_string())
            .map_err(|e| e.to_string())
    }

    fn switch_config(&self, path: &str) -> Result<(), String> {
        self.handle
            .switch_configuration(Some(PathBuf::from(path)))
            .map_err(|e| e.to_string())
    }

    fn set_enabled(&self, enabled: bool) -> Result<(), String> {
        self.handle.set_enabled(enabled).map_err(|e| e.to_string())
    }

    fn status(&self) -> StatusPayload {
        let status = self.handle.status();
        StatusPayload {
            state: status.state_str().to_string(),
            uptime: status.uptime_secs,
            config: status.config_path.clone(),
            key_count: status.key_count,
            current_keymap: status.current_keymap,
        }
    }

    fn config(&self) -> ConfigPayload {
        let info = self.handle.config_info();
        ConfigPayload {
            path: info.path,
            version: info.version,
            keys: info.keys,
            virtual_modifiers: info.virtual_modifiers,
            mappings: info.mappings,
            keymaps: info.keymaps,
        }
    }

    fn keymaps(&self) -> KeymapsPayload {
        KeymapsPayload {
            keymaps: self
                .handle
                .keymaps()
                .into_iter()
                .map(|map| KeymapEntry {
                    name: map.name,
                    window_class: map.window_class.unwrap_or_default(),
                    window_title: map.window_title.unwrap_or_default(),
                })
                .collect(),
        }
    }

    fn metrics(&self) -> MetricsPayload {
        let snap = self.handle.metrics();
        MetricsPayload {
            latency_avg_ns: snap.latency_avg_ns,
            latency_p99_ns: snap.latency_p99_ns,
            latency_max_ns: snap.latency_max_ns,
            cpu_usage_percent: snap.cpu_usage_percent,
            keys_per_second: snap.keys_per_second,
        }
    }

    fn investigate_window(&self, handle: u64) -> InvestigateReply {
        let info = self.handle.investigate_window(handle);
        InvestigateReply {
            keymap_name: info.keymap_name,
            matched_class_regex: info.matched_class_regex,
            matched_title_regex: info.matched_title_regex,
            active_modifiers: info.active_modifiers,
            is_default: info.is_default,
        }
    }

    fn enable_investigate_mode(&self) -> Option<Receiver<String>> {
        self.handle.set_investigate_mode(true)
    }

    fn disable_investigate_mode(&self) {
        self.handle.set_investigate_mode(false);
    }
}
