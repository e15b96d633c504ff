//! Socket-level tests for the message loop: request/response ordering,
//! oversize handling, framing-violation shutdown, and the investigate-mode
//! notification stream.

use core_ipc::{
    ConfigPayload, ControlBackend, IpcClient, IpcServer, InvestigateReply, KeymapsPayload,
    MetricsPayload, Request, Response, StatusPayload,
};
use crossbeam_channel::{Receiver, Sender, unbounded};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct StubBackend {
    started: AtomicBool,
    enabled: AtomicBool,
    investigate_tx: Mutex<Option<Sender<String>>>,
}

impl StubBackend {
    fn push_key_event(&self, line: &str) {
        if let Some(tx) = self.investigate_tx.lock().unwrap().as_ref() {
            tx.send(line.to_string()).unwrap();
        }
    }
}

impl ControlBackend for StubBackend {
    fn start(&self) -> Result<(), String> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), String> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn reload(&self, path: Option<&str>) -> Result<String, String> {
        match path {
            Some(p) if p.ends_with("broken.json") => {
                Err("keyboard: missing required 'keyboard' section".to_string())
            }
            Some(p) => Ok(format!("reloaded {p}")),
            None => Ok("reloaded current configuration".to_string()),
        }
    }

    fn switch_config(&self, _path: &str) -> Result<(), String> {
        Ok(())
    }

    fn set_enabled(&self, enabled: bool) -> Result<(), String> {
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn status(&self) -> StatusPayload {
        StatusPayload {
            state: "running".to_string(),
            uptime: 5,
            config: "/home/user/configs/work.json".to_string(),
            key_count: 12,
            current_keymap: "Global".to_string(),
        }
    }

    fn config(&self) -> ConfigPayload {
        ConfigPayload {
            path: "/home/user/configs/work.json".to_string(),
            version: "2.0".to_string(),
            keys: 8,
            virtual_modifiers: 1,
            mappings: 4,
            keymaps: 2,
        }
    }

    fn keymaps(&self) -> KeymapsPayload {
        KeymapsPayload { keymaps: vec![] }
    }

    fn metrics(&self) -> MetricsPayload {
        MetricsPayload {
            latency_avg_ns: 1500,
            latency_p99_ns: 6000,
            latency_max_ns: 12_000,
            cpu_usage_percent: 0.2,
            keys_per_second: 9.0,
        }
    }

    fn investigate_window(&self, handle: u64) -> InvestigateReply {
        InvestigateReply {
            keymap_name: format!("window-{handle}"),
            matched_class_regex: "^Firefox$".to_string(),
            matched_title_regex: String::new(),
            active_modifiers: "M00".to_string(),
            is_default: false,
        }
    }

    fn enable_investigate_mode(&self) -> Option<Receiver<String>> {
        let (tx, rx) = unbounded();
        *self.investigate_tx.lock().unwrap() = Some(tx);
        Some(rx)
    }

    fn disable_investigate_mode(&self) {
        *self.investigate_tx.lock().unwrap() = None;
    }
}

struct Fixture {
    backend: Arc<StubBackend>,
    path: PathBuf,
    // Keeps the socket directory alive for the test's duration.
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("yamy-test.sock");
    let backend = Arc::new(StubBackend::default());
    let server = IpcServer::bind_path(path.clone()).unwrap();
    server.spawn(backend.clone());
    Fixture {
        backend,
        path,
        _dir: dir,
    }
}

#[test]
fn get_status_returns_the_status_json() {
    let fx = fixture();
    let mut client = IpcClient::connect_path(&fx.path).unwrap();
    match client.request(&Request::GetStatus).unwrap() {
        Response::Status(json) => {
            let parsed: StatusPayload = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed.state, "running");
            assert!(parsed.config.ends_with("work.json"));
            assert_eq!(parsed.key_count, 12);
        }
        other => panic!("expected status response, got {other:?}"),
    }
}

#[test]
fn lifecycle_commands_round_trip() {
    let fx = fixture();
    let mut client = IpcClient::connect_path(&fx.path).unwrap();

    assert_eq!(client.request(&Request::Start).unwrap(), Response::Ok(None));
    assert!(fx.backend.started.load(Ordering::SeqCst));

    assert_eq!(
        client.request(&Request::SetEnabled(false)).unwrap(),
        Response::Ok(None)
    );
    assert!(!fx.backend.enabled.load(Ordering::SeqCst));

    assert_eq!(client.request(&Request::Stop).unwrap(), Response::Ok(None));
    assert!(!fx.backend.started.load(Ordering::SeqCst));
}

#[test]
fn failed_reload_produces_an_error_response() {
    let fx = fixture();
    let mut client = IpcClient::connect_path(&fx.path).unwrap();
    match client
        .request(&Request::Reload(Some("/tmp/broken.json".to_string())))
        .unwrap()
    {
        Response::Error(message) => assert!(message.contains("keyboard")),
        other => panic!("expected error response, got {other:?}"),
    }
    // The connection survives a rejected command.
    assert!(matches!(
        client.request(&Request::GetMetrics).unwrap(),
        Response::Metrics(_)
    ));
}

#[test]
fn oversized_payload_is_rejected_but_the_connection_continues() {
    let fx = fixture();
    let mut client = IpcClient::connect_path(&fx.path).unwrap();

    let oversize = (core_ipc::MAX_PAYLOAD + 5) as u32;
    let stream = client.stream_mut();
    stream.write_all(&oversize.to_be_bytes()).unwrap();
    stream.write_all(&0x2001u32.to_be_bytes()).unwrap();
    stream
        .write_all(&vec![0u8; oversize as usize - 4])
        .unwrap();

    match client.read_response().unwrap() {
        Response::Error(message) => assert!(message.contains("1 MiB")),
        other => panic!("expected error response, got {other:?}"),
    }
    assert!(matches!(
        client.request(&Request::GetStatus).unwrap(),
        Response::Status(_)
    ));
}

#[test]
fn malformed_framing_closes_the_connection_but_not_the_server() {
    let fx = fixture();
    let mut client = IpcClient::connect_path(&fx.path).unwrap();

    // Length word too small to hold the type word.
    client.stream_mut().write_all(&[0, 0, 0, 1, 0xAA]).unwrap();
    assert!(client.read_response().is_err(), "connection must be closed");

    // The server keeps accepting fresh connections.
    let mut fresh = IpcClient::connect_path(&fx.path).unwrap();
    assert!(matches!(
        fresh.request(&Request::GetStatus).unwrap(),
        Response::Status(_)
    ));
}

#[test]
fn unknown_request_type_earns_an_error_response() {
    let fx = fixture();
    let mut client = IpcClient::connect_path(&fx.path).unwrap();
    core_ipc::write_frame(
        client.stream_mut(),
        &core_ipc::Frame::new(0x7777, vec![]),
    )
    .unwrap();
    match client.read_response().unwrap() {
        Response::Error(message) => assert!(message.contains("0x7777")),
        other => panic!("expected error response, got {other:?}"),
    }
}

#[test]
fn investigate_window_round_trips_the_fixed_reply() {
    let fx = fixture();
    let mut client = IpcClient::connect_path(&fx.path).unwrap();
    match client.request(&Request::InvestigateWindow(42)).unwrap() {
        Response::Investigate(reply) => {
            assert_eq!(reply.keymap_name, "window-42");
            assert_eq!(reply.matched_class_regex, "^Firefox$");
            assert!(!reply.is_default);
        }
        other => panic!("expected investigate reply, got {other:?}"),
    }
}

#[test]
fn investigate_mode_streams_key_events_to_the_subscriber() {
    let fx = fixture();
    let mut client = IpcClient::connect_path(&fx.path).unwrap();
    assert_eq!(
        client.request(&Request::EnableInvestigateMode).unwrap(),
        Response::Ok(None)
    );

    fx.backend.push_key_event("press   0x1E [] -> +0x0F");
    // Allow the forwarder thread to drain the channel.
    std::thread::sleep(Duration::from_millis(50));
    match client.read_response().unwrap() {
        Response::KeyEvent(line) => assert_eq!(line, "press   0x1E [] -> +0x0F"),
        other => panic!("expected key event, got {other:?}"),
    }

    assert_eq!(
        client.request(&Request::DisableInvestigateMode).unwrap(),
        Response::Ok(None)
    );
}
