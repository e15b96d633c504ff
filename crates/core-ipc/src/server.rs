//! The IPC message loop: a UNIX stream socket server dispatching framed
//! requests to a [`ControlBackend`].
//!
//! One thread per connection; requests are answered strictly in order.
//! Malformed framing closes the connection; an oversized payload earns an
//! error response and the connection continues. When investigate mode is on,
//! a forwarder thread interleaves `KeyEvent` notification frames with the
//! responses; both go through one mutex-guarded writer so frames never tear.

use crate::frame::{Frame, FrameError, read_frame, write_frame};
use crate::messages::{InvestigateReply, Request, Response};
use crate::payload::{ConfigPayload, KeymapsPayload, MetricsPayload, StatusPayload};
use crossbeam_channel::Receiver;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Engine operations the server dispatches to. String errors become
/// `Error` responses verbatim.
pub trait ControlBackend: Send + Sync + 'static {
    fn start(&self) -> Result<(), String>;
    fn stop(&self) -> Result<(), String>;
    /// Reload the named (or current, when `None`) configuration. The `Ok`
    /// message is echoed to the client.
    fn reload(&self, path: Option<&str>) -> Result<String, String>;
    fn switch_config(&self, path: &str) -> Result<(), String>;
    fn set_enabled(&self, enabled: bool) -> Result<(), String>;
    fn status(&self) -> StatusPayload;
    fn config(&self) -> ConfigPayload;
    fn keymaps(&self) -> KeymapsPayload;
    fn metrics(&self) -> MetricsPayload;
    fn investigate_window(&self, handle: u64) -> InvestigateReply;
    /// Returns the live key-event stream; `None` when already enabled.
    fn enable_investigate_mode(&self) -> Option<Receiver<String>>;
    fn disable_investigate_mode(&self);
}

/// Socket path convention: `/tmp/yamy-<name>-<uid>`.
pub fn socket_path(name: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/yamy-{name}-{}", current_uid()))
}

#[cfg(target_os = "linux")]
fn current_uid() -> u32 {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/proc/self")
        .map(|m| m.uid())
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn current_uid() -> u32 {
    std::env::var("UID")
        .ok()
        .and_then(|uid| uid.parse().ok())
        .unwrap_or(0)
}

pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
}

impl IpcServer {
    pub fn bind(name: &str) -> std::io::Result<Self> {
        Self::bind_path(socket_path(name))
    }

    pub fn bind_path(path: PathBuf) -> std::io::Result<Self> {
        // A previous instance may have left its socket file behind.
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        info!(target: "ipc.server", path = %path.display(), "listening");
        Ok(Self { listener, path })
    }

    pub fn local_path(&self) -> &Path {
        &self.path
    }

    /// Accept loop; one handler thread per connection. Runs until the
    /// process exits.
    pub fn serve(self, backend: Arc<dyn ControlBackend>) {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let backend = Arc::clone(&backend);
                    let spawned = std::thread::Builder::new()
                        .name("yamy-ipc-conn".into())
                        .spawn(move || handle_connection(stream, backend));
                    if let Err(e) = spawned {
                        warn!(target: "ipc.server", error = %e, "failed to spawn handler");
                    }
                }
                Err(e) => warn!(target: "ipc.server", error = %e, "accept failed"),
            }
        }
    }

    /// Bind-and-serve on a background thread; returns the bound path.
    pub fn spawn(self, backend: Arc<dyn ControlBackend>) -> PathBuf {
        let path = self.path.clone();
        std::thread::Builder::new()
            .name("yamy-ipc-accept".into())
            .spawn(move || self.serve(backend))
            .expect("spawn ipc accept thread");
        path
    }
}

fn handle_connection(stream: UnixStream, backend: Arc<dyn ControlBackend>) {
    let peer_writer = match stream.try_clone() {
        Ok(clone) => Arc::new(Mutex::new(clone)),
        Err(e) => {
            warn!(target: "ipc.server", error = %e, "failed to clone stream");
            return;
        }
    };
    let mut reader = stream;

    loop {
        let frame = match read_frame(&mut reader) {
            Ok(frame) => frame,
            Err(FrameError::Oversize(size)) => {
                debug!(target: "ipc.server", size, "oversized payload rejected");
                let response =
                    Response::Error(format!("payload of {size} bytes exceeds the 1 MiB limit"));
                if send(&peer_writer, &response.encode()).is_err() {
                    break;
                }
                continue;
            }
            Err(FrameError::Malformed(reason)) => {
                warn!(target: "ipc.server", reason = reason.as_str(), "malformed frame; closing");
                break;
            }
            Err(FrameError::Io(_)) => break,
        };

        let response = match Request::decode(&frame) {
            Ok(Request::EnableInvestigateMode) => {
                if let Some(events) = backend.enable_investigate_mode() {
                    spawn_key_event_forwarder(events, Arc::clone(&peer_writer));
                }
                Response::Ok(None)
            }
            Ok(request) => dispatch(&request, backend.as_ref()),
            Err(e) => Response::Error(e.to_string()),
        };
        if send(&peer_writer, &response.encode()).is_err() {
            break;
        }
    }
    backend.disable_investigate_mode();
}

fn dispatch(request: &Request, backend: &dyn ControlBackend) -> Response {
    debug!(target: "ipc.server", request = ?request, "dispatch");
    match request {
        Request::Start => match backend.start() {
            Ok(()) => Response::Ok(None),
            Err(message) => Response::Error(message),
        },
        Request::Stop => match backend.stop() {
            Ok(()) => Response::Ok(None),
            Err(message) => Response::Error(message),
        },
        Request::Reload(path) => match backend.reload(path.as_deref()) {
            Ok(message) => Response::Ok(Some(message)),
            Err(message) => Response::Error(message),
        },
        Request::SwitchConfig(path) => match backend.switch_config(path) {
            Ok(()) => Response::Ok(None),
            Err(message) => Response::Error(message),
        },
        Request::SetEnabled(enabled) => match backend.set_enabled(*enabled) {
            Ok(()) => Response::Ok(None),
            Err(message) => Response::Error(message),
        },
        Request::GetStatus => json_response(&backend.status(), Response::Status),
        Request::GetConfig => json_response(&backend.config(), Response::Config),
        Request::GetKeymaps => json_response(&backend.keymaps(), Response::Keymaps),
        Request::GetMetrics => json_response(&backend.metrics(), Response::Metrics),
        Request::InvestigateWindow(handle) => {
            Response::Investigate(backend.investigate_window(*handle))
        }
        Request::DisableInvestigateMode => {
            backend.disable_investigate_mode();
            Response::Ok(None)
        }
        // Handled before dispatch; kept for exhaustiveness.
        Request::EnableInvestigateMode => Response::Ok(None),
    }
}

fn json_response<T: serde::Serialize>(value: &T, wrap: fn(String) -> Response) -> Response {
    match serde_json::to_string(value) {
        Ok(json) => wrap(json),
        Err(e) => Response::Error(format!("serialization failed: {e}")),
    }
}

fn send(writer: &Arc<Mutex<UnixStream>>, frame: &Frame) -> std::io::Result<()> {
    let mut guard = writer.lock().expect("ipc writer poisoned");
    write_frame(&mut *guard, frame)
}

/// Pump investigate-mode key events to this connection until the stream dies
/// or the backend drops the sender.
fn spawn_key_event_forwarder(events: Receiver<String>, writer: Arc<Mutex<UnixStream>>) {
    let spawned = std::thread::Builder::new()
        .name("yamy-ipc-keyevents".into())
        .spawn(move || {
            while let Ok(line) = events.recv() {
                let frame = Response::KeyEvent(line).encode();
                if send(&writer, &frame).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!(target: "ipc.server", error = %e, "failed to spawn key-event forwarder");
    }
}
