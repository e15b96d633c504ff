//! Engine facade: lifecycle, configuration swaps, and thread wiring.
//!
//! Thread layout: the platform hook drives [`Shared::process_event`] (the hot
//! path); one worker thread consumes the command queue and serializes
//! `start/stop/set_enabled/switch_configuration`; one timer thread fires
//! tap/hold deadlines. The compiled config is swapped behind a `RwLock` whose
//! write section is two pointer stores, so a reload lands between two
//! keystrokes and in-flight events finish against the old snapshot.

use crate::metrics::{Metrics, MetricsSnapshot};
use crate::processor::{InvestigateInfo, ProcessResult, Processor};
use core_config::CompiledConfig;
use core_events::{KeyInput, NotificationBus, NotificationKind};
use core_keymap::Keymap;
use core_platform::{HookError, InputHook, InputInjector, WindowContext, WindowHandle, WindowSystem};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, select, tick, unbounded};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

const METRICS_PUBLISH_PERIOD: Duration = Duration::from_secs(5);

// -------------------------------------------------------------------------------------------------
// Lifecycle
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Loading,
    Running,
    Error,
}

impl EngineState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Loading => "loading",
            Self::Running => "running",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid lifecycle transition from '{0}'")]
    InvalidTransition(&'static str),
    #[error("{0}")]
    Config(String),
    #[error("platform failure: {0}")]
    Platform(String),
    #[error("engine command channel closed")]
    ChannelClosed,
}

/// Plain status snapshot served to IPC and in-process callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: EngineState,
    pub running: bool,
    pub enabled: bool,
    pub config_path: String,
    pub config_name: String,
    pub uptime_secs: u64,
    pub key_count: u64,
    pub current_keymap: String,
}

impl StatusSnapshot {
    /// The two-valued state string used in the status JSON.
    pub fn state_str(&self) -> &'static str {
        if self.running { "running" } else { "stopped" }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeymapSummary {
    pub name: String,
    pub window_class: Option<String>,
    pub window_title: Option<String>,
}

/// Counts served by `GetConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigInfo {
    pub path: String,
    pub version: String,
    pub keys: usize,
    pub virtual_modifiers: usize,
    pub mappings: usize,
    pub keymaps: usize,
}

// -------------------------------------------------------------------------------------------------
// Shared state
// -------------------------------------------------------------------------------------------------

struct Lifecycle {
    state: EngineState,
    started_at: Option<Instant>,
    config_path: Option<PathBuf>,
}

struct Shared {
    bus: Arc<NotificationBus>,
    hook: Arc<dyn InputHook>,
    injector: Arc<dyn InputInjector>,
    window_system: Arc<dyn WindowSystem>,
    processor: Mutex<Processor>,
    config: RwLock<Arc<CompiledConfig>>,
    lifecycle: Mutex<Lifecycle>,
    metrics: Metrics,
    investigate: Mutex<Option<Sender<String>>>,
    cancel_compile: AtomicBool,
    error_gate: Mutex<Option<Instant>>,
    timer_tx: Sender<TimerMsg>,
}

impl Shared {
    /// Poisoning must not take the keyboard down with it; recover the guard
    /// and keep degrading to passthrough.
    fn processor_lock(&self) -> MutexGuard<'_, Processor> {
        self.processor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> EngineState {
        self.lifecycle.lock().expect("lifecycle poisoned").state
    }

    fn set_state(&self, state: EngineState) {
        self.lifecycle.lock().expect("lifecycle poisoned").state = state;
    }

    /// The hot path. Never propagates a panic to the hook; any internal
    /// failure passes the event through and raises a rate-limited
    /// `EngineError`.
    fn process_event(self: &Arc<Self>, input: KeyInput) -> bool {
        let t0 = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut proc = self.processor_lock();
            let result = proc.process(input);
            (result, proc.next_deadline())
        }));
        match outcome {
            Ok((result, deadline)) => {
                for out in &result.outputs {
                    self.injector.inject(out.scan, out.press);
                }
                if let Some(mask) = result.modifier_changed {
                    self.bus
                        .publish(NotificationKind::ModifierChanged, &mask.to_string());
                }
                if let Some(deadline) = deadline {
                    let _ = self.timer_tx.send(TimerMsg::Schedule(deadline));
                }
                self.forward_investigate_line(&input, &result);
                self.metrics.record(t0.elapsed());
                result.suppress
            }
            Err(_) => {
                self.raise_engine_error("internal error in hot path; event passed through");
                false
            }
        }
    }

    /// One `EngineError` notification per second at most.
    fn raise_engine_error(&self, message: &str) {
        let mut gate = self.error_gate.lock().expect("error gate poisoned");
        let now = Instant::now();
        let due = gate
            .map(|last| now.duration_since(last) >= Duration::from_secs(1))
            .unwrap_or(true);
        if due {
            *gate = Some(now);
            error!(target: "engine.lifecycle", error = message, "engine_error");
            self.bus.publish(NotificationKind::EngineError, message);
        }
    }

    fn forward_investigate_line(&self, input: &KeyInput, result: &ProcessResult) {
        let sender = {
            let guard = self.investigate.lock().expect("investigate poisoned");
            guard.clone()
        };
        let Some(sender) = sender else {
            return;
        };
        let direction = if input.press { "press  " } else { "release" };
        let outcome = if result.outputs.is_empty() {
            if result.suppress {
                "suppressed".to_string()
            } else {
                "pass".to_string()
            }
        } else {
            result
                .outputs
                .iter()
                .map(|o| {
                    if o.press {
                        format!("+{}", o.scan)
                    } else {
                        format!("-{}", o.scan)
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        };
        let mods = {
            let proc = self.processor_lock();
            proc.modifier_snapshot().to_string()
        };
        let line = format!("{direction} {} [{mods}] -> {outcome}", input.scan);
        if sender.send(line).is_err() {
            // Client went away; drop the sink.
            *self.investigate.lock().expect("investigate poisoned") = None;
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Commands
// -------------------------------------------------------------------------------------------------

enum Command {
    Start(Sender<Result<(), EngineError>>),
    Stop(Sender<()>),
    SetEnabled(bool, Sender<()>),
    Switch(Option<PathBuf>, Sender<Result<(), EngineError>>),
    Shutdown,
}

enum TimerMsg {
    Schedule(Instant),
    Shutdown,
}

// -------------------------------------------------------------------------------------------------
// Engine
// -------------------------------------------------------------------------------------------------

pub struct Engine {
    shared: Arc<Shared>,
    cmd_tx: Sender<Command>,
    worker: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl Engine {
    pub fn new(
        bus: Arc<NotificationBus>,
        hook: Arc<dyn InputHook>,
        injector: Arc<dyn InputInjector>,
        window_system: Arc<dyn WindowSystem>,
        config_path: Option<PathBuf>,
    ) -> Self {
        let (timer_tx, timer_rx) = unbounded();
        let initial = Arc::new(CompiledConfig::empty());
        let shared = Arc::new(Shared {
            bus,
            hook,
            injector,
            window_system,
            processor: Mutex::new(Processor::new(Arc::clone(&initial))),
            config: RwLock::new(initial),
            lifecycle: Mutex::new(Lifecycle {
                state: EngineState::Stopped,
                started_at: None,
                config_path,
            }),
            metrics: Metrics::new(),
            investigate: Mutex::new(None),
            cancel_compile: AtomicBool::new(false),
            error_gate: Mutex::new(None),
            timer_tx,
        });

        let (cmd_tx, cmd_rx) = unbounded();
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("yamy-lifecycle".into())
            .spawn(move || worker_loop(worker_shared, cmd_rx))
            .expect("spawn lifecycle thread");
        let timer_shared = Arc::clone(&shared);
        let timer = std::thread::Builder::new()
            .name("yamy-taphold-timer".into())
            .spawn(move || timer_loop(timer_shared, timer_rx))
            .expect("spawn timer thread");

        Self {
            shared,
            cmd_tx,
            worker: Some(worker),
            timer: Some(timer),
        }
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            shared: Arc::clone(&self.shared),
            cmd_tx: self.cmd_tx.clone(),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        let _ = self.shared.timer_tx.send(TimerMsg::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        if let Some(timer) = self.timer.take() {
            let _ = timer.join();
        }
    }
}

/// Clonable entry point for IPC and in-process callers. Lifecycle mutations
/// go through the command queue; reads are served directly from shared
/// state.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
    cmd_tx: Sender<Command>,
}

impl EngineHandle {
    pub fn start(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.cmd_tx
            .send(Command::Start(reply_tx))
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.recv().map_err(|_| EngineError::ChannelClosed)?
    }

    pub fn stop(&self) -> Result<(), EngineError> {
        // A stop request also cancels any compile in flight.
        self.shared.cancel_compile.store(true, Ordering::Relaxed);
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.cmd_tx
            .send(Command::Stop(reply_tx))
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.recv().map_err(|_| EngineError::ChannelClosed)
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.cmd_tx
            .send(Command::SetEnabled(enabled, reply_tx))
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.recv().map_err(|_| EngineError::ChannelClosed)
    }

    /// Compile `path` (or the current path when `None`) and swap atomically.
    /// On failure the previous configuration stays active.
    pub fn switch_configuration(&self, path: Option<PathBuf>) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.cmd_tx
            .send(Command::Switch(path, reply_tx))
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.recv().map_err(|_| EngineError::ChannelClosed)?
    }

    pub fn status(&self) -> StatusSnapshot {
        let (state, started_at) = {
            let lifecycle = self.shared.lifecycle.lock().expect("lifecycle poisoned");
            (lifecycle.state, lifecycle.started_at)
        };
        let (config_path, config_name) = {
            let config = self.shared.config.read().expect("config lock poisoned");
            (
                config.source_path.to_string_lossy().into_owned(),
                config.name.clone(),
            )
        };
        let (enabled, current_keymap) = {
            let proc = self.shared.processor_lock();
            (proc.is_enabled(), proc.current_keymap_name())
        };
        StatusSnapshot {
            state,
            running: state == EngineState::Running,
            enabled,
            config_path,
            config_name,
            uptime_secs: started_at.map(|t| t.elapsed().as_secs()).unwrap_or(0),
            key_count: self.shared.metrics.key_count(),
            current_keymap,
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn keymaps(&self) -> Vec<KeymapSummary> {
        let config = self.shared.config.read().expect("config lock poisoned");
        config.keymaps.iter().map(|m| summarize(m)).collect()
    }

    pub fn config_info(&self) -> ConfigInfo {
        let config = self.shared.config.read().expect("config lock poisoned");
        ConfigInfo {
            path: config.source_path.to_string_lossy().into_owned(),
            version: core_config::CONFIG_VERSION.to_string(),
            keys: config.key_count(),
            virtual_modifiers: config.virtual_modifier_count,
            mappings: config.mapping_count,
            keymaps: config.keymaps.len(),
        }
    }

    /// Resolve the keymap context for a window handle (0 = foreground).
    pub fn investigate_window(&self, handle: WindowHandle) -> InvestigateInfo {
        let context = if handle == 0 {
            self.shared.window_system.foreground()
        } else {
            WindowContext::new(
                self.shared
                    .window_system
                    .window_class(handle)
                    .unwrap_or_default(),
                self.shared
                    .window_system
                    .window_text(handle)
                    .unwrap_or_default(),
            )
        };
        let proc = self.shared.processor_lock();
        proc.investigate(&context.class, &context.title)
    }

    /// Enable returns the live key-event stream; disable drops the sink.
    pub fn set_investigate_mode(&self, enabled: bool) -> Option<Receiver<String>> {
        let mut guard = self.shared.investigate.lock().expect("investigate poisoned");
        if enabled {
            let (tx, rx) = unbounded();
            *guard = Some(tx);
            Some(rx)
        } else {
            *guard = None;
            None
        }
    }

    /// Foreground-window change from the platform integration.
    pub fn notify_focus(&self, class: &str, title: &str) {
        let (previous, current) = {
            let mut proc = self.shared.processor_lock();
            let previous = proc.current_keymap_name();
            proc.set_foreground(WindowContext::new(class, title));
            (previous, proc.current_keymap_name())
        };
        self.shared.bus.publish(
            NotificationKind::FocusChanged,
            &serde_json::json!({ "class": class, "title": title }).to_string(),
        );
        if previous != current {
            self.shared
                .bus
                .publish(NotificationKind::KeymapSwitched, &current);
        }
    }
}

fn summarize(map: &Arc<Keymap>) -> KeymapSummary {
    KeymapSummary {
        name: map.name().to_string(),
        window_class: map.class_regex_source().map(str::to_string),
        window_title: map.title_regex_source().map(str::to_string),
    }
}

// -------------------------------------------------------------------------------------------------
// Worker thread
// -------------------------------------------------------------------------------------------------

fn worker_loop(shared: Arc<Shared>, cmd_rx: Receiver<Command>) {
    let metrics_tick = tick(METRICS_PUBLISH_PERIOD);
    loop {
        select! {
            recv(cmd_rx) -> msg => match msg {
                Ok(Command::Start(reply)) => {
                    let _ = reply.send(do_start(&shared));
                }
                Ok(Command::Stop(reply)) => {
                    do_stop(&shared);
                    let _ = reply.send(());
                }
                Ok(Command::SetEnabled(enabled, reply)) => {
                    do_set_enabled(&shared, enabled);
                    let _ = reply.send(());
                }
                Ok(Command::Switch(path, reply)) => {
                    let _ = reply.send(do_switch(&shared, path));
                }
                Ok(Command::Shutdown) | Err(_) => break,
            },
            recv(metrics_tick) -> _ => publish_metrics(&shared),
        }
    }
}

fn do_start(shared: &Arc<Shared>) -> Result<(), EngineError> {
    let state = shared.state();
    if state != EngineState::Stopped {
        return Err(EngineError::InvalidTransition(state.as_str()));
    }
    shared.set_state(EngineState::Loading);
    shared.bus.publish(NotificationKind::EngineStarting, "");
    info!(target: "engine.lifecycle", "starting");

    // Compile the pending configuration; a start without one runs with the
    // last-known-good (or empty) snapshot.
    let pending = shared
        .lifecycle
        .lock()
        .expect("lifecycle poisoned")
        .config_path
        .clone();
    if let Some(path) = pending {
        shared.cancel_compile.store(false, Ordering::Relaxed);
        shared.bus.publish(
            NotificationKind::ConfigLoading,
            &path.to_string_lossy(),
        );
        match core_config::load_file_with_cancel(&path, Some(&shared.cancel_compile)) {
            Ok(compiled) => {
                let compiled = Arc::new(compiled);
                install_config(shared, Arc::clone(&compiled));
                shared
                    .bus
                    .publish(NotificationKind::ConfigLoaded, &compiled.name);
            }
            Err(failure) => {
                let message = failure.summary();
                shared.set_state(EngineState::Error);
                shared.bus.publish(NotificationKind::ConfigError, &message);
                shared.bus.publish(NotificationKind::EngineError, &message);
                return Err(EngineError::Config(message));
            }
        }
    }

    // Seed the resolver with the real foreground window.
    let foreground = shared.window_system.foreground();
    shared.processor_lock().set_foreground(foreground);

    let callback_shared = Arc::clone(shared);
    let callback: core_platform::HookCallback =
        Arc::new(move |input| callback_shared.process_event(input));
    let installed = match shared.hook.install(Arc::clone(&callback)) {
        Ok(()) => Ok(()),
        Err(HookError::Transient(msg)) => {
            warn!(target: "engine.lifecycle", msg = msg.as_str(), "hook install retry");
            shared.hook.install(callback)
        }
        Err(fatal) => Err(fatal),
    };
    if let Err(e) = installed {
        let message = e.to_string();
        shared.set_state(EngineState::Error);
        shared.bus.publish(NotificationKind::EngineError, &message);
        return Err(EngineError::Platform(message));
    }

    {
        let mut lifecycle = shared.lifecycle.lock().expect("lifecycle poisoned");
        lifecycle.state = EngineState::Running;
        lifecycle.started_at = Some(Instant::now());
    }
    shared.bus.publish(NotificationKind::EngineStarted, "");
    info!(target: "engine.lifecycle", "running");
    Ok(())
}

fn do_stop(shared: &Arc<Shared>) {
    if shared.state() == EngineState::Stopped {
        return;
    }
    shared.bus.publish(NotificationKind::EngineStopping, "");
    shared.hook.uninstall();

    // No stuck keys: everything the engine holds down gets its release
    // before processing stops.
    let releases = shared.processor_lock().release_everything();
    for out in releases {
        shared.injector.inject(out.scan, out.press);
    }

    {
        let mut lifecycle = shared.lifecycle.lock().expect("lifecycle poisoned");
        lifecycle.state = EngineState::Stopped;
        lifecycle.started_at = None;
    }
    shared.bus.publish(NotificationKind::EngineStopped, "");
    info!(target: "engine.lifecycle", "stopped");
}

fn do_set_enabled(shared: &Arc<Shared>, enabled: bool) {
    let releases = shared.processor_lock().set_enabled(enabled);
    for out in releases {
        shared.injector.inject(out.scan, out.press);
    }
    info!(target: "engine.lifecycle", enabled, "set_enabled");
}

fn do_switch(shared: &Arc<Shared>, path: Option<PathBuf>) -> Result<(), EngineError> {
    let previous_state = shared.state();
    let path = {
        let lifecycle = shared.lifecycle.lock().expect("lifecycle poisoned");
        path.or_else(|| lifecycle.config_path.clone())
    };
    let Some(path) = path else {
        let message = "no configuration path to load".to_string();
        shared.bus.publish(NotificationKind::ConfigError, &message);
        return Err(EngineError::Config(message));
    };

    if previous_state == EngineState::Running {
        shared.set_state(EngineState::Loading);
    }
    shared.cancel_compile.store(false, Ordering::Relaxed);
    shared.bus.publish(
        NotificationKind::ConfigLoading,
        &path.to_string_lossy(),
    );
    shared.bus.publish(
        NotificationKind::ConfigValidating,
        &path.to_string_lossy(),
    );

    match core_config::load_file_with_cancel(&path, Some(&shared.cancel_compile)) {
        Ok(compiled) => {
            let compiled = Arc::new(compiled);
            install_config(shared, Arc::clone(&compiled));
            {
                let mut lifecycle = shared.lifecycle.lock().expect("lifecycle poisoned");
                lifecycle.config_path = Some(path);
                if previous_state == EngineState::Running {
                    lifecycle.state = EngineState::Running;
                }
            }
            shared
                .bus
                .publish(NotificationKind::ConfigLoaded, &compiled.name);
            info!(
                target: "engine.lifecycle",
                config = compiled.name.as_str(),
                "configuration switched"
            );
            Ok(())
        }
        Err(failure) => {
            // Previous configuration stays active.
            if previous_state == EngineState::Running {
                shared.set_state(EngineState::Running);
            }
            let message = failure.summary();
            warn!(target: "engine.lifecycle", error = message.as_str(), "switch failed");
            shared.bus.publish(NotificationKind::ConfigError, &message);
            Err(EngineError::Config(message))
        }
    }
}

/// The swap itself: a write-lock over two pointer stores plus the processor
/// rebuild under its own lock. Runs between two hook callbacks, so no event
/// observes a half-applied configuration.
fn install_config(shared: &Arc<Shared>, compiled: Arc<CompiledConfig>) {
    {
        let mut slot = shared.config.write().expect("config lock poisoned");
        *slot = Arc::clone(&compiled);
    }
    shared.processor_lock().rebuild(compiled);
}

fn publish_metrics(shared: &Arc<Shared>) {
    if shared.state() != EngineState::Running {
        return;
    }
    let snap = shared.metrics.snapshot();
    let latency = serde_json::json!({
        "latency_avg_ns": snap.latency_avg_ns,
        "latency_p99_ns": snap.latency_p99_ns,
        "latency_max_ns": snap.latency_max_ns,
    });
    shared
        .bus
        .publish(NotificationKind::LatencyReport, &latency.to_string());
    let cpu = serde_json::json!({
        "cpu_usage_percent": snap.cpu_usage_percent,
        "keys_per_second": snap.keys_per_second,
    });
    shared
        .bus
        .publish(NotificationKind::CpuUsageReport, &cpu.to_string());
}

// -------------------------------------------------------------------------------------------------
// Timer thread
// -------------------------------------------------------------------------------------------------

fn timer_loop(shared: Arc<Shared>, rx: Receiver<TimerMsg>) {
    let mut deadline: Option<Instant> = None;
    loop {
        let msg = match deadline {
            Some(due) => match rx.recv_deadline(due) {
                Ok(msg) => msg,
                Err(RecvTimeoutError::Timeout) => {
                    let changed = {
                        let mut proc = shared.processor_lock();
                        let changed = proc.fire_deadlines(Instant::now());
                        deadline = proc.next_deadline();
                        changed
                    };
                    if let Some(mask) = changed {
                        shared
                            .bus
                            .publish(NotificationKind::ModifierChanged, &mask.to_string());
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(msg) => msg,
                Err(_) => break,
            },
        };
        match msg {
            TimerMsg::Schedule(due) => {
                deadline = Some(deadline.map_or(due, |current| current.min(due)));
            }
            TimerMsg::Shutdown => break,
        }
    }
}
