//! yamy daemon entrypoint.
//!
//! Composition order: logging, panic hook, session restore, engine over the
//! platform backends, then the IPC server on the main thread. Lifecycle
//! notifications drive session persistence so a crash or restart resumes
//! where the user left off.

mod control;

use anyhow::{Context, Result};
use clap::Parser;
use control::DaemonControl;
use core_engine::{Engine, EngineHandle};
use core_events::{NotificationBus, NotificationKind};
use core_ipc::IpcServer;
use core_platform::{NullHook, NullInjector, NullWindowSystem};
use core_session::{SessionManager, SessionState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "yamy", version, about = "User-space keyboard remapping daemon")]
struct Args {
    /// Configuration file to load at startup (overrides the saved session).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Control socket name; the socket lands at /tmp/yamy-<name>-<uid>.
    #[arg(long = "name", default_value = "engine")]
    name: String,
    /// Directory receiving yamy.log.
    #[arg(long = "log-dir", default_value = ".")]
    log_dir: PathBuf,
    /// Skip session restore and persistence.
    #[arg(long = "no-session")]
    no_session: bool,
    /// Build the engine but do not start it until told over IPC.
    #[arg(long = "stopped")]
    stopped: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging(&args.log_dir)?;
    install_panic_hook();
    info!(target: "runtime", "startup");

    let bus = Arc::new(NotificationBus::new());
    let session = (!args.no_session).then(|| Arc::new(SessionManager::default()));

    // CLI config wins over the restored session.
    let mut config_path = args.config.clone();
    let mut was_running = args.config.is_some();
    if let Some(manager) = &session {
        match manager.load() {
            Ok(Some(state)) => {
                if config_path.is_none() && !state.active_config_path.is_empty() {
                    config_path = Some(expand_tilde(&state.active_config_path));
                }
                if args.config.is_none() {
                    was_running = state.engine_was_running;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(target: "runtime", error = %e, "ignoring saved session"),
        }
    }

    let engine = Engine::new(
        bus.clone(),
        Arc::new(NullHook),
        Arc::new(NullInjector),
        Arc::new(NullWindowSystem),
        config_path.clone(),
    );
    let handle = engine.handle();

    if let Some(manager) = &session {
        persist_on_lifecycle_changes(&bus, manager.clone(), handle.clone());
    }

    if config_path.is_some() && was_running && !args.stopped {
        if let Err(e) = handle.start() {
            // The daemon stays up so the problem can be fixed over IPC.
            error!(target: "runtime", error = %e, "initial start failed");
        }
    }

    let server = IpcServer::bind(&args.name)
        .with_context(|| format!("failed to bind control socket '{}'", args.name))?;
    let config_display = config_path.as_ref().map(|p| p.display().to_string());
    info!(
        target: "runtime",
        socket = %server.local_path().display(),
        config = config_display.as_deref(),
        "daemon ready"
    );
    server.serve(Arc::new(DaemonControl::new(handle)));
    Ok(())
}

fn configure_logging(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::never(log_dir, "yamy.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_env("YAMY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!(target: "runtime", info = %panic_info, "panic");
        default_hook(panic_info);
    }));
}

/// Save the session whenever the engine starts, stops, or swaps configs.
fn persist_on_lifecycle_changes(
    bus: &NotificationBus,
    manager: Arc<SessionManager>,
    handle: EngineHandle,
) {
    bus.subscribe(
        [
            NotificationKind::EngineStarted,
            NotificationKind::EngineStopped,
            NotificationKind::ConfigLoaded,
        ],
        move |_, _| {
            let status = handle.status();
            let state = SessionState::new(status.config_path.clone(), status.running);
            if let Err(e) = manager.save(&state) {
                warn!(target: "session", error = %e, "session save failed");
            }
        },
    );
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}
