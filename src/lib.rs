//! Host-facing API: installs the HTTP/fetch interceptors (C4/C5) and wires
//! captured records through the IPC channel (C7) to a debugger process
//! managed by the supervisor (C8). This is the library surface an
//! application embeds; the debugger process itself is the `request-center`
//! binary (`src/main.rs`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use request_center_capture::{ChannelSink, RecordSink};
use request_center_core::config::Config;
use request_center_core::record::RequestRecord;
use request_center_ipc::{IpcConnection, IpcMessage};
use request_center_supervisor::{Role, SupervisorError, acquire_or_connect, lock_file_path, socket_file_path};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How long the owning process waits for the freshly forked debugger to
/// open its IPC socket before giving up and reporting a
/// [`SupervisorError`].
const SPAWN_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Live handle returned by [`install`]. Dropping it does not stop the
/// forwarding task; call [`HostHandle::uninstall`] for a clean shutdown
/// (§4.8 "shutdown on host exit").
pub struct HostHandle {
    sink: Arc<dyn RecordSink>,
    forwarder: JoinHandle<()>,
    _lock: Option<request_center_supervisor::LockFile>,
}

impl HostHandle {
    /// The sink capture wires into `InterceptedClient`/`fetch` calls.
    pub fn sink(&self) -> Arc<dyn RecordSink> {
        self.sink.clone()
    }

    /// Uninstalls the interceptors and lets the forwarder flush and close
    /// (§4.8 final flush + lock release).
    pub async fn uninstall(self) {
        request_center_capture::uninstall();
        request_center_capture::uninstall_fetch();
        drop(self.sink);
        if let Err(e) = self.forwarder.await {
            warn!(error = %e, "ipc forwarder task panicked");
        }
    }
}

/// Installs the capture layer and connects it (forking a debugger process
/// if none exists yet) per §4.4/§4.5/§4.8. On [`SupervisorError`] the
/// caller is expected to keep running uninstrumented (§7 policy) —
/// `install` does not panic or abort the host.
pub async fn install(config: Config) -> Result<HostHandle, SupervisorError> {
    request_center_capture::install();
    request_center_capture::install_fetch();

    let base_dir = base_dir();
    std::fs::create_dir_all(&base_dir).map_err(SupervisorError::Lock)?;
    let lock_path = lock_file_path(&base_dir);
    let socket_path = socket_file_path(&base_dir);

    let (role, _state) = acquire_or_connect(&lock_path, &socket_path, config.server_port, Duration::from_millis(500)).await?;

    if let Role::Owner(_) = &role {
        spawn_debugger_process(&config).map_err(SupervisorError::Spawn)?;
    }

    // Every connection — whether we forked the debugger or are joining one
    // already running — gets its own `ready` handshake on accept.
    let conn = wait_for_ready(&socket_path, SPAWN_READY_TIMEOUT).await?;

    let lock_file = match role {
        Role::Owner(lock) => Some(lock),
        Role::Client => None,
    };

    let (tx, rx) = request_center_core::queue::drop_oldest_channel(1024);
    let sink: Arc<dyn RecordSink> = Arc::new(ChannelSink::new(tx));
    let forwarder = tokio::spawn(request_center_ipc::forward_records(rx, conn));

    Ok(HostHandle {
        sink,
        forwarder,
        _lock: lock_file,
    })
}

async fn wait_for_ready(socket_path: &std::path::Path, timeout: Duration) -> Result<IpcConnection, SupervisorError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match try_connect_and_await_ready(socket_path).await {
            Ok(conn) => return Ok(conn),
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(_) => return Err(SupervisorError::Busy),
        }
    }
}

/// Connects, then blocks on the debugger's `ready` handshake (§4.8 "wait
/// for a ready message on IPC; transition to connected").
async fn try_connect_and_await_ready(socket_path: &std::path::Path) -> Result<IpcConnection, ()> {
    let mut conn = IpcConnection::connect(socket_path).await.map_err(|_| ())?;
    match conn.recv().await {
        Ok(Some(request_center_ipc::IpcMessage::Ready)) => Ok(conn),
        _ => Err(()),
    }
}

fn spawn_debugger_process(config: &Config) -> std::io::Result<std::process::Child> {
    let exe = std::env::current_exe()?;
    std::process::Command::new(exe)
        .arg("--port")
        .arg(config.port.to_string())
        .arg("--server-port")
        .arg(config.server_port.to_string())
        .arg("--remote-debugger-port")
        .arg(config.remote_debugger_port.to_string())
        .args(if config.dev_mode { vec!["--dev-mode"] } else { vec![] })
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
}

fn base_dir() -> PathBuf {
    std::env::temp_dir().join("request-center")
}
