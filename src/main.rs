//! The debugger process (C8's forked child): accepts IPC connections from
//! host processes, projects each finished record into CDP frames (C10),
//! and serves them to an attached browser front-end over a WebSocket
//! (C9). Spawned detached by `request_center::install` — not meant to be
//! run by hand, though nothing prevents it.

use std::sync::Arc;

use clap::Parser;
use request_center_devtools::{CommandBrowserLauncher, DevtoolsServer, Projector, open_inspector};
use request_center_ipc::{IpcListener, IpcMessage};
use request_center_supervisor::{lock_file_path, socket_file_path};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "request-center", about = "CDP network debugger process", version)]
struct Cli {
    /// Debugger ↔ browser WebSocket port.
    #[arg(long, default_value_t = 5270)]
    port: u16,

    /// Host ↔ debugger IPC identifier (the Unix socket lives under a
    /// well-known temp directory regardless of this value; see §6).
    #[arg(long, default_value_t = 5271)]
    server_port: u16,

    /// Chromium remote-debugging port.
    #[arg(long, default_value_t = 9333)]
    remote_debugger_port: u16,

    /// Suppress automatic browser launch.
    #[arg(long)]
    dev_mode: bool,
}

fn base_dir() -> std::path::PathBuf {
    std::env::temp_dir().join("request-center")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let base_dir = base_dir();
    std::fs::create_dir_all(&base_dir)?;

    let socket_path = socket_file_path(&base_dir);
    let _lock_path = lock_file_path(&base_dir); // owned by the host process, not us

    let listener = IpcListener::bind(&socket_path)?;
    let devtools = Arc::new(DevtoolsServer::bind(cli.port).await?);
    let projector = Arc::new(Projector::new());

    tracing::info!(port = cli.port, server_port = cli.server_port, "request-center debugger ready");

    let launcher = CommandBrowserLauncher {
        binary: std::env::var("REQUEST_CENTER_BROWSER").unwrap_or_else(|_| "google-chrome".to_string()),
    };
    if let Err(e) = open_inspector(cli.port, cli.remote_debugger_port, cli.dev_mode, &launcher).await {
        tracing::warn!(error = %e, "browser launch failed, debugger keeps running");
    }

    loop {
        let mut conn = listener.accept().await?;
        let devtools = devtools.clone();
        let projector = projector.clone();

        tokio::spawn(async move {
            if conn.send(&IpcMessage::Ready).await.is_err() {
                return;
            }
            loop {
                match conn.recv().await {
                    Ok(Some(IpcMessage::RequestEnd { record })) => {
                        let frames = projector.project(&record);
                        devtools.send_record_frames(&frames).await;
                    }
                    Ok(Some(IpcMessage::Shutdown)) | Ok(None) => break,
                    Ok(Some(IpcMessage::Ready)) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "ipc connection error, closing");
                        break;
                    }
                }
            }
        });
    }
}
