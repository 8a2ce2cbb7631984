use std::time::Duration;

use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

use crate::discovery::{find_matching_tab, list_targets, poll_until_ready};
use crate::error::BrowserLaunchError;

/// The platform browser is an opaque collaborator (spec §1 "out of scope"):
/// this crate only ever needs to start it with a remote-debugging port and
/// never inspects or owns its lifecycle beyond the initial spawn. Hosts
/// supply their own launcher (a system Chrome binary, a bundled one, a
/// test double).
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self, remote_debugger_port: u16) -> Result<(), BrowserLaunchError>;
}

/// Invokes `std::process::Command` directly on non-Darwin platforms, as the
/// spec's step 3 prescribes — on Darwin the caller is expected to supply a
/// launcher that opens the platform browser transparently instead.
pub struct CommandBrowserLauncher {
    pub binary: String,
}

impl BrowserLauncher for CommandBrowserLauncher {
    fn launch(&self, remote_debugger_port: u16) -> Result<(), BrowserLaunchError> {
        std::process::Command::new(&self.binary)
            .arg(format!("--remote-debugging-port={remote_debugger_port}"))
            .spawn()?;
        Ok(())
    }
}

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs §4.9 steps 1-4: build the inspector URL, close a stale tab if one
/// is already open on it, launch the browser (unless `dev_mode`
/// suppresses it), then poll until reachable and navigate the first tab
/// there.
pub async fn open_inspector(
    devtools_port: u16,
    remote_debugger_port: u16,
    dev_mode: bool,
    launcher: &dyn BrowserLauncher,
) -> Result<(), BrowserLaunchError> {
    let target_url = format!("devtools://devtools/bundled/inspector.html?ws=localhost:{devtools_port}");

    if let Ok(existing) = list_targets(remote_debugger_port).await
        && let Some(tab) = find_matching_tab(&existing, &target_url)
    {
        let _ = close_tab(&tab.web_socket_debugger_url).await;
    }

    if dev_mode {
        return Ok(());
    }

    launcher.launch(remote_debugger_port)?;

    let targets = poll_until_ready(remote_debugger_port, PROBE_TIMEOUT).await?;
    let Some(first) = targets.first() else {
        return Err(BrowserLaunchError::Probe("no tabs reported by /json".into()));
    };
    navigate_tab(&first.web_socket_debugger_url, &target_url).await
}

async fn close_tab(ws_url: &str) -> Result<(), BrowserLaunchError> {
    send_cdp_command(ws_url, "Page.close", serde_json::json!({})).await
}

async fn navigate_tab(ws_url: &str, url: &str) -> Result<(), BrowserLaunchError> {
    send_cdp_command(ws_url, "Page.navigate", serde_json::json!({ "url": url })).await
}

async fn send_cdp_command(ws_url: &str, method: &str, params: serde_json::Value) -> Result<(), BrowserLaunchError> {
    let (mut ws, _) = tokio_tungstenite::connect_async(ws_url)
        .await
        .map_err(|e| BrowserLaunchError::Probe(e.to_string()))?;
    let command = serde_json::json!({ "id": 1, "method": method, "params": params });
    if let Err(e) = ws.send(Message::text(command.to_string())).await {
        warn!(error = %e, method, "failed to deliver CDP command to tab");
    }
    let _ = ws.close(None).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct RecordingLauncher {
        called: AtomicBool,
    }

    impl BrowserLauncher for RecordingLauncher {
        fn launch(&self, _remote_debugger_port: u16) -> Result<(), BrowserLaunchError> {
            self.called.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn dev_mode_suppresses_launch() {
        let launcher = RecordingLauncher { called: AtomicBool::new(false) };
        let result = open_inspector(5270, 65000, true, &launcher).await;
        assert!(result.is_ok());
        assert!(!launcher.called.load(Ordering::SeqCst));
    }
}
