use thiserror::Error;

/// C9 cannot open the browser; per §7 the debugger keeps running and CDP
/// events are still produced if a front-end attaches manually.
#[derive(Debug, Error)]
pub enum BrowserLaunchError {
    #[error("failed to probe remote-debugging endpoint: {0}")]
    Probe(String),

    #[error("failed to spawn browser process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("remote-debugging endpoint did not become reachable within the probe window")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum DevtoolsServerError {
    #[error("websocket transport error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
