use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::error::DevtoolsServerError;
use crate::projector::CdpFrame;

type Sink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// The live front-end sink tagged with the generation it was accepted at,
/// so a closing connection's cleanup can tell whether it's still the one
/// stored in `current` or has since been replaced by a reconnect.
struct Current {
    generation: u64,
    sink: Sink,
}

/// Opens a WebSocket endpoint speaking CDP to the browser front-end (§4.9).
/// Only one front-end is addressed at a time: a new connection replaces
/// whatever socket was stored, matching the spec's explicit "subsequent
/// connections replace it" rule rather than fanning frames out to many.
pub struct DevtoolsServer {
    current: Arc<RwLock<Option<Current>>>,
    accept_task: Option<JoinHandle<()>>,
    local_port: u16,
}

impl DevtoolsServer {
    /// Binds `port` and starts accepting connections in the background.
    /// Inbound CDP messages are read and discarded — the core listener set
    /// is intentionally empty per §4.9.
    pub async fn bind(port: u16) -> Result<Self, DevtoolsServerError> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let local_port = listener.local_addr()?.port();
        let current: Arc<RwLock<Option<Current>>> = Arc::new(RwLock::new(None));
        let next_generation = Arc::new(AtomicU64::new(0));

        let accept_current = current.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let (stream, addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "devtools listener accept failed");
                        break;
                    }
                };
                let ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(e) => {
                        warn!(error = %e, "websocket handshake failed");
                        continue;
                    }
                };
                info!(%addr, "devtools front-end connected");
                let (sink, mut stream) = ws.split();
                let generation = next_generation.fetch_add(1, Ordering::SeqCst) + 1;
                *accept_current.write().await = Some(Current { generation, sink });

                let replaced_current = accept_current.clone();
                tokio::spawn(async move {
                    while let Some(msg) = stream.next().await {
                        if msg.is_err() {
                            break;
                        }
                        // Inbound CDP requests are accepted but not acted on (§4.9).
                    }
                    // Only clear the slot if it still holds *this* connection —
                    // a newer reconnect may have already replaced it (§4.9).
                    let mut guard = replaced_current.write().await;
                    if guard.as_ref().is_some_and(|c| c.generation == generation) {
                        guard.take();
                    }
                });
            }
        });

        Ok(Self {
            current,
            accept_task: Some(accept_task),
            local_port,
        })
    }

    /// The port actually bound — useful when `bind` was called with `0`
    /// and the OS picked an ephemeral port.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Serialises and writes one frame. If no front-end is attached the
    /// frame is silently dropped, matching §5's cancellation note: no
    /// buffering of CDP frames is required across reconnects.
    pub async fn send_frame(&self, frame: &CdpFrame) {
        let payload = serde_json::json!({ "method": frame.method, "params": frame.params });
        let Ok(text) = serde_json::to_string(&payload) else {
            return;
        };

        let mut guard = self.current.write().await;
        if let Some(current) = guard.as_mut()
            && current.sink.send(Message::text(text)).await.is_err()
        {
            *guard = None;
        }
    }

    /// Sends all four frames for one record, in order, waiting for each
    /// write to complete before the next (§5 ordering: one Record's
    /// frames never interleave with another's).
    pub async fn send_record_frames(&self, frames: &[CdpFrame; 4]) {
        for frame in frames {
            self.send_frame(frame).await;
        }
    }

    pub async fn close(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        self.current.write().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;
    use tokio_tungstenite::connect_async;

    async fn connect(port: u16) -> WebSocketStream<TcpStream> {
        let (ws, _) = connect_async(format!("ws://127.0.0.1:{port}/")).await.unwrap();
        ws
    }

    #[tokio::test]
    async fn a_reconnect_replaces_the_stored_sink() {
        let mut server = DevtoolsServer::bind(0).await.unwrap();
        let port = server.local_port();

        let mut first = connect(port).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let mut second = connect(port).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        server
            .send_frame(&CdpFrame {
                method: "Network.requestWillBeSent".into(),
                params: serde_json::json!({}),
            })
            .await;

        let msg = tokio::time::timeout(std::time::Duration::from_secs(1), second.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(msg.is_text());

        first.close(None).await.ok();
        server.close().await;
    }

    /// Regression test for the generation-race: a connection that is slow to
    /// notice its own close must not clear a slot a newer connection already
    /// occupies.
    #[tokio::test]
    async fn late_cleanup_of_a_replaced_connection_does_not_evict_the_new_one() {
        let mut server = DevtoolsServer::bind(0).await.unwrap();
        let port = server.local_port();

        let first = connect(port).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let mut second = connect(port).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // Close the first connection's underlying socket without going
        // through a graceful close handshake, mimicking a slow/late reader
        // task finding out about its own disconnect well after `second` has
        // already taken the slot.
        drop(first);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        server
            .send_frame(&CdpFrame {
                method: "Network.requestWillBeSent".into(),
                params: serde_json::json!({}),
            })
            .await;

        let msg = tokio::time::timeout(std::time::Duration::from_secs(1), second.next())
            .await
            .expect("second connection should still be receiving frames")
            .unwrap()
            .unwrap();
        assert!(msg.is_text());

        server.close().await;
    }
}
