use std::path::Path;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::IpcError;
use crate::message::IpcMessage;

/// A length-framed JSON duplex over a Unix domain socket stream (§4.7).
/// Both the debugger-process listener side and the captured-process client
/// side speak through the same framing, so they share one type.
pub struct IpcConnection {
    framed: Framed<UnixStream, LengthDelimitedCodec>,
}

impl IpcConnection {
    fn new(stream: UnixStream) -> Self {
        Self {
            framed: Framed::new(stream, LengthDelimitedCodec::new()),
        }
    }

    /// Connects to a debugger process already listening on `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(path.as_ref()).await?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, msg: &IpcMessage) -> Result<(), IpcError> {
        let bytes = serde_json::to_vec(msg)?;
        self.framed.send(Bytes::from(bytes)).await?;
        Ok(())
    }

    /// Reads the next frame, or `Ok(None)` when the peer has closed cleanly.
    pub async fn recv(&mut self) -> Result<Option<IpcMessage>, IpcError> {
        match self.framed.next().await {
            Some(Ok(bytes)) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

/// The debugger-process side: binds the socket the captured process(es)
/// dial into. Grounded on the teacher's own `UnixDatagram::bind` dance in
/// `ldpreload.rs`, promoted to a listener since IPC here needs a
/// connection-oriented stream (§4.7).
pub struct IpcListener {
    inner: UnixListener,
}

impl IpcListener {
    pub fn bind(path: impl AsRef<Path>) -> Result<Self, IpcError> {
        let path = path.as_ref();
        let _ = std::fs::remove_file(path);
        let inner = UnixListener::bind(path)?;
        Ok(Self { inner })
    }

    pub async fn accept(&self) -> Result<IpcConnection, IpcError> {
        let (stream, _addr) = self.inner.accept().await?;
        Ok(IpcConnection::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use request_center_core::initiator::BacktraceResolver;
    use request_center_core::record::RequestRecord;

    #[tokio::test]
    async fn round_trips_request_end_over_a_real_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request-center.sock");

        let listener = IpcListener::bind(&path).unwrap();
        let server = tokio::spawn({
            let path = path.clone();
            async move {
                let _ = path;
                let mut conn = listener.accept().await.unwrap();
                conn.recv().await.unwrap().unwrap()
            }
        });

        let mut client = IpcConnection::connect(&path).await.unwrap();
        let record = RequestRecord::new("GET", "http://x", &BacktraceResolver, 0);
        let sent_id = record.id.clone();
        client.send(&IpcMessage::request_end(record)).await.unwrap();

        let received = server.await.unwrap();
        match received {
            IpcMessage::RequestEnd { record } => assert_eq!(record.id, sent_id),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn recv_returns_none_when_peer_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request-center.sock");
        let listener = IpcListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            conn.recv().await.unwrap()
        });

        let client = IpcConnection::connect(&path).await.unwrap();
        drop(client);

        assert!(server.await.unwrap().is_none());
    }
}
