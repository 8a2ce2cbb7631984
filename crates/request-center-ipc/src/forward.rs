use std::sync::atomic::{AtomicU64, Ordering};

use request_center_core::queue::DropOldestReceiver;
use request_center_core::record::RequestRecord;
use tracing::warn;

use crate::channel::IpcConnection;
use crate::message::IpcMessage;

/// Drains finished records off a bounded drop-oldest queue and writes each
/// as a `requestEnd` frame, in arrival order (P2/P3), then a final
/// `shutdown` when the queue closes (§4.8 "shutdown on host exit: send a
/// final flush"). The `ready` handshake is the debugger's to send on
/// accept, not this side's — see `request_center_ipc::IpcMessage::Ready`
/// and the debugger process's accept loop. The queue itself — not this
/// loop — is where the oldest-dropped-with-counter policy of §4.7 lives
/// (`request_center_core::queue::DropOldestSender`); `ChannelSink::publish`
/// (in `request-center-capture`) logs the same counter when a push evicts
/// upstream of here.
pub async fn forward_records(
    mut rx: DropOldestReceiver<RequestRecord>,
    mut conn: IpcConnection,
) -> Result<(), crate::error::IpcError> {
    while let Some(record) = rx.recv().await {
        conn.send(&IpcMessage::request_end(record)).await?;
    }
    conn.send(&IpcMessage::Shutdown).await?;
    Ok(())
}

/// Counts frames a forwarder failed to deliver (e.g. transport error mid
/// stream) without aborting the whole capture session — logged the same
/// way `ChannelSink` logs queue-full evictions.
#[derive(Default)]
pub struct ForwardDropCounter(AtomicU64);

impl ForwardDropCounter {
    pub fn record_drop(&self) -> u64 {
        let total = self.0.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(dropped_total = total, "ipc forwarder dropped a record");
        total
    }

    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::IpcListener;
    use request_center_core::initiator::BacktraceResolver;
    use request_center_core::queue::drop_oldest_channel;

    #[tokio::test]
    async fn forwards_records_in_order_then_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request-center.sock");
        let listener = IpcListener::bind(&path).unwrap();

        let (tx, rx) = drop_oldest_channel(8);
        let client_task = tokio::spawn(async move {
            let conn = IpcConnection::connect(&path).await.unwrap();
            forward_records(rx, conn).await.unwrap();
        });

        let mut server_conn = listener.accept().await.unwrap();

        let first = RequestRecord::new("GET", "http://a", &BacktraceResolver, 0);
        let second = RequestRecord::new("GET", "http://b", &BacktraceResolver, 0);
        let (first_id, second_id) = (first.id.clone(), second.id.clone());
        tx.send(first);
        tx.send(second);
        drop(tx);

        let msg1 = server_conn.recv().await.unwrap().unwrap();
        let msg2 = server_conn.recv().await.unwrap().unwrap();
        let msg3 = server_conn.recv().await.unwrap().unwrap();

        match msg1 {
            IpcMessage::RequestEnd { record } => assert_eq!(record.id, first_id),
            other => panic!("unexpected: {other:?}"),
        }
        match msg2 {
            IpcMessage::RequestEnd { record } => assert_eq!(record.id, second_id),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(msg3, IpcMessage::Shutdown));

        client_task.await.unwrap();
    }

    #[test]
    fn drop_counter_increments() {
        let counter = ForwardDropCounter::default();
        counter.record_drop();
        counter.record_drop();
        assert_eq!(counter.count(), 2);
    }
}
