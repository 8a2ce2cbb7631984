use request_center_core::queue::DropOldestSender;
use request_center_core::record::RequestRecord;
use tracing::warn;

/// Destination for finished [`RequestRecord`]s. `request-center-ipc` wires
/// a channel-backed sink into this to forward records to the debugger
/// process; tests can supply a simple in-memory sink instead.
pub trait RecordSink: Send + Sync {
    fn publish(&self, record: RequestRecord);
}

/// Publishes onto a bounded [`DropOldestSender`]. When the debugger is slow
/// and the queue is full, §4.7's policy is honored directly by the queue
/// itself: the oldest queued record is evicted to make room, not the one
/// just published.
pub struct ChannelSink {
    tx: DropOldestSender<RequestRecord>,
}

impl ChannelSink {
    pub fn new(tx: DropOldestSender<RequestRecord>) -> Self {
        Self { tx }
    }

    pub fn dropped_count(&self) -> u64 {
        self.tx.dropped_count()
    }
}

impl RecordSink for ChannelSink {
    fn publish(&self, record: RequestRecord) {
        if self.tx.send(record) {
            warn!(
                dropped_total = self.tx.dropped_count(),
                "record queue saturated, oldest record dropped"
            );
        }
    }
}
