use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

/// A bounded, multi-producer single-consumer queue that evicts the
/// **oldest** queued item when a push would exceed capacity, rather than
/// rejecting the new one (§4.7: "on overflow, oldest records are dropped").
/// `tokio::sync::mpsc`'s bounded channel only supports the opposite policy
/// (`try_send` rejects the newest item), so this is hand-rolled on top of a
/// `Mutex<VecDeque<T>>` plus a `Notify`, the pattern `tokio::sync::Notify`'s
/// own docs use for a channel-like primitive.
struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
    senders: AtomicUsize,
}

pub struct DropOldestSender<T> {
    shared: Arc<Shared<T>>,
}

pub struct DropOldestReceiver<T> {
    shared: Arc<Shared<T>>,
}

/// Builds a bounded drop-oldest channel with room for `capacity` items.
pub fn drop_oldest_channel<T>(capacity: usize) -> (DropOldestSender<T>, DropOldestReceiver<T>) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        notify: Notify::new(),
        dropped: AtomicU64::new(0),
        senders: AtomicUsize::new(1),
    });
    (
        DropOldestSender { shared: shared.clone() },
        DropOldestReceiver { shared },
    )
}

impl<T> DropOldestSender<T> {
    /// Pushes `item`. If the queue is already at capacity, the oldest
    /// queued item is discarded first and the drop counter incremented,
    /// rather than rejecting `item`. Returns `true` when an eviction
    /// happened on this call.
    pub fn send(&self, item: T) -> bool {
        let evicted = {
            let mut queue = self.shared.queue.lock().unwrap();
            let evicted = queue.len() >= self.shared.capacity;
            if evicted {
                queue.pop_front();
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(item);
            evicted
        };
        self.shared.notify.notify_one();
        evicted
    }

    /// Total items evicted to make room for a newer one.
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Clone for DropOldestSender<T> {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::SeqCst);
        Self { shared: self.shared.clone() }
    }
}

impl<T> Drop for DropOldestSender<T> {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Last sender gone: wake a pending `recv` so it observes the
            // closed queue instead of waiting forever.
            self.shared.notify.notify_one();
        }
    }
}

impl<T> DropOldestReceiver<T> {
    /// Waits for the next item, or returns `None` once every sender has
    /// been dropped and the queue has drained — mirroring
    /// `mpsc::Receiver::recv`'s contract.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut queue = self.shared.queue.lock().unwrap();
                if let Some(item) = queue.pop_front() {
                    return Some(item);
                }
                if self.shared.senders.load(Ordering::SeqCst) == 0 {
                    return None;
                }
            }
            self.shared.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_items_in_order() {
        let (tx, mut rx) = drop_oldest_channel::<u32>(8);
        tx.send(1);
        tx.send(2);
        tx.send(3);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn overflow_drops_the_oldest_not_the_newest() {
        let (tx, mut rx) = drop_oldest_channel::<u32>(2);
        tx.send(1);
        tx.send(2);
        tx.send(3); // queue full at [1, 2]; 1 is evicted, 3 is kept

        assert_eq!(tx.dropped_count(), 1);
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn recv_returns_none_once_every_sender_is_dropped_and_queue_drains() {
        let (tx, mut rx) = drop_oldest_channel::<u32>(4);
        tx.send(1);
        drop(tx);

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn recv_wakes_once_a_clone_sends_after_the_original_is_dropped() {
        let (tx, mut rx) = drop_oldest_channel::<u32>(4);
        let tx2 = tx.clone();
        drop(tx);

        let recv_task = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        tx2.send(42);

        assert_eq!(recv_task.await.unwrap(), Some(42));
    }
}
