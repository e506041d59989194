// Bounded blocking FIFO backing one consumer thread of a stage

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Returned from queue operations once the channel has been torn down, so
/// parked producers and consumers see a distinguishable cancellation signal
/// instead of a generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("worker queue closed")]
pub struct QueueClosed;

/// Shard index where the next unkeyed load-balance search begins.
///
/// Consumers publish their own index whenever they observe their queue
/// empty; the router reads it to start the shortest-shard scan at the most
/// recently drained shard instead of permanently biasing shard 0.
#[derive(Debug, Default)]
pub struct RolloverHint(AtomicUsize);

impl RolloverHint {
    pub fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    pub fn load(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    pub fn publish(&self, index: usize) {
        self.0.store(index, Ordering::Relaxed);
    }
}

/// Bounded blocking FIFO of event contexts.
///
/// Any number of producers may `put`; exactly one consumer thread drains a
/// given queue over its lifetime (by convention, enforced by the stage that
/// binds one worker thread per queue). `put` blocks when the queue is full,
/// which is how backpressure propagates upstream: the producer's own thread
/// stalls rather than buffering unboundedly.
pub struct WorkerQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    index: usize,
    rollover: Arc<RolloverHint>,
}

impl<T> Clone for WorkerQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            index: self.index,
            rollover: Arc::clone(&self.rollover),
        }
    }
}

impl<T: Send> WorkerQueue<T> {
    fn new(capacity: usize, index: usize, rollover: Arc<RolloverHint>) -> Self {
        assert!(capacity > 0, "worker queue capacity must be positive");
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, index, rollover }
    }

    /// Blocking enqueue; parks the producer while the queue is full.
    pub fn put(&self, item: T) -> Result<(), QueueClosed> {
        self.tx.send(item).map_err(|_| QueueClosed)
    }

    /// Non-blocking enqueue; `false` when the queue is full or closed.
    pub fn try_put(&self, item: T) -> bool {
        self.tx.try_send(item).is_ok()
    }

    /// Blocking dequeue; parks the consumer while the queue is empty.
    pub fn take(&self) -> Result<T, QueueClosed> {
        let item = self.rx.recv().map_err(|_| QueueClosed)?;
        if self.rx.is_empty() {
            self.rollover.publish(self.index);
        }
        Ok(item)
    }

    /// Dequeue with a timeout; `Ok(None)` when nothing arrived in time.
    pub fn poll(&self, timeout: Duration) -> Result<Option<T>, QueueClosed> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => {
                if self.rx.is_empty() {
                    self.rollover.publish(self.index);
                }
                Ok(Some(item))
            }
            Err(RecvTimeoutError::Timeout) => {
                self.rollover.publish(self.index);
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => Err(QueueClosed),
        }
    }

    /// Discard all queued work immediately; returns the number dropped.
    pub fn clear(&self) -> usize {
        let mut cleared = 0;
        while self.rx.try_recv().is_ok() {
            cleared += 1;
        }
        self.rollover.publish(self.index);
        cleared
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Creates the worker queues of one stage, all sharing a single rollover
/// hint so unkeyed placement and consumer drain cooperate.
pub struct QueueFactory {
    rollover: Arc<RolloverHint>,
}

impl Default for QueueFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueFactory {
    pub fn new() -> Self {
        Self { rollover: Arc::new(RolloverHint::new()) }
    }

    pub fn create_instance<T: Send>(&self, capacity: usize, index: usize) -> WorkerQueue<T> {
        WorkerQueue::new(capacity, index, Arc::clone(&self.rollover))
    }

    pub fn rollover(&self) -> Arc<RolloverHint> {
        Arc::clone(&self.rollover)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_take_fifo() {
        let factory = QueueFactory::new();
        let queue = factory.create_instance::<u32>(8, 0);

        queue.put(1).unwrap();
        queue.put(2).unwrap();
        queue.put(3).unwrap();

        assert_eq!(queue.take().unwrap(), 1);
        assert_eq!(queue.take().unwrap(), 2);
        assert_eq!(queue.take().unwrap(), 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_capacity_bound() {
        let factory = QueueFactory::new();
        let queue = factory.create_instance::<u32>(2, 0);

        queue.put(1).unwrap();
        queue.put(2).unwrap();

        // A third item would block; the non-blocking variant must refuse.
        assert!(!queue.try_put(3));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_poll_timeout_returns_none() {
        let factory = QueueFactory::new();
        let queue = factory.create_instance::<u32>(4, 0);

        let polled = queue.poll(Duration::from_millis(5)).unwrap();
        assert!(polled.is_none());
    }

    #[test]
    fn test_clear_counts_dropped_items() {
        let factory = QueueFactory::new();
        let queue = factory.create_instance::<u32>(8, 0);

        for i in 0..5 {
            queue.put(i).unwrap();
        }

        assert_eq!(queue.clear(), 5);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_observation_publishes_rollover() {
        let factory = QueueFactory::new();
        let q0 = factory.create_instance::<u32>(4, 0);
        let q3 = factory.create_instance::<u32>(4, 3);

        q0.put(1).unwrap();
        q0.take().unwrap();
        assert_eq!(factory.rollover().load(), 0);

        q3.clear();
        assert_eq!(factory.rollover().load(), 3);
    }

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn test_zero_capacity_rejected() {
        let factory = QueueFactory::new();
        let _ = factory.create_instance::<u32>(0, 0);
    }
}
