// Single-shard stage queue: total ordering through one worker queue

use crate::sharded::StageQueue;
use event_queue::{EventContext, EventSink, QueueFactory, WorkerQueue};
use std::sync::atomic::{AtomicBool, Ordering};

/// Stage queue with exactly one worker queue and therefore one consumer
/// thread: every submission is totally ordered, so scheduling keys and
/// flush flags are no-ops by definition.
pub struct SingleStageQueue<EC> {
    stage_name: String,
    queue: WorkerQueue<EC>,
    closed: AtomicBool,
}

impl<EC: EventContext> SingleStageQueue<EC> {
    pub fn new(stage_name: &str, capacity: usize) -> Self {
        let factory = QueueFactory::new();
        Self {
            stage_name: stage_name.to_string(),
            queue: factory.create_instance(capacity, 0),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) {
        assert!(
            !self.closed.load(Ordering::Acquire),
            "stage queue `{}` is closed",
            self.stage_name
        );
    }

    fn put(&self, context: EC) {
        tracing::debug!(stage = %self.stage_name, "added context");
        if self.queue.put(context).is_err() {
            tracing::warn!(stage = %self.stage_name, "context dropped after queue shutdown");
        }
    }
}

impl<EC: EventContext> EventSink<EC> for SingleStageQueue<EC> {
    fn add_single_threaded(&self, context: EC) {
        self.check_open();
        self.put(context);
    }

    fn add_multi_threaded(&self, context: EC) {
        // With one consumer the keyed and flush semantics collapse.
        self.check_open();
        self.put(context);
    }

    fn add_lossy(&self, context: EC) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        if self.queue.is_empty() { self.queue.try_put(context) } else { false }
    }

    fn size(&self) -> usize {
        self.queue.len()
    }

    fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::Release);
    }

    fn clear(&self) {
        let cleared = self.queue.clear();
        tracing::info!(stage = %self.stage_name, cleared, "cleared stage queue");
    }
}

impl<EC: EventContext> StageQueue<EC> for SingleStageQueue<EC> {
    fn shard_count(&self) -> usize {
        1
    }

    fn source(&self, index: usize) -> Option<WorkerQueue<EC>> {
        if index == 0 { Some(self.queue.clone()) } else { None }
    }
}
