// Sharded stage queue: key pinning, flush broadcast, shortest-shard search

use crate::sharding::shard_for_key;
use crate::single::SingleStageQueue;
use event_queue::{EventContext, EventSink, QueueFactory, RolloverHint, WorkerQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Routing layer in front of a stage's worker queues. The stage binds one
/// consumer thread per source; producers see only the [`EventSink`]
/// surface.
pub trait StageQueue<EC: EventContext>: EventSink<EC> {
    fn shard_count(&self) -> usize;

    /// Worker queue for shard `index`, or `None` for an out-of-range index.
    fn source(&self, index: usize) -> Option<WorkerQueue<EC>>;
}

/// Selection strategy for unkeyed, load-balanced placement.
///
/// `Rollover` starts the shortest-shard scan at the most recently emptied
/// shard and wraps, avoiding a permanent bias toward shard 0. `Brute`
/// always scans from index 0 and picks the global minimum, which is
/// deterministic and favors fairness over scan cost. The trade-off is
/// workload-dependent, so both remain selectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FindStrategy {
    #[default]
    Rollover,
    Brute,
}

/// Stage queue fanning work out across N worker queues.
///
/// Total capacity is divided (ceiling) across the shards. Per-key ordering
/// holds because equal keys always map to the same shard and each shard has
/// exactly one consumer; there is no ordering guarantee across shards.
pub struct ShardedStageQueue<EC> {
    stage_name: String,
    shards: Vec<WorkerQueue<EC>>,
    rollover: Arc<RolloverHint>,
    strategy: FindStrategy,
    closed: AtomicBool,
}

impl<EC: EventContext> ShardedStageQueue<EC> {
    pub fn new(
        stage_name: &str,
        shard_count: usize,
        total_capacity: usize,
        strategy: FindStrategy,
    ) -> Self {
        assert!(shard_count > 0, "stage queue needs at least one shard");
        assert!(total_capacity > 0, "stage queue capacity must be positive");

        let per_shard = total_capacity.div_ceil(shard_count);
        let factory = QueueFactory::new();
        let shards =
            (0..shard_count).map(|i| factory.create_instance(per_shard, i)).collect();

        Self {
            stage_name: stage_name.to_string(),
            shards,
            rollover: factory.rollover(),
            strategy,
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

    /// Shortest-shard search for unkeyed contexts. Best effort: shard sizes
    /// are read concurrently and may move underneath the scan.
    fn find_shortest_index(&self) -> usize {
        match self.strategy {
            FindStrategy::Rollover => {
                let n = self.shards.len();
                let start = self.rollover.load() % n;
                let mut min = usize::MAX;
                let mut candidate = start;
                for offset in 0..n {
                    let index = (start + offset) % n;
                    let len = self.shards[index].len();
                    if len == 0 {
                        self.rollover.publish((index + 1) % n);
                        return index;
                    }
                    if len < min {
                        min = len;
                        candidate = index;
                    }
                }
                self.rollover.publish((candidate + 1) % n);
                candidate
            }
            FindStrategy::Brute => {
                let mut min = usize::MAX;
                let mut candidate = 0;
                for (index, shard) in self.shards.iter().enumerate() {
                    let len = shard.len();
                    if len < min {
                        min = len;
                        candidate = index;
                    }
                }
                candidate
            }
        }
    }

    fn route(&self, context: &EC) -> usize {
        match context.scheduling_key() {
            Some(key) => shard_for_key(key, self.shards.len()),
            None => self.find_shortest_index(),
        }
    }

    fn put(&self, index: usize, context: EC) {
        if self.shards[index].put(context).is_err() {
            tracing::warn!(
                stage = %self.stage_name,
                shard = index,
                "context dropped after queue shutdown"
            );
        }
    }
}

impl<EC: EventContext> EventSink<EC> for ShardedStageQueue<EC> {
    fn add_single_threaded(&self, context: EC) {
        self.check_open();
        tracing::debug!(stage = %self.stage_name, "added single-threaded context");
        self.put(0, context);
    }

    fn add_multi_threaded(&self, context: EC) {
        self.check_open();
        if context.is_flush() {
            // Broadcast barrier: every consumer processes its own copy, so
            // the per-shard "all prior work done" invariant holds
            // independently on each shard.
            tracing::debug!(
                stage = %self.stage_name,
                shards = self.shards.len(),
                "broadcasting flush context"
            );
            for index in 0..self.shards.len() {
                self.put(index, context.clone());
            }
        } else {
            let index = self.route(&context);
            tracing::debug!(stage = %self.stage_name, shard = index, "added context");
            self.put(index, context);
        }
    }

    fn add_lossy(&self, context: EC) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let index = self.route(&context);
        let shard = &self.shards[index];
        if shard.is_empty() { shard.try_put(context) } else { false }
    }

    fn size(&self) -> usize {
        self.shards.iter().map(WorkerQueue::len).sum()
    }

    fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::Release);
    }

    fn clear(&self) {
        let cleared: usize = self.shards.iter().map(WorkerQueue::clear).sum();
        tracing::info!(stage = %self.stage_name, cleared, "cleared stage queue");
    }
}

impl<EC: EventContext> StageQueue<EC> for ShardedStageQueue<EC> {
    fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn source(&self, index: usize) -> Option<WorkerQueue<EC>> {
        self.shards.get(index).cloned()
    }
}

/// Builds the routing layer for a stage: one shard degenerates to the
/// strictly-FIFO single queue, more than one gets the sharded router.
pub fn build_stage_queue<EC: EventContext>(
    stage_name: &str,
    shard_count: usize,
    total_capacity: usize,
    strategy: FindStrategy,
) -> Arc<dyn StageQueue<EC>> {
    if shard_count <= 1 {
        Arc::new(SingleStageQueue::new(stage_name, total_capacity))
    } else {
        Arc::new(ShardedStageQueue::new(stage_name, shard_count, total_capacity, strategy))
    }
}
