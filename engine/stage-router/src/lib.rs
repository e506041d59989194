// StageRouter - routing layer between producers and stage worker queues
#![allow(dead_code)]

mod ordered;
mod sharded;
mod sharding;
mod single;

#[cfg(test)]
mod integration_test;

pub use ordered::OrderedSink;
pub use sharded::{build_stage_queue, FindStrategy, ShardedStageQueue, StageQueue};
pub use sharding::shard_for_key;
pub use single::SingleStageQueue;

// Re-export the shared contracts for convenience
pub use event_queue::{
    EventContext, EventSink, OrderedContext, SchedulingKey, SequenceId, WorkerQueue,
};
