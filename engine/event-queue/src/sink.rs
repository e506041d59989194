/// Submission API a stage exposes to producers.
///
/// Producers hold a sink handle without knowledge of shard count or routing
/// policy; instrumentation call sites, network readers and timers all go
/// through this surface. Submitting to a closed sink is a programming error
/// and panics; a full queue is not an error, it blocks the producer.
pub trait EventSink<EC>: Send + Sync {
    /// Enqueue onto shard 0 unconditionally. Strict FIFO across all
    /// producers; blocks under backpressure.
    fn add_single_threaded(&self, context: EC);

    /// Routed enqueue: flush contexts are broadcast to every shard, keyed
    /// contexts are pinned by stable hash, unkeyed contexts go to the
    /// shortest shard. Blocks under backpressure.
    fn add_multi_threaded(&self, context: EC);

    /// Best-effort enqueue for producers that prefer dropping work over
    /// stalling. Succeeds only when the target shard is empty; returns
    /// `false` otherwise, without blocking.
    fn add_lossy(&self, context: EC) -> bool;

    /// Total number of contexts queued across all shards.
    fn size(&self) -> usize;

    /// Stop accepting new work (shutdown path).
    fn set_closed(&self, closed: bool);

    /// Discard all queued work immediately (shutdown path).
    fn clear(&self);
}
