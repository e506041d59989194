use event_queue::SchedulingKey;

/// Deterministic key-to-shard mapping.
///
/// Stable for the life of a stage: the shard count is fixed at stage
/// creation, and the key hash is fixed-seed, so equal keys always land on
/// the same worker queue. This is the sole ordering guarantee the router
/// itself provides.
pub fn shard_for_key(key: SchedulingKey, num_shards: usize) -> usize {
    debug_assert!(num_shards > 0);
    (key.raw() % num_shards as u64) as usize
}
