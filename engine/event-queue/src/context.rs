use siphasher::sip::SipHasher13;
use std::hash::{Hash, Hasher};

/// Monotonic sequence number carried by ordered contexts.
///
/// Every logical stream starts at 1 and is gap-free; the producer owns the
/// numbering.
pub type SequenceId = u64;

/// Stable routing key used to pin related work to one shard.
///
/// Keys are compared by their hash value only; two distinct logical keys
/// colliding onto the same shard is expected and harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedulingKey(u64);

// Fixed SipHash keys so a key maps to the same shard for the life of a
// stage, across producers and across calls.
const KEY_HASH_K0: u64 = 0x7374_6167_6551_7565;
const KEY_HASH_K1: u64 = 0x6576_656e_7443_7478;

impl SchedulingKey {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Derive a key from any hashable value using SipHash-1-3 with fixed
    /// keys, so the mapping is stable across processes and runs.
    pub fn from_hashable<T: Hash + ?Sized>(value: &T) -> Self {
        let mut hasher = SipHasher13::new_with_keys(KEY_HASH_K0, KEY_HASH_K1);
        value.hash(&mut hasher);
        Self(hasher.finish())
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Unit of work submitted to a stage sink.
///
/// Contexts are plain data values, immutable from the pipeline's point of
/// view. A *plain* context implements this trait with no overrides and is
/// delivered to whichever single worker queue the router chooses. A
/// *multi-threaded* context overrides `scheduling_key` and/or `is_flush`:
/// equal non-`None` keys always land on the same shard, and a flush context
/// is broadcast to every shard as a synchronization barrier (each shard
/// processes its own clone).
pub trait EventContext: Send + Clone + 'static {
    fn scheduling_key(&self) -> Option<SchedulingKey> {
        None
    }

    fn is_flush(&self) -> bool {
        false
    }
}

/// A context carrying a strictly increasing sequence number, consumed by
/// the ordered sink to restore submission order.
pub trait OrderedContext: EventContext {
    fn sequence_id(&self) -> SequenceId;
}
