// Ordered sink: reorders sequence-numbered contexts into delivery order

use event_queue::{EventSink, OrderedContext, SequenceId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct OrderedState<EC> {
    next_expected: SequenceId,
    pending: HashMap<SequenceId, EC>,
}

/// Decorator that accepts arbitrarily-interleaved, sequence-numbered
/// contexts and forwards them to the backing sink in strictly increasing,
/// gap-free order, each exactly once.
///
/// The backing sink should serialize its consumers (a single-shard stage)
/// or the restored order is lost again downstream. A sequence number that
/// was already delivered, or that collides with one already held, is a
/// producer bug and fails fast.
pub struct OrderedSink<EC> {
    inner: Arc<dyn EventSink<EC>>,
    state: Mutex<OrderedState<EC>>,
}

impl<EC: OrderedContext> OrderedSink<EC> {
    pub fn new(inner: Arc<dyn EventSink<EC>>) -> Self {
        Self {
            inner,
            state: Mutex::new(OrderedState { next_expected: 1, pending: HashMap::new() }),
        }
    }

    pub fn add(&self, context: EC) {
        let mut state = self.state.lock().expect("ordered sink lock poisoned");
        let sequence = context.sequence_id();

        if sequence == state.next_expected {
            self.inner.add_single_threaded(context);
            state.next_expected += 1;
            // Flush any contiguous run that was waiting on this gap.
            loop {
                let next = state.next_expected;
                match state.pending.remove(&next) {
                    Some(held) => {
                        self.inner.add_single_threaded(held);
                        state.next_expected += 1;
                    }
                    None => break,
                }
            }
        } else if sequence > state.next_expected {
            if state.pending.insert(sequence, context).is_some() {
                panic!("ordered sink already holds sequence {sequence}");
            }
        } else {
            panic!(
                "sequence {sequence} already delivered (next expected {})",
                state.next_expected
            );
        }
    }

    /// `true` when no out-of-order contexts are being held back.
    pub fn is_clean(&self) -> bool {
        self.state.lock().expect("ordered sink lock poisoned").pending.is_empty()
    }

    pub fn next_expected(&self) -> SequenceId {
        self.state.lock().expect("ordered sink lock poisoned").next_expected
    }
}
