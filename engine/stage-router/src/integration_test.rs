// Cross-thread routing scenarios for the stage queue implementations

use crate::{FindStrategy, OrderedSink, ShardedStageQueue, SingleStageQueue, StageQueue};
use event_queue::{EventContext, EventSink, OrderedContext, SchedulingKey, SequenceId};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct Msg {
    key: Option<SchedulingKey>,
    seq: u64,
}

impl EventContext for Msg {
    fn scheduling_key(&self) -> Option<SchedulingKey> {
        self.key
    }
}

impl OrderedContext for Msg {
    fn sequence_id(&self) -> SequenceId {
        self.seq
    }
}

fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn test_per_key_order_survives_concurrent_producers() {
    let queue = Arc::new(ShardedStageQueue::new("routing", 4, 4096, FindStrategy::Rollover));

    // Four producers interleave submissions for four keys; each producer
    // stamps its own monotonic sequence per key.
    let mut producers = Vec::new();
    for key_raw in 0..4u64 {
        let queue = Arc::clone(&queue);
        producers.push(thread::spawn(move || {
            for seq in 0..100u64 {
                queue.add_multi_threaded(Msg {
                    key: Some(SchedulingKey::new(key_raw)),
                    seq,
                });
            }
        }));
    }
    for producer in producers {
        producer.join().unwrap();
    }

    // Drain each shard; within a shard, every key's sequence must be
    // strictly increasing because equal keys never cross shards.
    for shard in 0..4 {
        let source = queue.source(shard).unwrap();
        let mut last_seen: std::collections::HashMap<u64, u64> = Default::default();
        while let Ok(Some(msg)) = source.poll(Duration::from_millis(1)) {
            let raw = msg.key.unwrap().raw();
            if let Some(prev) = last_seen.insert(raw, msg.seq) {
                assert!(msg.seq > prev, "key {raw} reordered on shard {shard}");
            }
        }
    }
}

#[test]
fn test_backpressure_stalls_the_producer() {
    let queue = Arc::new(SingleStageQueue::new("backpressure", 4));

    for i in 0..4 {
        queue.add_single_threaded(Msg { key: None, seq: i });
    }
    assert_eq!(queue.size(), 4);

    // The fifth blocking add must park until a consumer drains one item.
    let blocked = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.add_single_threaded(Msg { key: None, seq: 4 }))
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!blocked.is_finished(), "producer should be parked on a full queue");
    assert_eq!(queue.size(), 4, "bounded queue exceeded its capacity");

    let source = queue.source(0).unwrap();
    source.take().unwrap();
    blocked.join().unwrap();
    assert!(wait_until(Duration::from_secs(1), || queue.size() == 4));
}

#[test]
fn test_ordered_sink_feeding_a_single_stage_queue() {
    let backing = Arc::new(SingleStageQueue::<Msg>::new("ordered", 64));
    let ordered = OrderedSink::new(backing.clone() as Arc<dyn EventSink<Msg>>);

    for seq in [3u64, 1, 5, 2, 4] {
        ordered.add(Msg { key: None, seq });
    }

    let source = backing.source(0).unwrap();
    for expected in 1..=5u64 {
        assert_eq!(source.take().unwrap().seq, expected);
    }
    assert!(ordered.is_clean());
}

#[test]
fn test_flush_barrier_observed_once_per_consumer() {
    let queue = Arc::new(ShardedStageQueue::new("barrier", 3, 96, FindStrategy::Brute));

    #[derive(Clone)]
    struct Barrier;

    impl EventContext for Barrier {
        fn is_flush(&self) -> bool {
            true
        }
    }

    let observed = Arc::new(Mutex::new(vec![0usize; 3]));
    let mut consumers = Vec::new();
    for shard in 0..3 {
        let source = queue.source(shard).unwrap();
        let observed = Arc::clone(&observed);
        consumers.push(thread::spawn(move || {
            while let Ok(Some(_)) = source.poll(Duration::from_millis(100)) {
                observed.lock().unwrap()[shard] += 1;
            }
        }));
    }

    queue.add_multi_threaded(Barrier);
    for consumer in consumers {
        consumer.join().unwrap();
    }

    assert_eq!(*observed.lock().unwrap(), vec![1, 1, 1]);
}
