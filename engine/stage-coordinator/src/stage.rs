// Stage: a routing queue plus one consumer thread per shard

use crate::types::{ExitHandler, StageError, StageState};
use event_queue::{EventContext, EventHandler, EventSink, StageConfig, WorkerQueue};
use stage_router::{build_stage_queue, FindStrategy, StageQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct StageInner {
    state: StageState,
    workers: Vec<JoinHandle<()>>,
}

/// A named processing stage: owns the routing queue, a fixed pool of
/// consumer threads (one per worker queue), and the processing callback
/// they drive.
///
/// Lifecycle is `Uncreated -> Started -> Destroyed`, terminal at
/// `Destroyed`; destroying twice is a programming error and fails fast.
pub struct Stage<EC: EventContext> {
    config: StageConfig,
    queue: Arc<dyn StageQueue<EC>>,
    handler: Arc<dyn EventHandler<EC>>,
    exit: ExitHandler,
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
    inner: Mutex<StageInner>,
}

impl<EC: EventContext> Stage<EC> {
    pub fn new(
        name: &str,
        handler: Arc<dyn EventHandler<EC>>,
        shard_count: usize,
        queue_capacity: usize,
        strategy: FindStrategy,
        poll_interval: Duration,
        exit: ExitHandler,
    ) -> Self {
        let queue = build_stage_queue(name, shard_count, queue_capacity, strategy);
        Self {
            config: StageConfig {
                name: name.to_string(),
                shard_count: queue.shard_count(),
                queue_capacity,
            },
            queue,
            handler,
            exit,
            poll_interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            inner: Mutex::new(StageInner { state: StageState::Uncreated, workers: Vec::new() }),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> StageState {
        self.inner.lock().expect("stage lock poisoned").state
    }

    pub fn stage_config(&self) -> &StageConfig {
        &self.config
    }

    /// Submission handle producers hold; routing policy stays hidden
    /// behind it.
    pub fn sink(&self) -> Arc<dyn StageQueue<EC>> {
        Arc::clone(&self.queue)
    }

    /// Spin up one consumer thread per worker queue. Each thread polls its
    /// queue and invokes the handler until the stage is destroyed.
    pub fn start(&self) -> Result<(), StageError> {
        let mut inner = self.inner.lock().expect("stage lock poisoned");
        if inner.state != StageState::Uncreated {
            return Err(StageError::InvalidLifecycle(self.config.name.clone(), inner.state));
        }

        self.handler.initialize(&self.config);

        for shard in 0..self.queue.shard_count() {
            let source = self
                .queue
                .source(shard)
                .unwrap_or_else(|| panic!("stage `{}` missing shard {shard}", self.config.name));
            let worker = thread::Builder::new()
                .name(format!("stage-{}-{shard}", self.config.name))
                .spawn(dispatch_loop(
                    self.config.name.clone(),
                    source,
                    Arc::clone(&self.handler),
                    Arc::clone(&self.shutdown),
                    Arc::clone(&self.exit),
                    self.poll_interval,
                ))
                .map_err(|e| StageError::SpawnFailed(self.config.name.clone(), e))?;
            inner.workers.push(worker);
        }

        inner.state = StageState::Started;
        tracing::info!(
            stage = %self.config.name,
            shards = self.queue.shard_count(),
            "stage started"
        );
        Ok(())
    }

    /// Signal all consumer threads to stop, discard queued work, and join
    /// the pool. In-flight handler invocations run to completion.
    pub fn destroy(&self) {
        let workers = {
            let mut inner = self.inner.lock().expect("stage lock poisoned");
            assert!(
                inner.state != StageState::Destroyed,
                "stage `{}` destroyed twice",
                self.config.name
            );
            inner.state = StageState::Destroyed;
            std::mem::take(&mut inner.workers)
        };

        self.shutdown.store(true, Ordering::Release);
        self.queue.set_closed(true);
        self.queue.clear();

        for worker in workers {
            if worker.join().is_err() {
                tracing::warn!(stage = %self.config.name, "worker thread panicked");
            }
        }

        self.handler.destroy();
        tracing::info!(stage = %self.config.name, "stage destroyed");
    }
}

fn dispatch_loop<EC: EventContext>(
    stage_name: String,
    source: WorkerQueue<EC>,
    handler: Arc<dyn EventHandler<EC>>,
    shutdown: Arc<AtomicBool>,
    exit: ExitHandler,
    poll_interval: Duration,
) -> impl FnOnce() {
    move || {
        while !shutdown.load(Ordering::Acquire) {
            match source.poll(poll_interval) {
                Ok(Some(context)) => match handler.handle_event(context) {
                    Ok(()) => {}
                    Err(err) if err.is_recoverable() => {
                        tracing::warn!(stage = %stage_name, error = %err, "recoverable handler error");
                    }
                    Err(err) => {
                        tracing::error!(stage = %stage_name, error = %err, "fatal handler error");
                        exit(&format!("stage `{stage_name}`: {err}"));
                        return;
                    }
                },
                Ok(None) => {}
                Err(_) => return,
            }
        }
    }
}
