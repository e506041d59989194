// Stage manager: named registry with shape-checked lookup

use crate::stage::Stage;
use crate::types::{default_exit_handler, EngineConfig, ExitHandler, StageError, StageState};
use event_queue::{EventContext, EventHandler};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shape-blind lifecycle facade over a stage, so the registry and the
/// controller can start/destroy stages without knowing their context type.
pub trait StageControl: Send + Sync {
    fn control_name(&self) -> &str;
    fn control_start(&self) -> Result<(), StageError>;
    fn control_destroy(&self);
    fn control_state(&self) -> StageState;
}

impl<EC: EventContext> StageControl for Stage<EC> {
    fn control_name(&self) -> &str {
        self.name()
    }

    fn control_start(&self) -> Result<(), StageError> {
        self.start()
    }

    fn control_destroy(&self) {
        self.destroy()
    }

    fn control_state(&self) -> StageState {
        self.state()
    }
}

struct StageHandle {
    // Same allocation behind both pointers: `any` recovers the concrete
    // Stage<EC> for shape-checked lookup, `control` drives lifecycle.
    any: Arc<dyn Any + Send + Sync>,
    control: Arc<dyn StageControl>,
}

/// Explicitly constructed registry of named stages.
///
/// Creation and lookup are guarded as a whole; dispatch inside individual
/// stages never touches the registry. There is deliberately no process-wide
/// instance: whoever builds the server builds the manager and hands it to
/// everything that creates or finds stages.
pub struct StageManager {
    config: EngineConfig,
    exit: ExitHandler,
    stages: Mutex<HashMap<String, StageHandle>>,
}

impl StageManager {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_exit_handler(config, default_exit_handler())
    }

    /// Registry with a custom fatal-failure hook (tests install a counting
    /// no-op instead of exiting the process).
    pub fn with_exit_handler(config: EngineConfig, exit: ExitHandler) -> Self {
        Self { config, exit, stages: Mutex::new(HashMap::new()) }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register and return a new stage. Fails if any stage already holds
    /// the name, whatever its context shape.
    pub fn create_stage<EC: EventContext>(
        &self,
        name: &str,
        handler: Arc<dyn EventHandler<EC>>,
        shard_count: usize,
        queue_capacity: usize,
    ) -> Result<Arc<Stage<EC>>, StageError> {
        let mut stages = self.stages.lock().expect("stage registry lock poisoned");
        if stages.contains_key(name) {
            return Err(StageError::DuplicateStage(name.to_string()));
        }

        let stage = Arc::new(Stage::new(
            name,
            handler,
            shard_count,
            queue_capacity,
            self.config.find_strategy,
            Duration::from_millis(self.config.poll_interval_ms),
            Arc::clone(&self.exit),
        ));
        stages.insert(
            name.to_string(),
            StageHandle {
                any: Arc::clone(&stage) as Arc<dyn Any + Send + Sync>,
                control: Arc::clone(&stage) as Arc<dyn StageControl>,
            },
        );
        tracing::debug!(stage = name, shard_count, queue_capacity, "stage registered");
        Ok(stage)
    }

    /// Lookup by name and context shape; `None` when the name is absent or
    /// registered with a different shape.
    pub fn get_stage<EC: EventContext>(&self, name: &str) -> Option<Arc<Stage<EC>>> {
        let stages = self.stages.lock().expect("stage registry lock poisoned");
        let handle = stages.get(name)?;
        Arc::clone(&handle.any).downcast::<Stage<EC>>().ok()
    }

    pub fn start_stage(&self, name: &str) -> Result<(), StageError> {
        let control = {
            let stages = self.stages.lock().expect("stage registry lock poisoned");
            stages
                .get(name)
                .map(|handle| Arc::clone(&handle.control))
                .ok_or_else(|| StageError::StageNotFound(name.to_string()))?
        };
        control.control_start()
    }

    /// Destroy a stage and drop its registration, so a fresh stage can be
    /// created under the same name later (`Destroyed` is terminal).
    pub fn destroy_stage(&self, name: &str) -> Result<(), StageError> {
        let handle = {
            let mut stages = self.stages.lock().expect("stage registry lock poisoned");
            stages.remove(name).ok_or_else(|| StageError::StageNotFound(name.to_string()))?
        };
        handle.control.control_destroy();
        Ok(())
    }

    /// Destroy every registered stage; used at process shutdown.
    pub fn stop_all(&self) {
        let drained: Vec<StageHandle> = {
            let mut stages = self.stages.lock().expect("stage registry lock poisoned");
            stages.drain().map(|(_, handle)| handle).collect()
        };
        for handle in drained {
            if handle.control.control_state() == StageState::Started {
                handle.control.control_destroy();
            }
        }
        tracing::info!("all stages stopped");
    }

    pub fn stage_names(&self) -> Vec<String> {
        let stages = self.stages.lock().expect("stage registry lock poisoned");
        stages.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_queue::{HandlerError, StageConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct Alpha;

    impl EventContext for Alpha {}

    #[derive(Clone)]
    struct Beta;

    impl EventContext for Beta {}

    #[derive(Default)]
    struct Noop {
        handled: AtomicUsize,
    }

    impl<EC: EventContext> EventHandler<EC> for Noop {
        fn handle_event(&self, _context: EC) -> Result<(), HandlerError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Initializing;

    impl EventHandler<Alpha> for Initializing {
        fn initialize(&self, config: &StageConfig) {
            assert_eq!(config.shard_count, 2);
        }

        fn handle_event(&self, _context: Alpha) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let manager = StageManager::new(EngineConfig::default());
        manager.create_stage::<Alpha>("dup", Arc::new(Noop::default()), 1, 16).unwrap();

        let second = manager.create_stage::<Beta>("dup", Arc::new(Noop::default()), 1, 16);
        assert!(matches!(second, Err(StageError::DuplicateStage(_))));
    }

    #[test]
    fn test_lookup_checks_context_shape() {
        let manager = StageManager::new(EngineConfig::default());
        manager.create_stage::<Alpha>("alpha", Arc::new(Noop::default()), 1, 16).unwrap();

        assert!(manager.get_stage::<Alpha>("alpha").is_some());
        assert!(manager.get_stage::<Beta>("alpha").is_none());
        assert!(manager.get_stage::<Alpha>("missing").is_none());
    }

    #[test]
    fn test_destroy_deregisters_the_name() {
        let manager = StageManager::new(EngineConfig::default());
        let stage =
            manager.create_stage::<Alpha>("cycle", Arc::new(Noop::default()), 1, 16).unwrap();
        stage.start().unwrap();

        manager.destroy_stage("cycle").unwrap();
        assert!(manager.get_stage::<Alpha>("cycle").is_none());

        // Recreation under the same name must succeed.
        manager.create_stage::<Alpha>("cycle", Arc::new(Noop::default()), 1, 16).unwrap();
    }

    #[test]
    fn test_destroy_unknown_stage_errors() {
        let manager = StageManager::new(EngineConfig::default());
        assert!(matches!(
            manager.destroy_stage("ghost"),
            Err(StageError::StageNotFound(_))
        ));
    }

    #[test]
    fn test_stop_all_destroys_started_stages() {
        let manager = StageManager::new(EngineConfig::default());
        let a = manager.create_stage::<Alpha>("a", Arc::new(Noop::default()), 1, 16).unwrap();
        let b = manager.create_stage::<Beta>("b", Arc::new(Noop::default()), 2, 16).unwrap();
        a.start().unwrap();
        b.start().unwrap();

        manager.stop_all();
        assert_eq!(a.state(), StageState::Destroyed);
        assert_eq!(b.state(), StageState::Destroyed);
        assert!(manager.stage_names().is_empty());
    }

    #[test]
    fn test_initialize_sees_stage_config() {
        let manager = StageManager::new(EngineConfig::default());
        let stage = manager.create_stage::<Alpha>("init", Arc::new(Initializing), 2, 32).unwrap();
        stage.start().unwrap();
        stage.destroy();
    }
}
