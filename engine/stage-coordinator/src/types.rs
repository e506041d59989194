use stage_router::FindStrategy;
use std::sync::Arc;
use thiserror::Error;

/// Lifecycle of a stage. `Destroyed` is terminal: a fresh stage must be
/// created to run the same work again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Uncreated,
    Started,
    Destroyed,
}

/// Error types from stage lifecycle management
#[derive(Debug, Error)]
pub enum StageError {
    #[error("stage `{0}` already registered")]
    DuplicateStage(String),

    #[error("stage `{0}` not found")]
    StageNotFound(String),

    #[error("stage `{0}` cannot start from state {1:?}")]
    InvalidLifecycle(String, StageState),

    #[error("failed to spawn worker thread for stage `{0}`")]
    SpawnFailed(String, #[source] std::io::Error),
}

/// Engine-wide defaults applied to every stage the manager creates.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub find_strategy: FindStrategy,
    /// How long an idle worker parks before re-checking for shutdown.
    pub poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { find_strategy: FindStrategy::Rollover, poll_interval_ms: 100 }
    }
}

/// Process-wide escalation hook invoked when a handler fails fatally.
///
/// The default logs and exits the process; tests install a counting no-op.
pub type ExitHandler = Arc<dyn Fn(&str) + Send + Sync>;

pub fn default_exit_handler() -> ExitHandler {
    Arc::new(|reason| {
        tracing::error!(reason, "unrecoverable pipeline failure, exiting");
        std::process::exit(2);
    })
}
