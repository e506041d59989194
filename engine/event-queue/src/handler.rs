use thiserror::Error;

/// Per-stage configuration handed to the handler when the stage starts.
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub name: String,
    pub shard_count: usize,
    pub queue_capacity: usize,
}

/// Failure raised from a processing callback.
///
/// `ClusterNotRunning` is the one expected condition: the dispatch loop
/// logs it and keeps the worker thread alive. Everything else is treated as
/// a corrupted invariant and routed to the engine's exit hook.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("cluster not running: {0}")]
    ClusterNotRunning(String),

    #[error("event handler failure: {0}")]
    Fatal(String),

    #[error("event handler failure")]
    FatalSource(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, HandlerError::ClusterNotRunning(_))
    }
}

/// Processing callback driven by a stage's consumer threads.
///
/// One handler instance is shared by every worker thread of its stage, so
/// implementations keep per-entity state behind the scheduling-key
/// guarantee (equal keys are never processed concurrently) or behind their
/// own synchronization. A handler may submit new contexts to other stages;
/// the pipeline's control flow is a directed graph of stages.
pub trait EventHandler<EC>: Send + Sync {
    /// Called once, before any worker thread starts.
    fn initialize(&self, _config: &StageConfig) {}

    fn handle_event(&self, context: EC) -> Result<(), HandlerError>;

    /// Called after every worker thread has been joined.
    fn destroy(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_not_running_is_recoverable() {
        let err = HandlerError::ClusterNotRunning("replica left".into());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_other_errors_are_fatal() {
        let err = HandlerError::Fatal("corrupt object graph".into());
        assert!(!err.is_recoverable());

        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = HandlerError::from(Box::new(io) as Box<dyn std::error::Error + Send + Sync>);
        assert!(!err.is_recoverable());
    }
}
