// StageCoordinator - stage worker pools, registry, and lifecycle FSM
#![allow(dead_code)]

mod controller;
mod manager;
mod stage;
mod types;


pub use controller::{StageController, TransitionTrigger};
pub use manager::{StageControl, StageManager};
pub use stage::Stage;
pub use types::{default_exit_handler, EngineConfig, ExitHandler, StageError, StageState};

// Re-export the contracts producers and handlers are written against
pub use event_queue::{
    EventContext, EventHandler, EventSink, HandlerError, OrderedContext, SchedulingKey,
    SequenceId, StageConfig,
};
pub use stage_router::{FindStrategy, OrderedSink, StageQueue};
