// EventQueue - bounded worker queues and shared pipeline contracts
#![allow(dead_code)]

mod context;
mod handler;
mod queue;
mod sink;

pub use context::{EventContext, OrderedContext, SchedulingKey, SequenceId};
pub use handler::{EventHandler, HandlerError, StageConfig};
pub use queue::{QueueClosed, QueueFactory, RolloverHint, WorkerQueue};
pub use sink::EventSink;
