//! Pipeline execution: engine state machine, stage handlers, worker pool.

pub mod engine;
pub mod handlers;
pub mod worker;

pub use engine::{EngineConfig, PipelineEngine};
pub use handlers::{
    builtin_registry, HandlerRegistry, StageContext, StageHandler, StageOutput,
};
pub use worker::{WorkerPool, WorkerPoolConfig};
