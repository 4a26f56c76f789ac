//! Runtime
//!
//! Evaluation engine, the loop that drives it, timers, the authority-gated
//! actuation path, and the assembly of a complete runtime instance.

pub mod actuation;
pub mod driver;
pub mod engine;
pub mod executor;
pub mod instance;
pub mod scheduler;

pub use actuation::{
    ActuationGate, ActuationOutcome, DeviceSink, Dispatch, HttpDeviceSink, LoggingDeviceSink,
};
pub use driver::{EngineHandle, EngineRequest};
pub use engine::EvaluationEngine;
pub use executor::NodeExecutor;
pub use instance::{RuntimeInstance, RuntimeOptions};
pub use scheduler::{TimerHandle, TimerService};
