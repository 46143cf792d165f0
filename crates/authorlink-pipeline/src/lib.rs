//! Authorlink Pipeline - resumable task orchestration
//!
//! Connects blocking, profiling and decision into a batch runner with an
//! append-only task log, a result aggregate snapshot and a bounded
//! admission gate in front of the decision oracle.
//!
//! Author: hephaex@gmail.com

pub mod aggregate;
pub mod checkpoint;
pub mod gate;
pub mod orchestrator;

pub use aggregate::ResultAggregate;
pub use checkpoint::{Replay, TaskLog, TaskLogEntry};
pub use gate::RateLimitedOracle;
pub use orchestrator::{Inspection, RunSummary, TaskFailure, TaskOrchestrator, TaskStage};
