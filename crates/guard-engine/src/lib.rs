//! Risk evaluation engine.
//!
//! Each registered user gets a state actor that owns their
//! [`UserRiskState`](guard_core::UserRiskState). The [`RiskEngine`] fetches
//! snapshots, hands them to the actor for evaluation and delivers the
//! resulting findings. The [`Scheduler`] drives the engine on a timer.

mod actor;
pub mod engine;
pub mod evaluator;
pub mod recap;
pub mod retry;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use engine::{CycleOutcome, EngineSettings, RiskEngine};
pub use evaluator::{ActionEffect, CycleInput, CycleReport};
pub use retry::RetryPolicy;
pub use scheduler::{next_recap_at, Scheduler, SchedulerSettings};
