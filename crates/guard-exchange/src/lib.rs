//! Exchange sources.
//!
//! Only a simulated source ships here: [`PaperExchange`] keeps accounts in
//! memory and is driven either programmatically or by a [`Scenario`].

mod paper;
mod scenario;

pub use paper::PaperExchange;
pub use scenario::{FailureKind, Scenario, ScenarioError, ScenarioEvent, ScenarioStep, ScenarioUser, StepEffect};
