//! Core types and traits for the risk guard.
//!
//! This crate provides the foundational building blocks including:
//! - Position snapshots and protective orders
//! - Risk findings, trade outcomes and user actions
//! - Per-user risk state and the discipline score
//! - Collaborator traits for the exchange, notifications, storage and time

pub mod types;
pub mod traits;
pub mod error;

pub use error::{GuardError, GuardResult};
pub use types::*;
pub use traits::*;
