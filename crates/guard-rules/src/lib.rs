//! Risk rules for open positions.
//!
//! Provides the rule configuration, the HIGH_RISK formula, the four rules
//! and the dispatch table that runs them in a fixed order.

mod config;
mod high_risk;
mod liquidation;
mod no_stop_loss;
mod revenge;
mod rule_set;

pub use config::{RiskFormula, RuleConfig};
pub use rule_set::{rule_fn, RuleContext, RuleFn, RuleSet};
