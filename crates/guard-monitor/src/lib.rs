//! Logging and alert rendering.

mod logging;
mod notifier;

pub use logging::setup_logging;
pub use notifier::{format_alert_history, format_finding, format_recap, LogNotifier};
