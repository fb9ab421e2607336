//! Show a stored discipline score.

use anyhow::{bail, Result};
use guard_config::{AppConfig, StoreKind};
use guard_core::traits::StateStore;
use guard_core::types::UserId;
use guard_monitor::{format_alert_history, format_recap};
use guard_store::JsonFileStore;

use crate::cli::ScoreArgs;

pub async fn run(args: ScoreArgs, config: AppConfig) -> Result<()> {
    if config.store.kind != StoreKind::Json {
        bail!("The memory store keeps nothing between runs; set store.kind = \"json\"");
    }

    let user = UserId(args.user);
    let store = JsonFileStore::open(config.store.path.clone())?;

    let Some(state) = store.load_state(user).await? else {
        println!("No state stored for user {}", user);
        return Ok(());
    };

    println!("User {}", user);
    println!("Score: {}", state.score());
    println!("Violations today: {}", state.violation_count);
    for (rule, count) in &state.violations_by_rule {
        println!("  {}: {}", rule.name(), count);
    }
    println!("Positive actions today: {}", state.positive_action_count);
    println!("Unacknowledged alerts: {}", state.pending_ack.len());
    for (symbol, until) in &state.cooldown_until {
        println!("Cooldown on {} until {}", symbol, until);
    }
    if args.alerts > 0 && !state.recent_findings.is_empty() {
        println!();
        println!("{}", format_alert_history(&state, args.alerts));
    }

    if let Some(last) = store.load_recaps(user).await?.last() {
        println!();
        println!("{}", format_recap(last));
    }

    Ok(())
}
