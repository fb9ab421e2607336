//! Deliver a sample alert.

use anyhow::Result;
use guard_config::AppConfig;
use guard_core::traits::SystemClock;
use guard_core::types::UserId;
use guard_engine::RiskEngine;
use guard_exchange::PaperExchange;
use guard_monitor::LogNotifier;
use guard_rules::RuleSet;
use std::sync::Arc;

use super::open_store;
use crate::cli::TestAlertArgs;

pub async fn run(args: TestAlertArgs, config: AppConfig) -> Result<()> {
    let user = UserId(args.user);
    let clock = Arc::new(SystemClock);

    let engine = RiskEngine::new(
        RuleSet::new(config.rules.clone()),
        Arc::new(PaperExchange::new(clock.clone())),
        Arc::new(LogNotifier::new().with_echo(true)),
        open_store(&config.store)?,
        clock,
    )
    .with_settings(config.scheduler.engine_settings());

    engine.register_user(user).await?;
    let result = engine.trigger_test_finding(user).await;
    engine.shutdown().await;

    let finding = result?;
    println!("Test alert delivered to user {} (ref {})", user, finding.short_ref());
    Ok(())
}
