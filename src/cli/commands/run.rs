//! Accelerated real-time replay driven by the polling scheduler.

use anyhow::{Context, Result};
use guard_config::AppConfig;
use guard_core::traits::Clock;
use guard_engine::{next_recap_at, Scheduler, SchedulerSettings};
use guard_exchange::Scenario;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use super::open_store;
use crate::cli::replay::Replay;
use crate::cli::RunArgs;

pub async fn run(args: RunArgs, config: AppConfig) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)
        .with_context(|| format!("Failed to load scenario {}", args.scenario.display()))?;
    let minute = Duration::from_secs(args.minute_secs.max(1));

    let replay = Replay::new(scenario, &config, open_store(&config.store)?, true).await?;
    let recap_hour = config.scheduler.daily_recap_hour;
    let settings = SchedulerSettings {
        poll_interval: minute * replay.scenario.poll_minutes,
        recap_hour,
    };
    let scheduler = Scheduler::new(Arc::clone(&replay.engine), settings);

    replay.apply_steps(None, 0).await?;
    for user in replay.scenario.user_ids() {
        scheduler.start_user(user).await?;
    }
    info!(
        minutes = replay.scenario.duration_minutes,
        minute_secs = minute.as_secs(),
        "Replay started, press Ctrl+C to stop"
    );

    let mut next_recap = next_recap_at(replay.clock.now(), recap_hour);
    let mut ticker = interval(minute);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    for at in 1..=replay.scenario.duration_minutes {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {}
        }

        replay.apply_steps(Some(at - 1), at).await?;
        replay.advance_to(at);
        if replay.clock.now() >= next_recap {
            replay.recap().await;
            next_recap = next_recap_at(replay.clock.now(), recap_hour);
        }
    }

    scheduler.shutdown().await;
    for user in replay.scenario.user_ids() {
        info!(user = %user, open = replay.exchange.open_positions(user).len(), "Replay finished");
    }
    Ok(())
}
