//! Deterministic scenario replay.

use anyhow::{Context, Result};
use guard_config::AppConfig;
use guard_core::traits::StateStore;
use guard_core::types::{RiskFinding, UserId};
use guard_exchange::Scenario;
use guard_store::MemoryStore;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::open_store;
use crate::cli::replay::Replay;
use crate::cli::{EvaluateArgs, OutputFormat};

pub async fn run(args: EvaluateArgs, config: AppConfig) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)
        .with_context(|| format!("Failed to load scenario {}", args.scenario.display()))?;
    let store: Arc<dyn StateStore> = if args.persist {
        open_store(&config.store)?
    } else {
        Arc::new(MemoryStore::new())
    };
    let text = args.output == OutputFormat::Text;
    let shown = |user: UserId| args.user.map_or(true, |u| u == user.0);

    let replay = Replay::new(scenario, &config, store, false).await?;
    let users = replay.scenario.user_ids();
    let mut findings: BTreeMap<UserId, Vec<(u32, RiskFinding)>> = BTreeMap::new();

    let mut last = None;
    for minute in replay.scenario.ticks() {
        replay.apply_steps(last, minute).await?;
        replay.advance_to(minute);

        for &user in &users {
            match replay.engine.evaluate_once(user).await {
                Ok(outcome) => {
                    if text && shown(user) {
                        for finding in &outcome.findings {
                            println!("[minute {:>3}] user {}", minute, user);
                            println!("{}\n", guard_monitor::format_finding(finding));
                        }
                    }
                    findings
                        .entry(user)
                        .or_default()
                        .extend(outcome.findings.into_iter().map(|f| (minute, f)));
                }
                Err(e) => warn!(minute, user = %user, error = %e, "Cycle failed"),
            }
        }
        last = Some(minute);
    }

    let mut report = Vec::new();
    for &user in users.iter().filter(|u| shown(**u)) {
        let state = replay.engine.get_state(user).await?;
        let user_findings = findings.remove(&user).unwrap_or_default();
        match args.output {
            OutputFormat::Text => {
                println!(
                    "User {}: {} findings, score {}",
                    user,
                    user_findings.len(),
                    state.score()
                );
            }
            OutputFormat::Json => report.push(json!({
                "user": user,
                "score": state.score(),
                "violations_by_rule": state.violations_by_rule,
                "pending_ack": state.pending_ack.len(),
                "findings": user_findings
                    .iter()
                    .map(|(minute, f)| json!({ "minute": minute, "finding": f }))
                    .collect::<Vec<_>>(),
            })),
        }
    }
    if args.output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    replay.engine.shutdown().await;
    info!("Evaluation complete");
    Ok(())
}
