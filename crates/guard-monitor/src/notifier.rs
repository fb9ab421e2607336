//! Text rendering and a logging notification sink.

use async_trait::async_trait;
use guard_core::error::NotifyError;
use guard_core::traits::{DeliveryAck, NotificationSink};
use guard_core::types::{RecapSummary, RiskFinding, UserId, UserRiskState};
use std::fmt::Write;
use tracing::info;

/// Render a finding as a multi-line alert message.
pub fn format_finding(finding: &RiskFinding) -> String {
    let mut out = String::new();
    let test = if finding.test { " (TEST)" } else { "" };
    let _ = writeln!(
        out,
        "[{}] {}{} - {}",
        finding.severity.to_string().to_uppercase(),
        finding.rule.name(),
        test,
        finding.symbol
    );
    let _ = writeln!(out, "{}", finding.reason);

    if let Some(ctx) = &finding.context {
        let _ = writeln!(
            out,
            "Position: {} {} @ {} ({}x), PnL {:.2}",
            ctx.side, ctx.size, ctx.mark_price, ctx.leverage, ctx.unrealized_pnl
        );
    }
    if let Some(suggestion) = &finding.suggestion {
        let _ = writeln!(out, "Suggestion: {}", suggestion);
    }

    let actions: Vec<&str> = finding
        .rule
        .suggested_actions()
        .iter()
        .map(|a| a.label())
        .collect();
    let _ = writeln!(out, "Actions: {}", actions.join(" | "));
    let _ = write!(out, "Ref: {}", finding.short_ref());
    out
}

/// Render a daily recap.
pub fn format_recap(summary: &RecapSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Daily Recap - {} (user {})", summary.date, summary.user);
    let _ = writeln!(out, "Score: {}", summary.score);
    let _ = writeln!(out, "Violations: {}", summary.violation_count);
    for (rule, count) in &summary.top_violations {
        let _ = writeln!(out, "  {}: {}", rule.name(), count);
    }
    let _ = writeln!(out, "Positive actions: {}", summary.positive_action_count);
    for (kind, count) in &summary.actions_by_kind {
        if kind.is_positive() {
            let _ = writeln!(out, "  {}: {}", kind.label(), count);
        }
    }
    if summary.unacknowledged > 0 {
        let _ = writeln!(out, "Unacknowledged alerts: {}", summary.unacknowledged);
    }
    let _ = write!(out, "Focus tomorrow: {}", summary.focus);
    out
}

/// Render the newest `limit` recorded findings, newest first, one per line.
pub fn format_alert_history(state: &UserRiskState, limit: usize) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "Recent alerts ({} of {}):",
        limit.min(state.recent_findings.len()),
        state.recent_findings.len()
    );
    for finding in state.recent_findings.iter().rev().take(limit) {
        let pending = if state.pending_ack.contains(&finding.id) {
            " (unacknowledged)"
        } else {
            ""
        };
        let _ = write!(
            out,
            "\n  {} [{}] {} {}: {} ref {}{}",
            finding.generated_at.format("%Y-%m-%d %H:%M"),
            finding.severity.to_string().to_uppercase(),
            finding.rule.name(),
            finding.symbol,
            finding.reason,
            finding.short_ref(),
            pending
        );
    }
    out
}

/// Notification sink that writes alerts to the log and, optionally, stdout.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    echo: bool,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also print rendered messages to stdout.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn deliver(&self, user: UserId, finding: &RiskFinding) -> Result<DeliveryAck, NotifyError> {
        info!(
            target: "guard::alerts",
            user = %user,
            finding = %finding.id,
            rule = %finding.rule,
            severity = %finding.severity,
            symbol = %finding.symbol,
            test = finding.test,
            "{}",
            finding.reason
        );
        if self.echo {
            println!("{}\n", format_finding(finding));
        }
        Ok(DeliveryAck {
            message_id: Some(finding.short_ref()),
        })
    }

    async fn deliver_recap(&self, user: UserId, summary: &RecapSummary) -> Result<(), NotifyError> {
        info!(
            target: "guard::alerts",
            user = %user,
            score = summary.score.value,
            tier = %summary.score.tier,
            violations = summary.violation_count,
            "Daily recap"
        );
        if self.echo {
            println!("{}\n", format_recap(summary));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
