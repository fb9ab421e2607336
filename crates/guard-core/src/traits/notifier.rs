//! Notification sink trait definition.

use crate::error::NotifyError;
use crate::types::{RecapSummary, RiskFinding, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Receipt for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAck {
    /// Channel-specific message id, if the channel returns one
    pub message_id: Option<String>,
}

/// Outbound channel for alerts and recaps.
///
/// Inbound callbacks (acknowledge, cooldown, ...) come back as
/// [`crate::types::UserAction`] values routed to the engine.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one finding to the user.
    async fn deliver(&self, user: UserId, finding: &RiskFinding) -> Result<DeliveryAck, NotifyError>;

    /// Deliver the daily recap.
    async fn deliver_recap(&self, user: UserId, summary: &RecapSummary) -> Result<(), NotifyError>;

    /// Get the sink name.
    fn name(&self) -> &str;
}
