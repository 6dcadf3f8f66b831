//! Conversations: one CS thread between a customer and a tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConversationStatus {
  Active,
  Waiting,
  Escalated,
  Resolved,
  Open,
}

impl ConversationStatus {
  /// Every status except `resolved` counts as the customer's live thread.
  pub fn is_open(self) -> bool { !matches!(self, Self::Resolved) }

  /// A human owns the thread; the AI must stay quiet.
  pub fn awaits_human(self) -> bool { matches!(self, Self::Escalated | Self::Waiting) }
}

/// At most one non-resolved conversation exists per (customer, tenant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
  pub conversation_id:   Uuid,
  pub customer_id:       Uuid,
  pub tenant_id:         Uuid,
  pub status:            ConversationStatus,
  pub ai_enabled:        bool,
  pub assigned_agent_id: Option<Uuid>,
  pub last_message_at:   Option<DateTime<Utc>>,
  pub created_at:        DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_resolved_is_closed() {
    assert!(ConversationStatus::Open.is_open());
    assert!(ConversationStatus::Escalated.is_open());
    assert!(!ConversationStatus::Resolved.is_open());
    assert!(ConversationStatus::Waiting.awaits_human());
    assert!(!ConversationStatus::Active.awaits_human());
  }
}
