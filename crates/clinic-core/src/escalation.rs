//! Escalations: hand-offs of a conversation to a human agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EscalationPriority {
  Low,
  #[default]
  Normal,
  High,
  Urgent,
}

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
pub enum EscalationStatus {
  Pending,
  Assigned,
  Resolved,
}

/// A record that a conversation needs human attention. At most one exists per
/// triggering message (enforced by a unique index in the store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
  pub escalation_id:   Uuid,
  pub conversation_id: Uuid,
  pub message_id:      Option<Uuid>,
  pub reason:          String,
  pub ai_confidence:   Option<f32>,
  pub priority:        EscalationPriority,
  pub status:          EscalationStatus,
  pub created_at:      DateTime<Utc>,
}

/// Input to [`crate::store::EscalationRepository::insert_escalation`].
#[derive(Debug, Clone)]
pub struct NewEscalation {
  pub conversation_id: Uuid,
  pub message_id:      Option<Uuid>,
  pub reason:          String,
  pub ai_confidence:   Option<f32>,
  pub priority:        EscalationPriority,
}

/// Payload handed to the notification sink after an escalation is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
  pub escalation_id:   Uuid,
  pub conversation_id: Uuid,
  pub tenant_id:       Uuid,
  pub tenant_name:     String,
  pub customer_id:     Uuid,
  pub customer_name:   Option<String>,
  pub priority:        EscalationPriority,
  pub reason:          String,
  pub ai_confidence:   Option<f32>,
}
