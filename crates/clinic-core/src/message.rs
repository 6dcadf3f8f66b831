//! Messages and their delivery status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, language::LanguageCode};

// ─── Enums ───────────────────────────────────────────────────────────────────

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
pub enum Direction {
  Inbound,
  Outbound,
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SenderType {
  Customer,
  Agent,
  Ai,
  InternalNote,
  System,
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
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
pub enum ContentType {
  #[default]
  Text,
  Image,
  Video,
  Audio,
  File,
  Sticker,
  Location,
}

/// Delivery status. Transitions only move forward:
/// `pending → processing → sent | failed`, `sent → delivered`.
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
pub enum MessageStatus {
  Pending,
  Processing,
  Sent,
  Delivered,
  Failed,
}

impl MessageStatus {
  pub fn can_transition_to(self, next: MessageStatus) -> bool {
    use MessageStatus::*;
    matches!(
      (self, next),
      (Pending, Processing)
        | (Pending, Failed)
        | (Processing, Sent)
        | (Processing, Failed)
        | (Sent, Delivered)
    )
  }

  /// Validate a transition. Re-applying the current status is an idempotent
  /// no-op (provider callbacks are delivered at least once), reported as
  /// `Ok(false)`.
  pub fn check_transition(self, next: MessageStatus) -> Result<bool> {
    if self == next {
      return Ok(false);
    }
    if self.can_transition_to(next) {
      Ok(true)
    } else {
      Err(Error::InvalidStatusTransition { from: self, to: next })
    }
  }
}

// ─── Message ─────────────────────────────────────────────────────────────────

/// One inbound or outbound unit within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
  pub message_id:          Uuid,
  pub conversation_id:     Uuid,
  pub direction:           Direction,
  pub sender_type:         SenderType,
  pub content:             String,
  pub content_type:        ContentType,
  pub media_url:           Option<String>,
  pub original_language:   Option<LanguageCode>,
  pub translated_content:  Option<String>,
  pub translated_language: Option<LanguageCode>,
  /// Only set on AI-authored outbound messages.
  pub ai_confidence:       Option<f32>,
  pub ai_model:            Option<String>,
  pub status:              MessageStatus,
  /// Channel-native message id, used for duplicate suppression and delivery
  /// receipts.
  pub external_id:         Option<String>,
  pub created_at:          DateTime<Utc>,
}

/// Input to [`crate::store::MessageRepository::insert_message`].
/// `message_id` and `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
  pub conversation_id:     Uuid,
  pub direction:           Direction,
  pub sender_type:         SenderType,
  pub content:             String,
  pub content_type:        ContentType,
  pub media_url:           Option<String>,
  pub original_language:   Option<LanguageCode>,
  pub translated_content:  Option<String>,
  pub translated_language: Option<LanguageCode>,
  pub ai_confidence:       Option<f32>,
  pub ai_model:            Option<String>,
  pub status:              MessageStatus,
  pub external_id:         Option<String>,
}

impl NewMessage {
  /// A customer message as received from a channel.
  pub fn inbound(conversation_id: Uuid, content: impl Into<String>) -> Self {
    Self {
      conversation_id,
      direction: Direction::Inbound,
      sender_type: SenderType::Customer,
      content: content.into(),
      content_type: ContentType::Text,
      media_url: None,
      original_language: None,
      translated_content: None,
      translated_language: None,
      ai_confidence: None,
      ai_model: None,
      status: MessageStatus::Delivered,
      external_id: None,
    }
  }

  /// An outbound message awaiting its send.
  pub fn outbound(
    conversation_id: Uuid,
    sender_type: SenderType,
    content: impl Into<String>,
  ) -> Self {
    Self {
      direction: Direction::Outbound,
      sender_type,
      status: MessageStatus::Pending,
      ..Self::inbound(conversation_id, content)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn forward_transitions_are_allowed() {
    use MessageStatus::*;
    assert!(Pending.can_transition_to(Processing));
    assert!(Processing.can_transition_to(Sent));
    assert!(Processing.can_transition_to(Failed));
    assert!(Sent.can_transition_to(Delivered));
  }

  #[test]
  fn backward_transitions_are_rejected() {
    use MessageStatus::*;
    assert!(!Sent.can_transition_to(Pending));
    assert!(!Delivered.can_transition_to(Sent));
    assert!(!Failed.can_transition_to(Processing));
    assert!(matches!(
      Delivered.check_transition(Processing),
      Err(Error::InvalidStatusTransition { .. })
    ));
  }

  #[test]
  fn same_status_is_a_noop() {
    assert!(!MessageStatus::Delivered.check_transition(MessageStatus::Delivered).unwrap());
    assert!(MessageStatus::Sent.check_transition(MessageStatus::Delivered).unwrap());
  }

  #[test]
  fn outbound_defaults_to_pending() {
    let m = NewMessage::outbound(Uuid::nil(), SenderType::Ai, "hi");
    assert_eq!(m.direction, Direction::Outbound);
    assert_eq!(m.status, MessageStatus::Pending);
    assert_eq!(m.sender_type, SenderType::Ai);
  }
}
