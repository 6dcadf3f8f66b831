//! Message persistence and status tracking.
//!
//! Every write that a realtime consumer cares about goes through here so the
//! matching [`PipelineEvent`] is emitted exactly once, after the row exists.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clinic_core::{
  conversation::{Conversation, ConversationStatus},
  event::{EventSink, PipelineEvent},
  inbound::UnifiedInboundMessage,
  language::LanguageCode,
  message::{Direction, Message, MessageStatus, NewMessage, SenderType},
  store::{ConversationRepository, Inserted, MessageRepository},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Error, Result};

/// An AI answer about to be sent.
#[derive(Debug, Clone)]
pub struct AiMessage {
  /// The text the customer receives.
  pub content:      String,
  pub language:     LanguageCode,
  /// The working-language answer, when `content` is a translation of it.
  pub working_text: Option<(String, LanguageCode)>,
  pub confidence:   f32,
  pub model:        String,
}

pub struct MessageService<S> {
  store:  Arc<S>,
  events: Arc<dyn EventSink>,
}

impl<S> Clone for MessageService<S> {
  fn clone(&self) -> Self { Self { store: self.store.clone(), events: self.events.clone() } }
}

impl<S> MessageService<S>
where
  S: MessageRepository + ConversationRepository,
{
  pub fn new(store: Arc<S>, events: Arc<dyn EventSink>) -> Self { Self { store, events } }

  /// Persist a customer message. A redelivered event with the same
  /// channel-native id returns the existing row as [`Inserted::Existing`].
  pub async fn create_inbound(
    &self,
    conversation: &Conversation,
    inbound: &UnifiedInboundMessage,
    language: Option<LanguageCode>,
  ) -> Result<Inserted<Message>> {
    let message = NewMessage {
      content_type: inbound.content_type,
      media_url: inbound.media_url.clone(),
      original_language: language,
      external_id: Some(inbound.message_id.clone()).filter(|id| !id.is_empty()),
      ..NewMessage::inbound(conversation.conversation_id, inbound.text.clone())
    };
    let inserted = self.store.insert_message(message).await.map_err(Error::store)?;
    if inserted.is_created() {
      self.created(conversation, inserted.get()).await;
    } else {
      debug!(
        conversation_id = %conversation.conversation_id,
        external_id = %inbound.message_id,
        "inbound message already stored"
      );
    }
    Ok(inserted)
  }

  /// Persist an AI answer as a pending outbound message.
  pub async fn create_ai_message(
    &self,
    conversation: &Conversation,
    reply: AiMessage,
  ) -> Result<Message> {
    let (translated_content, translated_language) = match reply.working_text {
      Some((text, lang)) => (Some(text), Some(lang)),
      None => (None, None),
    };
    let message = NewMessage {
      original_language: Some(reply.language),
      translated_content,
      translated_language,
      ai_confidence: Some(reply.confidence),
      ai_model: Some(reply.model),
      ..NewMessage::outbound(conversation.conversation_id, SenderType::Ai, reply.content)
    };
    self.insert_outbound(conversation, message).await
  }

  /// Persist a non-AI outbound message (agent reply or system placeholder).
  pub async fn create_outbound(
    &self,
    conversation: &Conversation,
    sender_type: SenderType,
    content: impl Into<String>,
    language: Option<LanguageCode>,
  ) -> Result<Message> {
    let message = NewMessage {
      original_language: language,
      ..NewMessage::outbound(conversation.conversation_id, sender_type, content)
    };
    self.insert_outbound(conversation, message).await
  }

  async fn insert_outbound(&self, conversation: &Conversation, message: NewMessage) -> Result<Message> {
    // Outbound rows carry no external id yet, so the insert never dedups.
    let message = self
      .store
      .insert_message(message)
      .await
      .map_err(Error::store)?
      .into_inner();
    self.created(conversation, &message).await;
    Ok(message)
  }

  /// The row exists from here on; a stale `last_message_at` is only logged.
  async fn created(&self, conversation: &Conversation, message: &Message) {
    if let Err(e) = self
      .store
      .touch_conversation(conversation.conversation_id, message.created_at)
      .await
    {
      warn!(
        conversation_id = %conversation.conversation_id,
        message_id = %message.message_id,
        error = %e,
        "failed to bump conversation activity"
      );
    }
    self.events.emit(PipelineEvent::MessageCreated {
      tenant_id: conversation.tenant_id,
      message:   message.clone(),
    });
  }

  /// Forward-only status change.
  pub async fn update_status(
    &self,
    message_id: Uuid,
    status: MessageStatus,
    external_id: Option<String>,
  ) -> Result<Message> {
    self
      .store
      .update_message_status(message_id, status, external_id)
      .await
      .map_err(Error::store)
  }

  pub async fn update_translation(
    &self,
    message_id: Uuid,
    text: String,
    language: LanguageCode,
  ) -> Result<Message> {
    self
      .store
      .update_translation(message_id, text, language)
      .await
      .map_err(Error::store)
  }

  /// Apply a delivery receipt. Unknown ids and messages not in `sent` are
  /// ignored.
  pub async fn mark_delivered(&self, external_id: &str) -> Result<Option<Message>> {
    let Some(message) = self
      .store
      .find_by_external_id(Direction::Outbound, external_id.to_owned())
      .await
      .map_err(Error::store)?
    else {
      debug!(%external_id, "delivery receipt for unknown message");
      return Ok(None);
    };
    if message.status != MessageStatus::Sent {
      debug!(%external_id, status = %message.status, "ignoring delivery receipt");
      return Ok(None);
    }
    self
      .update_status(message.message_id, MessageStatus::Delivered, None)
      .await
      .map(Some)
  }

  /// Change the conversation's status, emitting an event when it moved.
  pub async fn set_conversation_status(
    &self,
    conversation: &Conversation,
    status: ConversationStatus,
  ) -> Result<Conversation> {
    let updated = self
      .store
      .set_conversation_status(conversation.conversation_id, status)
      .await
      .map_err(Error::store)?;
    if conversation.status != status {
      self.events.emit(PipelineEvent::ConversationStatusChanged {
        tenant_id: updated.tenant_id,
        conversation_id: updated.conversation_id,
        status,
      });
    }
    Ok(updated)
  }

  /// Messages of a conversation after `after`, oldest first.
  pub async fn messages_after(
    &self,
    conversation_id: Uuid,
    after: Option<DateTime<Utc>>,
  ) -> Result<Vec<Message>> {
    self
      .store
      .messages_after(conversation_id, after)
      .await
      .map_err(Error::store)
  }
}
