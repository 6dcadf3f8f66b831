//! Widget polling. The widget has no push channel, so it fetches the
//! replies addressed to its visitor.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use clinic_core::{
  channel::ChannelType,
  message::{ContentType, Direction, Message, MessageStatus, SenderType},
  store::{ConversationRepository, CustomerRepository, Store, TenantRepository},
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{AppState, error::Error};

#[derive(Debug, Deserialize)]
pub struct PollQuery {
  pub visitor: String,
  #[serde(default)]
  pub after:   Option<DateTime<Utc>>,
}

/// A reply as the widget renders it.
#[derive(Debug, Serialize)]
pub struct WidgetMessage {
  pub message_id:   Uuid,
  pub sender_type:  SenderType,
  pub content:      String,
  pub content_type: ContentType,
  pub media_url:    Option<String>,
  pub created_at:   DateTime<Utc>,
}

impl From<Message> for WidgetMessage {
  fn from(m: Message) -> Self {
    Self {
      message_id:   m.message_id,
      sender_type:  m.sender_type,
      content:      m.content,
      content_type: m.content_type,
      media_url:    m.media_url,
      created_at:   m.created_at,
    }
  }
}

/// `GET /widget/{account}/messages?visitor=&after=`
///
/// Customer-visible outbound messages of the visitor's open conversation,
/// oldest first. Returned messages count as delivered.
pub async fn messages<S>(
  State(state): State<AppState<S>>,
  Path(account_id): Path<String>,
  Query(query): Query<PollQuery>,
) -> Result<Json<Vec<WidgetMessage>>, Error>
where
  S: Store + 'static,
{
  let account = state
    .store
    .find_channel_account(ChannelType::Widget, account_id)
    .await
    .map_err(Error::store)?
    .filter(|a| a.active)
    .ok_or(Error::NotFound)?;

  let Some((customer, _)) = state
    .store
    .find_by_channel_identity(account.channel_account_id, query.visitor)
    .await
    .map_err(Error::store)?
  else {
    return Ok(Json(Vec::new()));
  };
  let Some(conversation) = state
    .store
    .find_open_conversation(customer.customer_id, account.tenant_id)
    .await
    .map_err(Error::store)?
  else {
    return Ok(Json(Vec::new()));
  };

  let service = state.processor.messages();
  let mut visible = Vec::new();
  for message in service
    .messages_after(conversation.conversation_id, query.after)
    .await?
  {
    if message.direction != Direction::Outbound || message.sender_type == SenderType::InternalNote {
      continue;
    }
    if message.status == MessageStatus::Sent
      && let Err(e) = service
        .update_status(message.message_id, MessageStatus::Delivered, None)
        .await
    {
      warn!(message_id = %message.message_id, error = %e, "widget delivery not recorded");
    }
    visible.push(WidgetMessage::from(message));
  }
  Ok(Json(visible))
}
