//! `GET /conversations/:id/messages[?after=<rfc3339>]`, oldest first.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use clinic_core::{
  message::Message,
  store::{ConversationRepository, MessageRepository},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize, Default)]
pub struct MessageParams {
  /// Only messages created strictly after this instant.
  pub after: Option<DateTime<Utc>>,
}

pub async fn messages<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<MessageParams>,
) -> Result<Json<Vec<Message>>, ApiError>
where
  S: ConversationRepository + MessageRepository,
{
  store
    .get_conversation(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("conversation {id} not found")))?;

  let messages = store
    .messages_after(id, params.after)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(messages))
}
