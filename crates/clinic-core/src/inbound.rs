//! The channel-independent message shapes exchanged with adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{channel::ChannelType, message::ContentType};

/// A normalised inbound message produced by a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedInboundMessage {
  pub channel_type:       ChannelType,
  /// The provider's account identifier (not the internal id).
  pub channel_account_id: String,
  pub channel_user_id:    String,
  pub channel_username:   Option<String>,
  pub text:               String,
  pub content_type:       ContentType,
  pub media_url:          Option<String>,
  /// Channel-native id, persisted as the message's `external_id`.
  pub message_id:         String,
  pub timestamp:          DateTime<Utc>,
  /// Channel-specific extras (sticker ids, coordinates, reply tokens,
  /// callback URLs); opaque to the pipeline.
  #[serde(default)]
  pub metadata:           serde_json::Value,
}

/// What the pipeline asks a channel to deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundPayload {
  pub channel_user_id: String,
  pub text:            String,
  pub content_type:    ContentType,
  pub media_url:       Option<String>,
  /// Copied from the triggering inbound message's metadata so adapters can
  /// use reply tokens or callback URLs.
  #[serde(default)]
  pub reply_context:   serde_json::Value,
}

impl OutboundPayload {
  pub fn text(channel_user_id: impl Into<String>, text: impl Into<String>) -> Self {
    Self {
      channel_user_id: channel_user_id.into(),
      text:            text.into(),
      content_type:    ContentType::Text,
      media_url:       None,
      reply_context:   serde_json::Value::Null,
    }
  }
}

/// Result of one outbound send. Sends never raise; failures are reported here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendResult {
  pub success:    bool,
  pub message_id: Option<String>,
  pub error:      Option<String>,
}

impl SendResult {
  pub fn ok(message_id: Option<String>) -> Self {
    Self { success: true, message_id, error: None }
  }

  pub fn failed(error: impl Into<String>) -> Self {
    Self { success: false, message_id: None, error: Some(error.into()) }
  }
}
