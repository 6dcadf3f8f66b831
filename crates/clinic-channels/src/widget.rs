//! The embeddable web chat widget.
//!
//! The widget posts JSON signed with the widget secret (hex HMAC-SHA256).
//! Replies are not pushed; the widget polls for outbound messages.

use chrono::Utc;
use clinic_core::{
  channel::ChannelType,
  inbound::UnifiedInboundMessage,
  message::ContentType,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{Error, Result, signature};

pub const SIGNATURE_HEADER: &str = "x-widget-signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WidgetMessage {
  widget_id:    String,
  visitor_id:   String,
  #[serde(default)]
  visitor_name: Option<String>,
  text:         String,
  #[serde(default)]
  message_id:   Option<String>,
  #[serde(default)]
  language:     Option<String>,
}

pub fn validate_signature(body: &[u8], signature: &str, widget_secret: &str) -> bool {
  signature::verify_hmac_hex(body, signature, widget_secret)
}

pub fn parse_webhook(body: &[u8]) -> Result<Vec<UnifiedInboundMessage>> {
  let msg: WidgetMessage = serde_json::from_slice(body)?;
  if msg.visitor_id.trim().is_empty() {
    return Err(Error::invalid("widget", "empty visitorId"));
  }

  let mut metadata = json!({});
  if let Some(lang) = msg.language {
    metadata["browser_language"] = json!(lang);
  }

  Ok(vec![UnifiedInboundMessage {
    channel_type: ChannelType::Widget,
    channel_account_id: msg.widget_id,
    channel_user_id: msg.visitor_id,
    channel_username: msg.visitor_name,
    text: msg.text,
    content_type: ContentType::Text,
    media_url: None,
    // Older embeds send no id; those messages are not deduplicated.
    message_id: msg
      .message_id
      .unwrap_or_else(|| format!("widget:{}", Uuid::new_v4())),
    timestamp: Utc::now(),
    metadata,
  }])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_visitor_message() {
    let body = br#"{"widgetId":"w-1","visitorId":"v-1","visitorName":"Anna","text":"Hi","messageId":"c-1","language":"ru-RU"}"#;
    let msgs = parse_webhook(body).unwrap();
    assert_eq!(msgs[0].channel_account_id, "w-1");
    assert_eq!(msgs[0].channel_username.as_deref(), Some("Anna"));
    assert_eq!(msgs[0].message_id, "c-1");
    assert_eq!(msgs[0].metadata["browser_language"], "ru-RU");
  }

  #[test]
  fn missing_id_is_generated() {
    let body = br#"{"widgetId":"w-1","visitorId":"v-1","text":"Hi"}"#;
    let msgs = parse_webhook(body).unwrap();
    assert!(msgs[0].message_id.starts_with("widget:"));
  }

  #[test]
  fn empty_visitor_is_rejected() {
    let body = br#"{"widgetId":"w-1","visitorId":" ","text":"Hi"}"#;
    assert!(parse_webhook(body).is_err());
  }
}
