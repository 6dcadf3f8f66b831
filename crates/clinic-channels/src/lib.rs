//! Channel adapters: turn provider webhooks into [`UnifiedInboundMessage`]s
//! and [`OutboundPayload`]s into provider send requests.
//!
//! Each provider module exposes the same three pieces:
//! - `validate_signature(body, signature, secret) -> bool`, which never fails
//! - `parse_webhook(body)`, yielding zero or more normalised messages
//! - `outbound_request(account, payload)`, describing the provider call
//!
//! The free functions in this module dispatch on [`ChannelType`].
//! [`HttpChannelSender`] executes outbound requests.

pub mod error;
pub mod kakao;
pub mod line;
pub mod meta;
pub mod signature;
pub mod wechat;
pub mod widget;

mod send;

use chrono::{DateTime, Utc};
use clinic_core::{
  channel::{ChannelAccount, ChannelCredentials, ChannelType},
  inbound::{OutboundPayload, UnifiedInboundMessage},
};
use serde_json::Value;

pub use error::{Error, Result};
pub use send::HttpChannelSender;

// ─── Shared shapes ───────────────────────────────────────────────────────────

/// A provider notice that an outbound message reached the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
  /// Channel-native id of the outbound message.
  pub external_id: String,
}

/// Everything one webhook body carried.
#[derive(Debug, Clone, Default)]
pub struct ParsedWebhook {
  pub messages: Vec<UnifiedInboundMessage>,
  pub receipts: Vec<DeliveryReceipt>,
}

impl From<Vec<UnifiedInboundMessage>> for ParsedWebhook {
  fn from(messages: Vec<UnifiedInboundMessage>) -> Self {
    Self { messages, receipts: Vec::new() }
  }
}

/// A provider REST call.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
  pub url:    String,
  pub bearer: Option<String>,
  pub body:   Value,
}

/// How an outbound payload reaches the customer.
#[derive(Debug, Clone)]
pub enum Delivery {
  Http(OutboundRequest),
  /// Carried by the webhook response or picked up by polling; nothing to
  /// call.
  InBand,
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

/// Parse a webhook body for `channel_type`. The three Meta channel types
/// share one parser that reads the actual type from the payload.
pub fn parse_webhook(channel_type: ChannelType, body: &[u8]) -> Result<ParsedWebhook> {
  match channel_type {
    ChannelType::Line => line::parse_webhook(body).map(Into::into),
    ChannelType::Kakao => kakao::parse_webhook(body).map(Into::into),
    ChannelType::Facebook | ChannelType::Instagram | ChannelType::Whatsapp => {
      meta::parse_webhook(body)
    }
    ChannelType::Wechat => wechat::parse_webhook(body).map(Into::into),
    ChannelType::Widget => widget::parse_webhook(body).map(Into::into),
  }
}

/// Verify a webhook with the scheme `channel_type` uses. Missing credentials
/// fail verification.
pub fn validate_signature(
  channel_type: ChannelType,
  body: &[u8],
  signature: &str,
  credentials: &ChannelCredentials,
) -> bool {
  match channel_type {
    ChannelType::Kakao => credentials
      .api_key
      .as_deref()
      .is_some_and(|key| kakao::validate_signature(body, signature, key)),
    _ => {
      let Some(secret) = credentials.secret.as_deref() else {
        return false;
      };
      match channel_type {
        ChannelType::Line => line::validate_signature(body, signature, secret),
        ChannelType::Wechat => wechat::validate_signature(body, signature, secret),
        ChannelType::Widget => widget::validate_signature(body, signature, secret),
        _ => meta::validate_signature(body, signature, secret),
      }
    }
  }
}

/// Build the provider call for `payload` on `account`.
pub fn outbound_request(account: &ChannelAccount, payload: &OutboundPayload) -> Result<Delivery> {
  match account.channel_type {
    ChannelType::Line => line::outbound_request(account, payload).map(Delivery::Http),
    ChannelType::Kakao => Ok(kakao::outbound_request(payload)),
    ChannelType::Facebook | ChannelType::Instagram | ChannelType::Whatsapp => {
      meta::outbound_request(account, payload).map(Delivery::Http)
    }
    ChannelType::Wechat => wechat::outbound_request(account, payload).map(Delivery::Http),
    ChannelType::Widget => Ok(Delivery::InBand),
  }
}

/// Read the provider's message id out of a send response. `Err` carries the
/// provider's own error description.
pub fn parse_send_response(
  channel_type: ChannelType,
  response: &Value,
) -> std::result::Result<Option<String>, String> {
  match channel_type {
    ChannelType::Line => Ok(line::sent_message_id(response)),
    ChannelType::Facebook | ChannelType::Instagram | ChannelType::Whatsapp => {
      Ok(meta::sent_message_id(response))
    }
    ChannelType::Wechat => wechat::check_send_response(response).map(|()| None),
    ChannelType::Kakao | ChannelType::Widget => Ok(None),
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
  DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

pub(crate) fn from_secs(secs: i64) -> DateTime<Utc> {
  DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

/// Placeholder text for a message that carries no text of its own.
pub(crate) fn media_text(kind: &str) -> String { format!("[{kind}]") }

pub(crate) fn str_field(value: &Value, key: &str) -> Option<String> {
  value
    .get(key)
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
}
