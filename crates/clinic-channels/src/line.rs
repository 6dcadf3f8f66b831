//! LINE Messaging API.
//!
//! Webhooks are signed with `X-Line-Signature`: base64 HMAC-SHA256 of the
//! body under the channel secret. Replies go out through the push API.

use clinic_core::{
  channel::{ChannelAccount, ChannelType},
  inbound::{OutboundPayload, UnifiedInboundMessage},
  message::ContentType,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{Error, OutboundRequest, Result, from_millis, media_text, signature, str_field};

pub const SIGNATURE_HEADER: &str = "x-line-signature";
const PUSH_ENDPOINT: &str = "https://api.line.me/v2/bot/message/push";

#[derive(Debug, Deserialize)]
struct Webhook {
  destination: String,
  #[serde(default)]
  events:      Vec<Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Event {
  #[serde(rename = "type")]
  kind:        String,
  timestamp:   i64,
  #[serde(default)]
  source:      Value,
  #[serde(default)]
  message:     Option<Value>,
  #[serde(default)]
  reply_token: Option<String>,
}

pub fn validate_signature(body: &[u8], signature: &str, channel_secret: &str) -> bool {
  signature::verify_hmac_base64(body, signature, channel_secret)
}

/// One message per `message` event. Follow, unfollow, postback and other
/// events carry no customer text and are skipped.
pub fn parse_webhook(body: &[u8]) -> Result<Vec<UnifiedInboundMessage>> {
  let webhook: Webhook = serde_json::from_slice(body)?;
  let mut out = Vec::new();

  for event in webhook.events {
    if event.kind != "message" {
      continue;
    }
    let Some(message) = event.message else {
      continue;
    };
    let Some(user_id) = str_field(&event.source, "userId") else {
      continue;
    };
    let message_id =
      str_field(&message, "id").ok_or_else(|| Error::invalid("line", "message without id"))?;
    let kind = message.get("type").and_then(Value::as_str).unwrap_or_default();

    let mut metadata = json!({});
    if let Some(token) = &event.reply_token {
      metadata["reply_token"] = json!(token);
    }

    let (content_type, text) = match kind {
      "text" => (ContentType::Text, str_field(&message, "text").unwrap_or_default()),
      "image" => (ContentType::Image, media_text("image")),
      "video" => (ContentType::Video, media_text("video")),
      "audio" => (ContentType::Audio, media_text("audio")),
      "file" => (
        ContentType::File,
        str_field(&message, "fileName").unwrap_or_else(|| media_text("file")),
      ),
      "sticker" => {
        metadata["sticker"] = json!({
          "package_id": message.get("packageId"),
          "sticker_id": message.get("stickerId"),
        });
        (ContentType::Sticker, media_text("sticker"))
      }
      "location" => {
        metadata["location"] = json!({
          "latitude": message.get("latitude"),
          "longitude": message.get("longitude"),
        });
        let text = str_field(&message, "address")
          .or_else(|| str_field(&message, "title"))
          .unwrap_or_else(|| media_text("location"));
        (ContentType::Location, text)
      }
      _ => continue,
    };

    out.push(UnifiedInboundMessage {
      channel_type: ChannelType::Line,
      channel_account_id: webhook.destination.clone(),
      channel_user_id: user_id,
      channel_username: None,
      text,
      content_type,
      media_url: None,
      message_id,
      timestamp: from_millis(event.timestamp),
      metadata,
    });
  }

  Ok(out)
}

pub fn outbound_request(account: &ChannelAccount, payload: &OutboundPayload) -> Result<OutboundRequest> {
  let token = account
    .credentials
    .access_token
    .clone()
    .ok_or(Error::MissingCredential("access token"))?;

  let message = match (payload.content_type, &payload.media_url) {
    (ContentType::Image, Some(url)) => json!({
      "type": "image",
      "originalContentUrl": url,
      "previewImageUrl": url,
    }),
    _ => json!({ "type": "text", "text": payload.text }),
  };

  Ok(OutboundRequest {
    url:    PUSH_ENDPOINT.to_owned(),
    bearer: Some(token),
    body:   json!({ "to": payload.channel_user_id, "messages": [message] }),
  })
}

pub(crate) fn sent_message_id(response: &Value) -> Option<String> {
  response
    .get("sentMessages")
    .and_then(Value::as_array)
    .and_then(|list| list.first())
    .and_then(|m| str_field(m, "id"))
}

#[cfg(test)]
mod tests {
  use base64::Engine as _;
  use hmac::{Hmac, Mac};
  use sha2::Sha256;

  use super::*;

  const BODY: &str = r#"{
    "destination": "Ubot123",
    "events": [
      {
        "type": "message",
        "timestamp": 1710000000000,
        "replyToken": "rt-1",
        "source": { "type": "user", "userId": "Uuser1" },
        "message": { "id": "m-100", "type": "text", "text": "라식 비용이 얼마인가요?" }
      },
      {
        "type": "message",
        "timestamp": 1710000001000,
        "source": { "type": "user", "userId": "Uuser1" },
        "message": { "id": "m-101", "type": "sticker", "packageId": "1", "stickerId": "2" }
      },
      {
        "type": "follow",
        "timestamp": 1710000002000,
        "source": { "type": "user", "userId": "Uuser2" }
      }
    ]
  }"#;

  #[test]
  fn parses_message_events_only() {
    let msgs = parse_webhook(BODY.as_bytes()).unwrap();
    assert_eq!(msgs.len(), 2);

    let text = &msgs[0];
    assert_eq!(text.channel_account_id, "Ubot123");
    assert_eq!(text.channel_user_id, "Uuser1");
    assert_eq!(text.message_id, "m-100");
    assert_eq!(text.content_type, ContentType::Text);
    assert_eq!(text.metadata["reply_token"], "rt-1");
    assert_eq!(text.timestamp.timestamp(), 1_710_000_000);

    let sticker = &msgs[1];
    assert_eq!(sticker.content_type, ContentType::Sticker);
    assert_eq!(sticker.metadata["sticker"]["sticker_id"], "2");
  }

  #[test]
  fn signature_is_base64_hmac() {
    let mut mac = Hmac::<Sha256>::new_from_slice(b"channel-secret").unwrap();
    mac.update(BODY.as_bytes());
    let sig = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    assert!(validate_signature(BODY.as_bytes(), &sig, "channel-secret"));
    assert!(!validate_signature(BODY.as_bytes(), &sig, "wrong"));
  }

  #[test]
  fn push_request_needs_token() {
    let account = ChannelAccount {
      channel_account_id:  uuid::Uuid::nil(),
      tenant_id:           uuid::Uuid::nil(),
      channel_type:        ChannelType::Line,
      external_account_id: "Ubot123".into(),
      credentials:         Default::default(),
      active:              true,
      created_at:          chrono::Utc::now(),
    };
    let payload = OutboundPayload::text("Uuser1", "hello");
    assert!(matches!(
      outbound_request(&account, &payload),
      Err(Error::MissingCredential(_))
    ));

    let mut account = account;
    account.credentials.access_token = Some("tok".into());
    let req = outbound_request(&account, &payload).unwrap();
    assert_eq!(req.bearer.as_deref(), Some("tok"));
    assert_eq!(req.body["to"], "Uuser1");
    assert_eq!(req.body["messages"][0]["text"], "hello");
  }
}
