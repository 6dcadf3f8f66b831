//! Meta platforms: Facebook Messenger, Instagram Direct and WhatsApp Cloud.
//!
//! All three sign webhooks with `X-Hub-Signature-256` (`sha256=` + hex
//! HMAC-SHA256 under the app secret) and subscribe through the same
//! `hub.challenge` handshake. Messenger and Instagram share the
//! `entry[].messaging[]` shape; WhatsApp uses `entry[].changes[].value`.

use std::collections::HashMap;

use clinic_core::{
  channel::{ChannelAccount, ChannelType},
  inbound::{OutboundPayload, UnifiedInboundMessage},
  message::ContentType,
};
use serde_json::{Value, json};

use crate::{
  DeliveryReceipt, Error, OutboundRequest, ParsedWebhook, Result, from_millis, from_secs,
  media_text, signature, str_field,
};

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const GRAPH_API: &str = "https://graph.facebook.com/v20.0";

pub fn validate_signature(body: &[u8], signature: &str, app_secret: &str) -> bool {
  signature.trim().starts_with("sha256=")
    && signature::verify_hmac_hex(body, signature, app_secret)
}

/// Answer the GET subscription handshake: the challenge is echoed only for
/// `hub.mode=subscribe` with the expected verify token.
pub fn verify_subscription<'a>(
  mode: &str,
  verify_token: &str,
  challenge: &'a str,
  expected_token: &str,
) -> Option<&'a str> {
  (mode == "subscribe"
    && !expected_token.is_empty()
    && signature::constant_time_eq(verify_token, expected_token))
  .then_some(challenge)
}

pub fn parse_webhook(body: &[u8]) -> Result<ParsedWebhook> {
  let payload: Value = serde_json::from_slice(body)?;
  let object = payload.get("object").and_then(Value::as_str).unwrap_or_default();
  let entries = payload
    .get("entry")
    .and_then(Value::as_array)
    .ok_or_else(|| Error::invalid("meta", "missing entry"))?;

  let mut out = ParsedWebhook::default();
  match object {
    "page" => parse_messaging(ChannelType::Facebook, entries, &mut out),
    "instagram" => parse_messaging(ChannelType::Instagram, entries, &mut out),
    "whatsapp_business_account" => parse_whatsapp(entries, &mut out),
    other => return Err(Error::invalid("meta", format!("unknown object {other:?}"))),
  }
  Ok(out)
}

// ─── Messenger / Instagram ───────────────────────────────────────────────────

fn parse_messaging(channel_type: ChannelType, entries: &[Value], out: &mut ParsedWebhook) {
  for entry in entries {
    let Some(page_id) = str_field(entry, "id") else {
      continue;
    };
    let Some(events) = entry.get("messaging").and_then(Value::as_array) else {
      continue;
    };

    for event in events {
      if let Some(mids) = event
        .get("delivery")
        .and_then(|d| d.get("mids"))
        .and_then(Value::as_array)
      {
        out.receipts.extend(
          mids
            .iter()
            .filter_map(Value::as_str)
            .map(|mid| DeliveryReceipt { external_id: mid.to_owned() }),
        );
        continue;
      }

      let Some(message) = event.get("message") else {
        continue;
      };
      // Our own outbound messages come back as echoes.
      if message.get("is_echo").and_then(Value::as_bool).unwrap_or(false) {
        continue;
      }
      let Some(sender) = event.get("sender").and_then(|s| str_field(s, "id")) else {
        continue;
      };
      let Some(mid) = str_field(message, "mid") else {
        continue;
      };

      let attachment = message
        .get("attachments")
        .and_then(Value::as_array)
        .and_then(|list| list.first());
      let (content_type, media_url) = match attachment {
        Some(att) => {
          let kind = att.get("type").and_then(Value::as_str).unwrap_or_default();
          let url = att.get("payload").and_then(|p| str_field(p, "url"));
          (attachment_content_type(kind), url)
        }
        None => (ContentType::Text, None),
      };
      let text = str_field(message, "text")
        .unwrap_or_else(|| media_text(content_type.as_ref()));

      let timestamp = event.get("timestamp").and_then(Value::as_i64).unwrap_or_default();

      out.messages.push(UnifiedInboundMessage {
        channel_type,
        channel_account_id: page_id.clone(),
        channel_user_id: sender,
        channel_username: None,
        text,
        content_type,
        media_url,
        message_id: mid,
        timestamp: from_millis(timestamp),
        metadata: json!({}),
      });
    }
  }
}

fn attachment_content_type(kind: &str) -> ContentType {
  match kind {
    "image" => ContentType::Image,
    "video" => ContentType::Video,
    "audio" => ContentType::Audio,
    "location" => ContentType::Location,
    _ => ContentType::File,
  }
}

// ─── WhatsApp ────────────────────────────────────────────────────────────────

fn parse_whatsapp(entries: &[Value], out: &mut ParsedWebhook) {
  for entry in entries {
    let Some(changes) = entry.get("changes").and_then(Value::as_array) else {
      continue;
    };
    for change in changes {
      let value = change.get("value").unwrap_or(&Value::Null);
      let Some(phone_number_id) = value
        .get("metadata")
        .and_then(|m| str_field(m, "phone_number_id"))
      else {
        continue;
      };

      if let Some(statuses) = value.get("statuses").and_then(Value::as_array) {
        out.receipts.extend(
          statuses
            .iter()
            .filter(|s| s.get("status").and_then(Value::as_str) == Some("delivered"))
            .filter_map(|s| str_field(s, "id"))
            .map(|external_id| DeliveryReceipt { external_id }),
        );
      }

      let mut names: HashMap<String, String> = HashMap::new();
      for contact in value.get("contacts").and_then(Value::as_array).into_iter().flatten() {
        let name = contact.get("profile").and_then(|p| str_field(p, "name"));
        if let (Some(wa_id), Some(name)) = (str_field(contact, "wa_id"), name) {
          names.insert(wa_id, name);
        }
      }

      let Some(messages) = value.get("messages").and_then(Value::as_array) else {
        continue;
      };
      for message in messages {
        let (Some(from), Some(id)) = (str_field(message, "from"), str_field(message, "id")) else {
          continue;
        };
        let kind = message.get("type").and_then(Value::as_str).unwrap_or("text");
        let mut metadata = json!({});

        let (content_type, text) = match kind {
          "text" => (
            ContentType::Text,
            message
              .get("text")
              .and_then(|t| str_field(t, "body"))
              .unwrap_or_default(),
          ),
          "image" | "video" | "audio" | "document" | "sticker" => {
            let block = message.get(kind).unwrap_or(&Value::Null);
            if let Some(media_id) = str_field(block, "id") {
              metadata["media_id"] = json!(media_id);
            }
            let content_type = match kind {
              "image" => ContentType::Image,
              "video" => ContentType::Video,
              "audio" => ContentType::Audio,
              "sticker" => ContentType::Sticker,
              _ => ContentType::File,
            };
            let text = str_field(block, "caption").unwrap_or_else(|| media_text(kind));
            (content_type, text)
          }
          "location" => {
            let loc = message.get("location").unwrap_or(&Value::Null);
            metadata["location"] = json!({
              "latitude": loc.get("latitude"),
              "longitude": loc.get("longitude"),
            });
            let text = str_field(loc, "name")
              .or_else(|| str_field(loc, "address"))
              .unwrap_or_else(|| media_text("location"));
            (ContentType::Location, text)
          }
          "button" => (
            ContentType::Text,
            message
              .get("button")
              .and_then(|b| str_field(b, "text"))
              .unwrap_or_default(),
          ),
          _ => continue,
        };

        let timestamp = message
          .get("timestamp")
          .and_then(Value::as_str)
          .and_then(|s| s.parse::<i64>().ok())
          .unwrap_or_default();

        out.messages.push(UnifiedInboundMessage {
          channel_type: ChannelType::Whatsapp,
          channel_account_id: phone_number_id.clone(),
          channel_username: names.get(&from).cloned(),
          channel_user_id: from,
          text,
          content_type,
          media_url: None,
          message_id: id,
          timestamp: from_secs(timestamp),
          metadata,
        });
      }
    }
  }
}

// ─── Outbound ────────────────────────────────────────────────────────────────

pub fn outbound_request(account: &ChannelAccount, payload: &OutboundPayload) -> Result<OutboundRequest> {
  let token = account
    .credentials
    .access_token
    .clone()
    .ok_or(Error::MissingCredential("access token"))?;

  let (url, body) = match account.channel_type {
    ChannelType::Whatsapp => {
      let sender = account
        .credentials
        .sender_id
        .as_deref()
        .unwrap_or(&account.external_account_id);
      let body = match (payload.content_type, &payload.media_url) {
        (ContentType::Image, Some(link)) => json!({
          "messaging_product": "whatsapp",
          "to": payload.channel_user_id,
          "type": "image",
          "image": { "link": link },
        }),
        _ => json!({
          "messaging_product": "whatsapp",
          "to": payload.channel_user_id,
          "type": "text",
          "text": { "body": payload.text },
        }),
      };
      (format!("{GRAPH_API}/{sender}/messages"), body)
    }
    _ => {
      let message = match (payload.content_type, &payload.media_url) {
        (ContentType::Image, Some(url)) => json!({
          "attachment": { "type": "image", "payload": { "url": url } },
        }),
        _ => json!({ "text": payload.text }),
      };
      let body = json!({
        "recipient": { "id": payload.channel_user_id },
        "messaging_type": "RESPONSE",
        "message": message,
      });
      (format!("{GRAPH_API}/me/messages"), body)
    }
  };

  Ok(OutboundRequest { url, bearer: Some(token), body })
}

pub(crate) fn sent_message_id(response: &Value) -> Option<String> {
  str_field(response, "message_id").or_else(|| {
    response
      .get("messages")
      .and_then(Value::as_array)
      .and_then(|list| list.first())
      .and_then(|m| str_field(m, "id"))
  })
}
