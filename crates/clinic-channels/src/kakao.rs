//! KakaoTalk skill server (chatbot "skill" webhooks).
//!
//! Kakao expects the webhook response itself to be a skill response. When
//! the request carries a `callbackUrl`, the server may answer with
//! `useCallback` and post the real answer there within a minute.

use chrono::Utc;
use clinic_core::{
  channel::ChannelType,
  inbound::{OutboundPayload, UnifiedInboundMessage},
  message::ContentType,
};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Delivery, OutboundRequest, Result, signature};

/// Header carrying the shared skill API key.
pub const API_KEY_HEADER: &str = "x-api-key";

const SKILL_VERSION: &str = "2.0";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkillRequest {
  user_request: UserRequest,
  bot:          Bot,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRequest {
  #[serde(default)]
  utterance:    String,
  #[serde(default)]
  callback_url: Option<String>,
  user:         User,
}

#[derive(Debug, Deserialize)]
struct User {
  id:         String,
  #[serde(default)]
  properties: Value,
}

#[derive(Debug, Deserialize)]
struct Bot {
  id:   String,
  #[serde(default)]
  name: Option<String>,
}

/// Kakao authenticates by a shared key rather than a body signature.
pub fn validate_signature(_body: &[u8], api_key: &str, expected: &str) -> bool {
  !expected.is_empty() && signature::constant_time_eq(api_key.trim(), expected)
}

/// A skill request always carries exactly one utterance.
///
/// Kakao sends no event id. The callback URL is issued per request, so it
/// identifies a request; without one every request is a new message, since
/// the same words sent twice are two messages.
pub fn parse_webhook(body: &[u8]) -> Result<Vec<UnifiedInboundMessage>> {
  let request: SkillRequest = serde_json::from_slice(body)?;
  let now = Utc::now();
  let message_id = message_id(request.user_request.callback_url.as_deref());

  let mut metadata = json!({ "bot_id": request.bot.id });
  if let Some(url) = &request.user_request.callback_url {
    metadata["callback_url"] = json!(url);
  }
  if let Some(key) = request.user_request.user.properties.get("plusfriendUserKey") {
    metadata["plusfriend_user_key"] = key.clone();
  }
  if let Some(name) = &request.bot.name {
    metadata["bot_name"] = json!(name);
  }

  Ok(vec![UnifiedInboundMessage {
    channel_type: ChannelType::Kakao,
    channel_account_id: request.bot.id,
    channel_user_id: request.user_request.user.id,
    channel_username: None,
    text: request.user_request.utterance,
    content_type: ContentType::Text,
    media_url: None,
    message_id,
    timestamp: now,
    metadata,
  }])
}

fn message_id(callback_url: Option<&str>) -> String {
  match callback_url {
    Some(url) => {
      let digest = hex::encode(Sha256::digest(url.as_bytes()));
      format!("kakao:cb:{}", &digest[..32])
    }
    None => format!("kakao:{}", Uuid::new_v4()),
  }
}

/// The callback URL from an inbound message's metadata, if Kakao offered one.
pub fn callback_url(metadata: &Value) -> Option<&str> {
  metadata.get("callback_url").and_then(Value::as_str)
}

// ─── Skill responses ─────────────────────────────────────────────────────────

/// A complete skill response carrying one text bubble.
pub fn simple_text(text: &str) -> Value {
  json!({
    "version": SKILL_VERSION,
    "template": { "outputs": [ { "simpleText": { "text": text } } ] },
  })
}

/// Acknowledge now and deliver the answer to the callback URL later.
pub fn use_callback(waiting_text: &str) -> Value {
  json!({
    "version": SKILL_VERSION,
    "useCallback": true,
    "data": { "text": waiting_text },
  })
}

/// With a callback URL the answer is posted there; otherwise it rides on the
/// synchronous webhook response.
pub fn outbound_request(payload: &OutboundPayload) -> Delivery {
  match callback_url(&payload.reply_context) {
    Some(url) => Delivery::Http(OutboundRequest {
      url:    url.to_owned(),
      bearer: None,
      body:   simple_text(&payload.text),
    }),
    None => Delivery::InBand,
  }
}
