//! WeChat Official Account messages.
//!
//! Inbound bodies are plain XML. The webhook must always answer `success`
//! (even on internal error); anything else makes WeChat redeliver. Replies go
//! out through the customer-service message API.

use std::collections::HashMap;

use clinic_core::{
  channel::{ChannelAccount, ChannelType},
  inbound::{OutboundPayload, UnifiedInboundMessage},
  message::ContentType,
};
use quick_xml::{Reader, events::Event};
use serde_json::{Value, json};

use crate::{Error, OutboundRequest, Result, from_secs, media_text, signature};

/// The acknowledgement body WeChat expects for every delivery.
pub const SUCCESS_REPLY: &str = "success";
pub const SIGNATURE_HEADER: &str = "x-wechat-signature";
const SEND_ENDPOINT: &str = "https://api.weixin.qq.com/cgi-bin/message/custom/send";

pub fn validate_signature(body: &[u8], signature: &str, secret: &str) -> bool {
  signature::verify_hmac_hex(body, signature, secret)
}

/// URL verification on the GET handshake: SHA-1 over the sorted
/// `(token, timestamp, nonce)`.
pub fn verify_url(token: &str, timestamp: &str, nonce: &str, signature: &str) -> bool {
  let (token, timestamp, nonce) = (token.trim(), timestamp.trim(), nonce.trim());
  if token.is_empty() || timestamp.is_empty() || nonce.is_empty() || signature.is_empty() {
    return false;
  }
  signature::sorted_sha1_hex(&[token, timestamp, nonce]).eq_ignore_ascii_case(signature.trim())
}

/// Flat `<xml>` children into a map. Nested elements are not used by the
/// message types handled here.
pub fn parse_xml_fields(xml: &str) -> Result<HashMap<String, String>> {
  let mut reader = Reader::from_str(xml);
  reader.config_mut().trim_text(true);

  let mut buf = Vec::new();
  let mut current: Option<String> = None;
  let mut fields = HashMap::new();

  loop {
    match reader.read_event_into(&mut buf) {
      Ok(Event::Start(e)) => {
        current = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
      }
      Ok(Event::Text(e)) => {
        if let Some(tag) = current.take() {
          let text = e.unescape().map_err(|err| Error::Xml(err.to_string()))?;
          let text = text.trim();
          if !text.is_empty() {
            fields.insert(tag, text.to_owned());
          }
        }
      }
      Ok(Event::CData(e)) => {
        if let Some(tag) = current.take() {
          let text = String::from_utf8_lossy(&e.into_inner()).trim().to_owned();
          if !text.is_empty() {
            fields.insert(tag, text);
          }
        }
      }
      Ok(Event::End(_)) => current = None,
      Ok(Event::Eof) => break,
      Err(err) => return Err(Error::Xml(err.to_string())),
      _ => {}
    }
    buf.clear();
  }

  Ok(fields)
}

/// Event pushes (subscribe, menu clicks) produce no message.
pub fn parse_webhook(body: &[u8]) -> Result<Vec<UnifiedInboundMessage>> {
  let xml = std::str::from_utf8(body).map_err(|e| Error::Xml(e.to_string()))?;
  let fields = parse_xml_fields(xml)?;
  let field = |key: &str| fields.get(key).cloned();

  let account = field("ToUserName").ok_or_else(|| Error::invalid("wechat", "missing ToUserName"))?;
  let user = field("FromUserName").ok_or_else(|| Error::invalid("wechat", "missing FromUserName"))?;
  let kind = field("MsgType").unwrap_or_default();
  let created = field("CreateTime")
    .and_then(|t| t.parse::<i64>().ok())
    .unwrap_or_default();

  let mut metadata = json!({});
  let mut media_url = None;
  let (content_type, text) = match kind.as_str() {
    "text" => (ContentType::Text, field("Content").unwrap_or_default()),
    "image" => {
      media_url = field("PicUrl");
      (ContentType::Image, media_text("image"))
    }
    "voice" => {
      if let Some(id) = field("MediaId") {
        metadata["media_id"] = json!(id);
      }
      // Speech recognition, when enabled on the account.
      let text = field("Recognition").unwrap_or_else(|| media_text("voice"));
      (ContentType::Audio, text)
    }
    "video" | "shortvideo" => (ContentType::Video, media_text("video")),
    "location" => {
      metadata["location"] = json!({
        "latitude": field("Location_X").and_then(|v| v.parse::<f64>().ok()),
        "longitude": field("Location_Y").and_then(|v| v.parse::<f64>().ok()),
      });
      (ContentType::Location, field("Label").unwrap_or_else(|| media_text("location")))
    }
    _ => return Ok(Vec::new()),
  };

  let message_id = field("MsgId").unwrap_or_else(|| format!("{user}:{created}"));

  Ok(vec![UnifiedInboundMessage {
    channel_type: ChannelType::Wechat,
    channel_account_id: account,
    channel_user_id: user,
    channel_username: None,
    text,
    content_type,
    media_url,
    message_id,
    timestamp: from_secs(created),
    metadata,
  }])
}

pub fn outbound_request(account: &ChannelAccount, payload: &OutboundPayload) -> Result<OutboundRequest> {
  let token = account
    .credentials
    .access_token
    .as_deref()
    .ok_or(Error::MissingCredential("access token"))?;

  Ok(OutboundRequest {
    url:    format!("{SEND_ENDPOINT}?access_token={token}"),
    bearer: None,
    body:   json!({
      "touser": payload.channel_user_id,
      "msgtype": "text",
      "text": { "content": payload.text },
    }),
  })
}

/// WeChat reports failures in a 200 body as a non-zero `errcode`.
pub(crate) fn check_send_response(response: &Value) -> std::result::Result<(), String> {
  match response.get("errcode").and_then(Value::as_i64) {
    None | Some(0) => Ok(()),
    Some(code) => {
      let msg = response.get("errmsg").and_then(Value::as_str).unwrap_or("unknown");
      Err(format!("wechat errcode {code}: {msg}"))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const TEXT: &str = "<xml>\
    <ToUserName><![CDATA[gh_clinic]]></ToUserName>\
    <FromUserName><![CDATA[o-user-1]]></FromUserName>\
    <CreateTime>1710000000</CreateTime>\
    <MsgType><![CDATA[text]]></MsgType>\
    <Content><![CDATA[双眼皮手术多少钱？]]></Content>\
    <MsgId>1234567890123456</MsgId>\
    </xml>";

  #[test]
  fn parses_text_message() {
    let msgs = parse_webhook(TEXT.as_bytes()).unwrap();
    assert_eq!(msgs.len(), 1);
    let m = &msgs[0];
    assert_eq!(m.channel_account_id, "gh_clinic");
    assert_eq!(m.channel_user_id, "o-user-1");
    assert_eq!(m.text, "双眼皮手术多少钱？");
    assert_eq!(m.message_id, "1234567890123456");
    assert_eq!(m.timestamp.timestamp(), 1_710_000_000);
  }

  #[test]
  fn events_produce_no_messages() {
    let xml = "<xml><ToUserName>gh</ToUserName><FromUserName>u</FromUserName>\
      <CreateTime>1</CreateTime><MsgType>event</MsgType><Event>subscribe</Event></xml>";
    assert!(parse_webhook(xml.as_bytes()).unwrap().is_empty());
  }

  #[test]
  fn malformed_xml_is_an_error() {
    assert!(parse_webhook(b"<xml><ToUserName>gh</xml>").is_err());
  }

  #[test]
  fn url_verification_uses_sorted_sha1() {
    let sig = signature::sorted_sha1_hex(&["token", "1710000000", "abc"]);
    assert!(verify_url("token", "1710000000", "abc", &sig));
    assert!(!verify_url("token", "1710000001", "abc", &sig));
    assert!(!verify_url("", "1710000000", "abc", &sig));
  }

  #[test]
  fn send_errcode_is_reported() {
    assert!(check_send_response(&json!({ "errcode": 0, "errmsg": "ok" })).is_ok());
    let err = check_send_response(&json!({ "errcode": 45015, "errmsg": "response out of time limit" }));
    assert!(err.unwrap_err().contains("45015"));
  }
}
