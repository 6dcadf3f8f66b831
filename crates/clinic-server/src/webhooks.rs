//! Channel webhook endpoints.
//!
//! Every channel posts to `/webhooks/{channel}/{account}`, where `account`
//! is the provider-side account id. The account's credentials verify the
//! request; messages addressed to any other account are dropped.
//!
//! Providers redeliver on anything but success, so after the signature
//! check every failure is logged and acknowledged in the channel's own
//! format. Kakao always receives a valid skill response and WeChat always
//! receives `success`.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
};
use bytes::Bytes;
use clinic_channels::{kakao, line, meta, wechat, widget};
use clinic_core::{
  channel::{ChannelAccount, ChannelType},
  inbound::UnifiedInboundMessage,
  language::LanguageCode,
  store::{Store, TenantRepository},
};
use clinic_pipeline::fallback;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::{AppState, error::Error};

/// Header carrying the request signature (or API key) for `channel_type`.
pub fn signature_header(channel_type: ChannelType) -> &'static str {
  match channel_type {
    ChannelType::Line => line::SIGNATURE_HEADER,
    ChannelType::Kakao => kakao::API_KEY_HEADER,
    ChannelType::Facebook | ChannelType::Instagram | ChannelType::Whatsapp => {
      meta::SIGNATURE_HEADER
    }
    ChannelType::Wechat => wechat::SIGNATURE_HEADER,
    ChannelType::Widget => widget::SIGNATURE_HEADER,
  }
}

fn parse_channel(raw: &str) -> Result<ChannelType, Error> {
  raw.parse().map_err(|_| Error::NotFound)
}

// ─── Acknowledgements ────────────────────────────────────────────────────────

/// The channel's idea of "received".
#[derive(Clone, Copy)]
enum Ack {
  Kakao,
  Wechat,
  Json,
}

impl Ack {
  fn for_channel(channel_type: ChannelType) -> Self {
    match channel_type {
      ChannelType::Kakao => Self::Kakao,
      ChannelType::Wechat => Self::Wechat,
      _ => Self::Json,
    }
  }

  fn received(self) -> Response {
    match self {
      Self::Kakao => {
        Json(kakao::simple_text(fallback::waiting_text(Some(LanguageCode::Ko)))).into_response()
      }
      Self::Wechat => wechat::SUCCESS_REPLY.into_response(),
      Self::Json => Json(json!({ "status": "ok" })).into_response(),
    }
  }

  fn rejected(self) -> Response {
    match self {
      Self::Kakao => {
        Json(kakao::simple_text(fallback::apology_text(Some(LanguageCode::Ko)))).into_response()
      }
      Self::Wechat => wechat::SUCCESS_REPLY.into_response(),
      Self::Json => (StatusCode::UNAUTHORIZED, "invalid signature").into_response(),
    }
  }
}

// ─── POST ────────────────────────────────────────────────────────────────────

/// Receive one webhook delivery and run every message in it through the
/// pipeline.
pub async fn receive<S>(
  State(state): State<AppState<S>>,
  Path((channel, account_id)): Path<(String, String)>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Response, Error>
where
  S: Store + 'static,
{
  let channel_type = parse_channel(&channel)?;
  let ack = Ack::for_channel(channel_type);

  let account = match state
    .store
    .find_channel_account(channel_type, account_id.clone())
    .await
  {
    Ok(Some(account)) if account.active => account,
    Ok(_) => {
      warn!(channel = %channel_type, account = %account_id, "webhook for unknown channel account");
      return Ok(ack.received());
    }
    Err(e) => {
      error!(channel = %channel_type, account = %account_id, error = %e, "channel account lookup failed");
      return Ok(ack.received());
    }
  };

  let signature = headers
    .get(signature_header(channel_type))
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default();
  if !clinic_channels::validate_signature(channel_type, &body, signature, &account.credentials) {
    warn!(channel = %channel_type, account = %account_id, "webhook signature rejected");
    return Ok(ack.rejected());
  }

  let parsed = match clinic_channels::parse_webhook(channel_type, &body) {
    Ok(parsed) => parsed,
    Err(e) => {
      warn!(channel = %channel_type, account = %account_id, error = %e, "malformed webhook payload");
      return Ok(ack.received());
    }
  };

  for receipt in &parsed.receipts {
    if let Err(e) = state.processor.messages().mark_delivered(&receipt.external_id).await {
      warn!(external_id = %receipt.external_id, error = %e, "delivery receipt not applied");
    }
  }

  let messages: Vec<_> = parsed
    .messages
    .into_iter()
    .filter(|m| addressed_to(&account, m))
    .collect();
  debug!(channel = %channel_type, count = messages.len(), "webhook parsed");

  if channel_type == ChannelType::Kakao {
    return Ok(kakao_reply(&state, messages).await);
  }

  let mut outcomes = Vec::with_capacity(messages.len());
  for message in messages {
    let external_id = message.message_id.clone();
    match state.processor.process(message).await {
      Ok(outcome) => {
        info!(channel = %channel_type, %external_id, ?outcome, "inbound processed");
        outcomes.push(outcome);
      }
      Err(e) => error!(channel = %channel_type, %external_id, error = %e, "inbound processing failed"),
    }
  }

  Ok(match channel_type {
    ChannelType::Widget => Json(json!({ "status": "ok", "outcomes": outcomes })).into_response(),
    _ => ack.received(),
  })
}

fn addressed_to(account: &ChannelAccount, message: &UnifiedInboundMessage) -> bool {
  let ok = message.channel_type == account.channel_type
    && message.channel_account_id == account.external_account_id;
  if !ok {
    warn!(
      expected = %account.external_account_id,
      got = %message.channel_account_id,
      "dropping message for another account"
    );
  }
  ok
}

/// Kakao expects the answer in the response body. With a callback URL the
/// request is acknowledged at once and the answer is posted there later.
async fn kakao_reply<S>(state: &AppState<S>, messages: Vec<UnifiedInboundMessage>) -> Response
where
  S: Store + 'static,
{
  let waiting = fallback::waiting_text(Some(LanguageCode::Ko));
  let Some(message) = messages.into_iter().next() else {
    return Ack::Kakao.received();
  };

  if kakao::callback_url(&message.metadata).is_some() {
    let processor = state.processor.clone();
    tokio::spawn(async move {
      let external_id = message.message_id.clone();
      if let Err(e) = processor.process(message).await {
        error!(%external_id, error = %e, "kakao callback processing failed");
      }
    });
    return Json(kakao::use_callback(waiting)).into_response();
  }

  match state.processor.process(message).await {
    Ok(outcome) => {
      let text = outcome.customer_reply().unwrap_or(waiting);
      Json(kakao::simple_text(text)).into_response()
    }
    Err(e) => {
      error!(error = %e, "kakao processing failed");
      Ack::Kakao.rejected()
    }
  }
}

// ─── GET ─────────────────────────────────────────────────────────────────────

/// Query of the Meta subscription handshake and the WeChat URL check.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
  #[serde(rename = "hub.mode")]
  pub hub_mode:         Option<String>,
  #[serde(rename = "hub.verify_token")]
  pub hub_verify_token: Option<String>,
  #[serde(rename = "hub.challenge")]
  pub hub_challenge:    Option<String>,
  pub signature:        Option<String>,
  pub timestamp:        Option<String>,
  pub nonce:            Option<String>,
  pub echostr:          Option<String>,
}

/// Answer the provider's endpoint verification with the account's
/// `verify_token`.
pub async fn handshake<S>(
  State(state): State<AppState<S>>,
  Path((channel, account_id)): Path<(String, String)>,
  Query(query): Query<HandshakeQuery>,
) -> Result<Response, Error>
where
  S: Store + 'static,
{
  let channel_type = parse_channel(&channel)?;
  if !channel_type.is_meta() && channel_type != ChannelType::Wechat {
    return Err(Error::NotFound);
  }

  let account = state
    .store
    .find_channel_account(channel_type, account_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NotFound)?;
  let expected = account.credentials.verify_token.as_deref().unwrap_or_default();

  if channel_type.is_meta() {
    let challenge = meta::verify_subscription(
      query.hub_mode.as_deref().unwrap_or_default(),
      query.hub_verify_token.as_deref().unwrap_or_default(),
      query.hub_challenge.as_deref().unwrap_or_default(),
      expected,
    )
    .ok_or(Error::Forbidden)?;
    info!(account = %account.external_account_id, "meta subscription verified");
    return Ok(challenge.to_owned().into_response());
  }

  let verified = wechat::verify_url(
    expected,
    query.timestamp.as_deref().unwrap_or_default(),
    query.nonce.as_deref().unwrap_or_default(),
    query.signature.as_deref().unwrap_or_default(),
  );
  if !verified {
    return Err(Error::Forbidden);
  }
  info!(account = %account.external_account_id, "wechat url verified");
  Ok(query.echostr.unwrap_or_default().into_response())
}
