//! [`HttpChannelSender`]: executes provider send requests over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use clinic_core::{
  channel::ChannelAccount,
  inbound::{OutboundPayload, SendResult},
  provider::ChannelSender,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{Delivery, OutboundRequest, Result, outbound_request, parse_send_response};

/// Sends outbound messages to every supported provider with a bounded
/// per-request timeout.
#[derive(Clone)]
pub struct HttpChannelSender {
  client: reqwest::Client,
}

impl HttpChannelSender {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client })
  }

  async fn execute(&self, req: OutboundRequest) -> std::result::Result<Value, String> {
    let mut builder = self.client.post(&req.url).json(&req.body);
    if let Some(token) = &req.bearer {
      builder = builder.bearer_auth(token);
    }

    let response = builder.send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    let text = response.text().await.map_err(|e| e.to_string())?;
    if !status.is_success() {
      return Err(format!("provider returned {status}: {text}"));
    }
    // Some callbacks answer with an empty body.
    Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
  }
}

#[async_trait]
impl ChannelSender for HttpChannelSender {
  async fn send(&self, account: &ChannelAccount, payload: &OutboundPayload) -> SendResult {
    let channel = account.channel_type;

    let request = match outbound_request(account, payload) {
      Ok(Delivery::Http(req)) => req,
      Ok(Delivery::InBand) => {
        debug!(%channel, "outbound delivered in band");
        return SendResult::ok(None);
      }
      Err(e) => {
        warn!(%channel, error = %e, "cannot build outbound request");
        return SendResult::failed(e.to_string());
      }
    };

    let outcome = self
      .execute(request)
      .await
      .and_then(|body| parse_send_response(channel, &body));

    match outcome {
      Ok(message_id) => SendResult::ok(message_id),
      Err(e) => {
        warn!(%channel, account = %account.channel_account_id, error = %e, "outbound send failed");
        SendResult::failed(e)
      }
    }
  }
}
