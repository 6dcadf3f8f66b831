//! HTTP clients for the external providers.

mod deepl;
mod openai;
mod webhook;

use reqwest::Response;

pub use self::{
  deepl::{DeepLConfig, DeepLTranslator},
  openai::{OpenAiClient, OpenAiConfig},
  webhook::WebhookNotifier,
};
use crate::{Error, Result};

/// Fail on a non-success status, keeping the body for the log.
async fn check_status(response: Response) -> Result<Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let body = response.text().await.unwrap_or_default();
  Err(Error::Upstream { status: status.as_u16(), body })
}
