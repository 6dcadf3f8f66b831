//! Error type for `clinic-channels`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("xml error: {0}")]
  Xml(String),

  #[error("invalid {channel} payload: {reason}")]
  InvalidPayload { channel: &'static str, reason: String },

  #[error("channel account is missing its {0}")]
  MissingCredential(&'static str),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
}

impl Error {
  pub(crate) fn invalid(channel: &'static str, reason: impl Into<String>) -> Self {
    Self::InvalidPayload { channel, reason: reason.into() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
