//! Error types for `clinic-core`.

use thiserror::Error;

use crate::message::MessageStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid message status transition: {from} -> {to}")]
  InvalidStatusTransition { from: MessageStatus, to: MessageStatus },

  #[error("unknown language code: {0:?}")]
  UnknownLanguage(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
