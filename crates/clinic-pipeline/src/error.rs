//! Error type for `clinic-pipeline`.

use clinic_core::provider::ProviderError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(Box<dyn std::error::Error + Send + Sync>),

  #[error("{stage} failed: {source}")]
  Provider {
    stage:  &'static str,
    #[source]
    source: ProviderError,
  },

  #[error("{0} timed out")]
  Timeout(&'static str),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("upstream returned {status}: {body}")]
  Upstream { status: u16, body: String },

  #[error("malformed upstream response: {0}")]
  MalformedResponse(&'static str),

  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: Uuid },
}

impl Error {
  pub fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Store(Box::new(e))
  }

  pub(crate) fn provider(stage: &'static str) -> impl FnOnce(ProviderError) -> Self {
    move |source| Self::Provider { stage, source }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
