//! Error type for `clinic-store-sqlite`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] clinic_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown {kind} value: {value:?}")]
  Decode { kind: &'static str, value: String },

  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: Uuid },

  /// A conditional update matched no row because a concurrent writer changed
  /// it first.
  #[error("{entity} {id} was modified concurrently")]
  Conflict { entity: &'static str, id: Uuid },

  #[error("cannot merge customer {0} into itself")]
  SelfMerge(Uuid),

  #[error("customers {0} and {1} belong to different tenants")]
  CrossTenantMerge(Uuid, Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
