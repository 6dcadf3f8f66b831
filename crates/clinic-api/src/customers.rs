//! Handlers for customer deduplication.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/customers/:id/duplicates` | Same-tenant customers that look like the same person |
//! | `POST` | `/customers/:id/merge` | Body: `{"secondary_id":"..."}`; `:id` survives |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use clinic_core::{
  customer::{Customer, MergeReport},
  store::CustomerRepository,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;

async fn load<S: CustomerRepository>(store: &S, id: Uuid) -> Result<Customer, ApiError> {
  store
    .get_customer(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("customer {id} not found")))
}

// ─── Duplicates ──────────────────────────────────────────────────────────────

/// `GET /customers/:id/duplicates`
pub async fn duplicates<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Customer>>, ApiError>
where
  S: CustomerRepository,
{
  load(store.as_ref(), id).await?;
  let found = store.find_duplicates(id).await.map_err(ApiError::store)?;
  Ok(Json(found))
}

// ─── Merge ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MergeBody {
  pub secondary_id: Uuid,
}

/// `POST /customers/{id}/merge` with body `{"secondary_id":"<uuid>"}`
pub async fn merge<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<MergeBody>,
) -> Result<Json<MergeReport>, ApiError>
where
  S: CustomerRepository,
{
  if body.secondary_id == id {
    return Err(ApiError::BadRequest("cannot merge a customer into itself".into()));
  }
  let primary = load(store.as_ref(), id).await?;
  let secondary = load(store.as_ref(), body.secondary_id).await?;
  if primary.tenant_id != secondary.tenant_id {
    return Err(ApiError::BadRequest("customers belong to different tenants".into()));
  }

  let report = store
    .merge_customers(id, body.secondary_id)
    .await
    .map_err(ApiError::store)?;
  info!(
    primary_id = %report.primary_id,
    secondary_id = %report.secondary_id,
    channels = report.channels_moved,
    "customers merged via admin api"
  );
  Ok(Json(report))
}
