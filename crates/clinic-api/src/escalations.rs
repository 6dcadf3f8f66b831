//! `GET /escalations[?status=pending|assigned|resolved]`

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use clinic_core::{
  escalation::{Escalation, EscalationStatus},
  store::EscalationRepository,
};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  pub status: Option<EscalationStatus>,
}

pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Escalation>>, ApiError>
where
  S: EscalationRepository,
{
  let escalations = store
    .list_escalations(params.status)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(escalations))
}
