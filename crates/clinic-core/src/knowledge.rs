//! Tenant-scoped knowledge documents and retrieval hits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scope for every retrieval call. There is deliberately no way to build a
/// search without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantFilter(Uuid);

impl TenantFilter {
  pub fn new(tenant_id: Uuid) -> Self { Self(tenant_id) }

  pub fn tenant_id(&self) -> Uuid { self.0 }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
  pub document_id: Uuid,
  pub tenant_id:   Uuid,
  pub name:        String,
  pub description: Option<String>,
  pub content:     String,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::KnowledgeRepository::add_document`].
#[derive(Debug, Clone)]
pub struct NewDocument {
  pub tenant_id:   Uuid,
  pub name:        String,
  pub description: Option<String>,
  pub content:     String,
}

/// A derived, immutable piece of a document plus its embedding.
#[derive(Debug, Clone)]
pub struct NewChunk {
  pub content:   String,
  pub embedding: Vec<f32>,
}

/// One retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHit {
  pub chunk_id:             Uuid,
  pub document_id:          Uuid,
  pub document_name:        String,
  pub document_description: Option<String>,
  pub content:              String,
  /// Cosine similarity for vector search, BM25 score for keyword search.
  pub score:                f32,
}
