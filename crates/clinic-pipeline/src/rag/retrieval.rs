//! Hybrid retrieval: vector and keyword rankings fused by weighted
//! reciprocal rank.

use std::collections::HashMap;

use clinic_core::{
  knowledge::{ChunkHit, TenantFilter},
  store::KnowledgeRepository,
};
use uuid::Uuid;

use crate::{Error, Result};

/// Similarity credited to a chunk found only by keyword search.
pub const KEYWORD_ONLY_SIMILARITY: f32 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct FusionParams {
  pub top_k:          usize,
  pub rrf_k:          usize,
  pub vector_weight:  f32,
  pub keyword_weight: f32,
  /// Vector hits below this cosine similarity are discarded before fusion.
  pub min_similarity: f32,
}

/// A chunk selected for the prompt.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
  pub hit:        ChunkHit,
  /// Cosine similarity, or [`KEYWORD_ONLY_SIMILARITY`] for keyword-only hits.
  pub similarity: f32,
  pub fused:      f32,
}

/// Run both searches for one tenant and fuse them.
pub async fn hybrid_search<S: KnowledgeRepository>(
  store: &S,
  filter: TenantFilter,
  embedding: Vec<f32>,
  query: &str,
  params: FusionParams,
) -> Result<Vec<RetrievedChunk>> {
  let candidates = params.top_k.saturating_mul(2).max(1);
  let vector = store
    .vector_search(filter, embedding, candidates)
    .await
    .map_err(Error::store)?;
  let keyword = store
    .keyword_search(filter, query.to_owned(), candidates)
    .await
    .map_err(Error::store)?;
  Ok(fuse(vector, keyword, params))
}

/// Weighted reciprocal rank fusion. Each list contributes
/// `weight / (rrf_k + rank + 1)` per chunk; ties keep vector order.
pub fn fuse(vector: Vec<ChunkHit>, keyword: Vec<ChunkHit>, params: FusionParams) -> Vec<RetrievedChunk> {
  if params.top_k == 0 {
    return Vec::new();
  }
  let k = params.rrf_k.max(1) as f32;
  let vector_weight = params.vector_weight.max(0.0);
  let keyword_weight = params.keyword_weight.max(0.0);

  let mut order: Vec<Uuid> = Vec::new();
  let mut merged: HashMap<Uuid, RetrievedChunk> = HashMap::new();

  let vector = vector.into_iter().filter(|h| h.score >= params.min_similarity);
  for (rank, hit) in vector.enumerate() {
    let contribution = vector_weight / (k + rank as f32 + 1.0);
    order.push(hit.chunk_id);
    merged.insert(hit.chunk_id, RetrievedChunk {
      similarity: hit.score.clamp(0.0, 1.0),
      fused: contribution,
      hit,
    });
  }

  for (rank, hit) in keyword.into_iter().enumerate() {
    let contribution = keyword_weight / (k + rank as f32 + 1.0);
    match merged.get_mut(&hit.chunk_id) {
      Some(existing) => existing.fused += contribution,
      None => {
        order.push(hit.chunk_id);
        merged.insert(hit.chunk_id, RetrievedChunk {
          similarity: KEYWORD_ONLY_SIMILARITY,
          fused: contribution,
          hit,
        });
      }
    }
  }

  let mut fused: Vec<RetrievedChunk> =
    order.into_iter().filter_map(|id| merged.remove(&id)).collect();
  // Stable sort keeps first-seen order on ties.
  fused.sort_by(|a, b| b.fused.total_cmp(&a.fused));
  fused.truncate(params.top_k);
  fused
}

/// Number of distinct documents behind the chunks.
pub fn document_count(chunks: &[RetrievedChunk]) -> usize {
  let mut ids: Vec<Uuid> = chunks.iter().map(|c| c.hit.document_id).collect();
  ids.sort_unstable();
  ids.dedup();
  ids.len()
}
