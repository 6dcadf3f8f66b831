//! Answer confidence: a weighted blend of retrieval quality, generation
//! self-consistency and document coverage.

/// Weight of the mean similarity of the chunks used.
pub const RETRIEVAL_WEIGHT: f32 = 0.6;
/// Weight of the answer's self-consistency heuristic.
pub const CONSISTENCY_WEIGHT: f32 = 0.25;
/// Weight of how many documents backed the answer.
pub const COVERAGE_WEIGHT: f32 = 0.15;
/// Number of documents that counts as full coverage.
pub const FULL_COVERAGE_DOCS: usize = 3;
/// Ceiling for answers generated without any retrieved context.
pub const NO_CONTEXT_CAP: f32 = 0.3;

/// Phrases showing the model itself was unsure.
const HEDGES: &[&str] = &[
  "잘 모르",
  "확인이 필요",
  "정확하지 않",
  "답변드리기 어렵",
  "i'm not sure",
  "i am not sure",
  "i don't know",
  "cannot confirm",
  "not certain",
];

/// 1.0 for a direct answer, lower for an empty or hedging one.
pub fn self_consistency(answer: &str) -> f32 {
  let answer = answer.trim();
  if answer.is_empty() {
    return 0.0;
  }
  let lower = answer.to_lowercase();
  if HEDGES.iter().any(|h| lower.contains(h)) { 0.4 } else { 1.0 }
}

/// Combine the signals into `[0, 1]`. `similarities` holds one score per
/// chunk used in the prompt and `documents` the number of distinct documents
/// those chunks come from.
pub fn score(similarities: &[f32], documents: usize, consistency: f32) -> f32 {
  let consistency = consistency.clamp(0.0, 1.0);
  if similarities.is_empty() {
    return (CONSISTENCY_WEIGHT * consistency).min(NO_CONTEXT_CAP);
  }

  let avg = similarities.iter().map(|s| s.clamp(0.0, 1.0)).sum::<f32>() / similarities.len() as f32;
  let coverage = (documents as f32 / FULL_COVERAGE_DOCS as f32).min(1.0);

  (RETRIEVAL_WEIGHT * avg + CONSISTENCY_WEIGHT * consistency + COVERAGE_WEIGHT * coverage)
    .clamp(0.0, 1.0)
}
