//! In-process scoring for knowledge chunks: cosine similarity for vector
//! search and BM25 for keyword search.

use std::collections::{BTreeSet, HashMap};

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

/// Cosine similarity; `0.0` for mismatched or zero-length vectors.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
  if left.len() != right.len() || left.is_empty() {
    return 0.0;
  }
  let (mut dot, mut norm_l, mut norm_r) = (0.0f32, 0.0f32, 0.0f32);
  for (l, r) in left.iter().zip(right) {
    dot += l * r;
    norm_l += l * l;
    norm_r += r * r;
  }
  if norm_l == 0.0 || norm_r == 0.0 {
    return 0.0;
  }
  dot / (norm_l.sqrt() * norm_r.sqrt())
}

/// Lowercased word tokens. Words containing non-ASCII characters also emit
/// character bigrams so that agglutinative scripts (Korean particles,
/// Japanese) still match on stems.
pub fn tokenize(text: &str) -> Vec<String> {
  let mut tokens = Vec::new();
  for word in text
    .split(|c: char| !c.is_alphanumeric())
    .filter(|w| !w.is_empty())
  {
    let word = word.to_lowercase();
    if !word.is_ascii() {
      let chars: Vec<char> = word.chars().collect();
      for pair in chars.windows(2) {
        tokens.push(pair.iter().collect());
      }
    }
    tokens.push(word);
  }
  tokens
}

/// BM25 score of every document against `query`, in input order.
pub fn bm25_scores(query: &str, documents: &[&str]) -> Vec<f32> {
  let query_terms: BTreeSet<String> = tokenize(query).into_iter().collect();
  if query_terms.is_empty() || documents.is_empty() {
    return vec![0.0; documents.len()];
  }

  let corpus: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
  let mut doc_frequencies: HashMap<&str, usize> = HashMap::new();
  let mut total_len = 0usize;
  for tokens in &corpus {
    total_len += tokens.len();
    let unique: BTreeSet<&str> = tokens.iter().map(String::as_str).collect();
    for term in unique {
      *doc_frequencies.entry(term).or_default() += 1;
    }
  }

  let doc_count = corpus.len() as f32;
  let avg_len = (total_len as f32 / doc_count).max(1.0);

  corpus
    .iter()
    .map(|tokens| {
      if tokens.is_empty() {
        return 0.0;
      }
      let mut tf: HashMap<&str, usize> = HashMap::new();
      for t in tokens {
        *tf.entry(t.as_str()).or_default() += 1;
      }
      let len = tokens.len() as f32;
      query_terms
        .iter()
        .map(|term| {
          let freq = *tf.get(term.as_str()).unwrap_or(&0) as f32;
          if freq == 0.0 {
            return 0.0;
          }
          let df = *doc_frequencies.get(term.as_str()).unwrap_or(&0) as f32;
          let idf = (((doc_count - df + 0.5) / (df + 0.5)) + 1.0).ln();
          let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * (len / avg_len));
          idf * (freq * (BM25_K1 + 1.0)) / (freq + norm)
        })
        .sum()
    })
    .collect()
}
