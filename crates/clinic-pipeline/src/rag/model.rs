//! Deterministic model selection.
//!
//! The higher-capability model is used when any one of three conditions
//! holds: the query is long, many documents are in play, or the query
//! mentions a medical-risk term. Everything else goes to the default
//! lightweight model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Queries longer than this many characters count as complex.
pub const DEFAULT_LENGTH_THRESHOLD: usize = 200;
/// More retrieved documents than this count as a complex context.
pub const DEFAULT_DOC_THRESHOLD: usize = 3;

pub(crate) const RISK_KEYWORDS: &[&str] = &[
  "부작용",
  "합병증",
  "수술 위험",
  "위험성",
  "출혈",
  "감염",
  "마취",
  "재수술",
  "괴사",
  "副作用",
  "合併症",
  "并发症",
  "感染",
  "side effect",
  "side-effect",
  "complication",
  "surgical risk",
  "bleeding",
  "infection",
  "anesthesia",
  "necrosis",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionReason {
  Default,
  LongQuery { chars: usize },
  ManyDocuments { count: usize },
  RiskKeyword(String),
}

impl fmt::Display for SelectionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Default => f.write_str("default"),
      Self::LongQuery { chars } => write!(f, "long query ({chars} chars)"),
      Self::ManyDocuments { count } => write!(f, "{count} documents in context"),
      Self::RiskKeyword(k) => write!(f, "risk keyword {k:?}"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
  pub model:  String,
  pub reason: SelectionReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSelector {
  pub default_model:    String,
  pub advanced_model:   String,
  pub length_threshold: usize,
  pub doc_threshold:    usize,
}

impl ModelSelector {
  pub fn new(default_model: impl Into<String>, advanced_model: impl Into<String>) -> Self {
    Self {
      default_model:    default_model.into(),
      advanced_model:   advanced_model.into(),
      length_threshold: DEFAULT_LENGTH_THRESHOLD,
      doc_threshold:    DEFAULT_DOC_THRESHOLD,
    }
  }

  /// The same rule with a tenant's preferred lightweight model.
  pub fn with_default_model(&self, preference: Option<&str>) -> Self {
    let mut selector = self.clone();
    if let Some(model) = preference.map(str::trim).filter(|m| !m.is_empty()) {
      selector.default_model = model.to_owned();
    }
    selector
  }

  pub fn select(&self, query: &str, doc_count: usize) -> ModelChoice {
    let reason = self.reason(query, doc_count);
    let model = match reason {
      SelectionReason::Default => self.default_model.clone(),
      _ => self.advanced_model.clone(),
    };
    ModelChoice { model, reason }
  }

  fn reason(&self, query: &str, doc_count: usize) -> SelectionReason {
    let chars = query.chars().count();
    if chars > self.length_threshold {
      return SelectionReason::LongQuery { chars };
    }
    if doc_count > self.doc_threshold {
      return SelectionReason::ManyDocuments { count: doc_count };
    }
    let lower = query.to_lowercase();
    if let Some(k) = RISK_KEYWORDS.iter().find(|k| lower.contains(*k)) {
      return SelectionReason::RiskKeyword((*k).to_owned());
    }
    SelectionReason::Default
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn selector() -> ModelSelector { ModelSelector::new("light", "heavy") }

  #[test]
  fn simple_query_uses_default() {
    let c = selector().select("라식 비용이 얼마인가요?", 2);
    assert_eq!(c.model, "light");
    assert_eq!(c.reason, SelectionReason::Default);
  }

  #[test]
  fn each_condition_alone_upgrades() {
    let s = selector();
    let long = "가".repeat(201);
    assert_eq!(s.select(&long, 0).model, "heavy");
    assert_eq!(s.select(&"가".repeat(200), 0).model, "light");

    assert_eq!(s.select("price?", 4).model, "heavy");
    assert_eq!(s.select("price?", 3).model, "light");

    let risky = s.select("라식 부작용이 있나요?", 1);
    assert_eq!(risky.model, "heavy");
    assert_eq!(risky.reason, SelectionReason::RiskKeyword("부작용".into()));
    assert_eq!(s.select("Any COMPLICATIONS?", 0).model, "heavy");
  }

  #[test]
  fn tenant_preference_replaces_light_model_only() {
    let s = selector().with_default_model(Some("tenant-mini"));
    assert_eq!(s.select("hi", 0).model, "tenant-mini");
    assert_eq!(s.select("side effects?", 0).model, "heavy");
    assert_eq!(selector().with_default_model(Some("  ")).default_model, "light");
  }
}
