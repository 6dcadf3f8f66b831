//! The escalation decision.
//!
//! A configured keyword in the customer's message always escalates, whatever
//! the confidence; otherwise an answer below the tenant's threshold does.

use std::fmt;

use clinic_core::escalation::EscalationPriority;
use serde::{Deserialize, Serialize};

/// Platform-wide keywords (complaints, refunds, legal, danger).
pub const SYSTEM_KEYWORDS: &[&str] = &[
  "환불",
  "불만",
  "소송",
  "고소",
  "변호사",
  "항의",
  "응급",
  "위급",
  "생명",
  "返金",
  "退款",
  "投诉",
  "refund",
  "complaint",
  "lawsuit",
  "lawyer",
  "legal",
  "danger",
  "emergency",
];

/// Keywords that also raise the escalation to urgent.
const URGENT_KEYWORDS: &[&str] = &["응급", "위급", "생명", "emergency", "danger"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscalationReason {
  Keyword { keyword: String },
  LowConfidence { confidence: f32, threshold: f32 },
}

impl EscalationReason {
  pub fn priority(&self) -> EscalationPriority {
    match self {
      Self::Keyword { keyword } if URGENT_KEYWORDS.contains(&keyword.as_str()) => {
        EscalationPriority::Urgent
      }
      Self::Keyword { .. } => EscalationPriority::High,
      Self::LowConfidence { .. } => EscalationPriority::Normal,
    }
  }
}

impl fmt::Display for EscalationReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Keyword { keyword } => write!(f, "escalation keyword: {keyword}"),
      Self::LowConfidence { confidence, threshold } => {
        write!(f, "low confidence: {confidence:.2} < {threshold:.2}")
      }
    }
  }
}

#[derive(Debug, Clone)]
pub struct EscalationPolicy {
  system_keywords: Vec<String>,
}

impl Default for EscalationPolicy {
  fn default() -> Self {
    Self { system_keywords: SYSTEM_KEYWORDS.iter().map(|k| (*k).to_owned()).collect() }
  }
}

impl EscalationPolicy {
  /// The first system or tenant keyword found in any of `texts`
  /// (case-insensitive).
  pub fn matched_keyword(&self, texts: &[&str], tenant_keywords: &[String]) -> Option<String> {
    let lowered: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
    self
      .system_keywords
      .iter()
      .chain(tenant_keywords)
      .map(|k| k.trim())
      .filter(|k| !k.is_empty())
      .find(|k| {
        let k = k.to_lowercase();
        lowered.iter().any(|t| t.contains(&k))
      })
      .map(str::to_owned)
  }

  /// Keyword first, then confidence.
  pub fn decide(
    &self,
    keyword: Option<String>,
    confidence: f32,
    threshold: f32,
  ) -> Option<EscalationReason> {
    if let Some(keyword) = keyword {
      return Some(EscalationReason::Keyword { keyword });
    }
    (confidence < threshold).then_some(EscalationReason::LowConfidence { confidence, threshold })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn keyword_beats_high_confidence() {
    let policy = EscalationPolicy::default();
    let kw = policy.matched_keyword(&["환불 받고 싶어요"], &[]);
    assert_eq!(kw.as_deref(), Some("환불"));
    let reason = policy.decide(kw, 0.99, 0.75).unwrap();
    assert!(matches!(reason, EscalationReason::Keyword { .. }));
    assert_eq!(reason.priority(), EscalationPriority::High);
  }

  #[test]
  fn tenant_keywords_and_translated_text_are_checked() {
    let policy = EscalationPolicy::default();
    let tenant = vec!["VIP".to_string()];
    assert_eq!(
      policy.matched_keyword(&["I am a vip member"], &tenant).as_deref(),
      Some("VIP")
    );
    // Only the translation carries the keyword.
    assert!(policy.matched_keyword(&["返品したい", "I want a refund"], &[]).is_some());
    assert!(policy.matched_keyword(&["라식 비용?"], &tenant).is_none());
  }

  #[test]
  fn confidence_rule() {
    let policy = EscalationPolicy::default();
    assert!(policy.decide(None, 0.80, 0.75).is_none());
    let low = policy.decide(None, 0.5, 0.75).unwrap();
    assert_eq!(low.priority(), EscalationPriority::Normal);
    assert_eq!(low.to_string(), "low confidence: 0.50 < 0.75");
  }

  #[test]
  fn danger_terms_are_urgent() {
    let reason = EscalationReason::Keyword { keyword: "응급".into() };
    assert_eq!(reason.priority(), EscalationPriority::Urgent);
    let reason = EscalationReason::Keyword { keyword: "위급".into() };
    assert_eq!(reason.priority(), EscalationPriority::Urgent);
  }

  #[test]
  fn risk_questions_do_not_escalate() {
    let policy = EscalationPolicy::default();
    for term in crate::rag::model::RISK_KEYWORDS {
      assert_eq!(policy.matched_keyword(&[*term], &[]), None, "{term}");
    }
    assert!(policy.matched_keyword(&["라식 수술 위험성이 있나요?"], &[]).is_none());
    assert!(policy.matched_keyword(&["생명이 위급해요"], &[]).is_some());
  }
}
