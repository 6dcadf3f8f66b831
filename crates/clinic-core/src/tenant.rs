//! Tenants (clinics) and their AI configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::language::LanguageCode;

/// Confidence below which an AI answer is escalated when the tenant has not
/// configured its own threshold.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.75;

/// Per-tenant AI behaviour. Loaded per request; never process config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
  pub enabled:              bool,
  /// Preferred lightweight model; the platform default is used when unset.
  pub model_preference:     Option<String>,
  pub confidence_threshold: f32,
  /// Replaces the generic customer-service prompt when present.
  pub system_prompt:        Option<String>,
  /// Extra keywords that force escalation, on top of the system list.
  #[serde(default)]
  pub escalation_keywords:  Vec<String>,
}

impl Default for AiConfig {
  fn default() -> Self {
    Self {
      enabled:              true,
      model_preference:     None,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      system_prompt:        None,
      escalation_keywords:  Vec::new(),
    }
  }
}

/// A clinic or organisation; the multi-tenancy isolation boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
  pub tenant_id:        Uuid,
  pub name:             String,
  pub specialty:        Option<String>,
  pub default_language: LanguageCode,
  pub ai:               AiConfig,
  pub created_at:       DateTime<Utc>,
}

/// Input to [`crate::store::TenantRepository::add_tenant`].
#[derive(Debug, Clone)]
pub struct NewTenant {
  pub name:             String,
  pub specialty:        Option<String>,
  pub default_language: LanguageCode,
  pub ai:               AiConfig,
}
