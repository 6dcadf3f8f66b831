//! Customers and their channel identities.
//!
//! A customer is keyed by one or more `(channel_account_id, channel_user_id)`
//! pairs recorded as [`CustomerChannel`] rows. Resolving the same pair twice
//! always yields the same customer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::language::LanguageCode;

/// A person talking to a tenant over one or more channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
  pub customer_id:       Uuid,
  pub tenant_id:         Uuid,
  pub display_name:      Option<String>,
  pub profile_image_url: Option<String>,
  pub language:          Option<LanguageCode>,
  pub country:           Option<String>,
  pub tags:              Vec<String>,
  /// Free-form profile data (interests, concerns, phone, email) filled in by
  /// analysis or agents.
  pub metadata:          serde_json::Value,
  pub created_at:        DateTime<Utc>,
}

impl Customer {
  /// Short profile hints for the generation prompt. Empty when nothing is
  /// known beyond the identity.
  pub fn profile_hints(&self) -> Vec<String> {
    let mut hints = Vec::new();
    if let Some(name) = &self.display_name {
      hints.push(format!("name: {name}"));
    }
    if let Some(lang) = self.language {
      hints.push(format!("language: {}", lang.english_name()));
    }
    if let Some(country) = &self.country {
      hints.push(format!("country: {country}"));
    }
    if !self.tags.is_empty() {
      hints.push(format!("tags: {}", self.tags.join(", ")));
    }
    for key in ["interests", "concerns"] {
      if let Some(list) = self.metadata.get(key).and_then(|v| v.as_array()) {
        let items: Vec<&str> = list.iter().filter_map(|v| v.as_str()).collect();
        if !items.is_empty() {
          hints.push(format!("{key}: {}", items.join(", ")));
        }
      }
    }
    hints
  }
}

/// One channel identity of a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerChannel {
  pub customer_channel_id: Uuid,
  pub customer_id:         Uuid,
  /// Internal [`crate::channel::ChannelAccount`] id.
  pub channel_account_id:  Uuid,
  pub channel_user_id:     String,
  pub channel_username:    Option<String>,
  pub created_at:          DateTime<Utc>,
}

/// Input to identity resolution: everything known about the sender of an
/// inbound message.
#[derive(Debug, Clone)]
pub struct CustomerIdentity {
  pub tenant_id:          Uuid,
  pub channel_account_id: Uuid,
  pub channel_user_id:    String,
  pub channel_username:   Option<String>,
  pub name:               Option<String>,
  pub profile_image_url:  Option<String>,
  pub language:           Option<LanguageCode>,
}

/// What [`crate::store::CustomerRepository::merge_customers`] changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
  pub primary_id:             Uuid,
  pub secondary_id:           Uuid,
  pub channels_moved:         usize,
  pub conversations_moved:    usize,
  /// Open conversations of the secondary that were resolved because the
  /// primary already had an open thread with the same tenant.
  pub conversations_resolved: usize,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn customer(metadata: serde_json::Value) -> Customer {
    Customer {
      customer_id:       Uuid::nil(),
      tenant_id:         Uuid::nil(),
      display_name:      Some("Tanaka".into()),
      profile_image_url: None,
      language:          Some(LanguageCode::Ja),
      country:           None,
      tags:              vec!["vip".into()],
      metadata,
      created_at:        Utc::now(),
    }
  }

  #[test]
  fn profile_hints_include_metadata_lists() {
    let c = customer(serde_json::json!({ "interests": ["lasik", "lens"] }));
    let hints = c.profile_hints();
    assert!(hints.contains(&"name: Tanaka".to_string()));
    assert!(hints.contains(&"language: Japanese".to_string()));
    assert!(hints.contains(&"interests: lasik, lens".to_string()));
    assert!(!hints.iter().any(|h| h.starts_with("concerns")));
  }
}
