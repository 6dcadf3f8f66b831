//! Collaborator traits for the external systems the pipeline talks to.
//!
//! Each is object-safe so components can hold `Arc<dyn Trait>` handles that
//! are injected at construction and swapped for fakes in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
  channel::ChannelAccount,
  escalation::NotificationJob,
  inbound::{OutboundPayload, SendResult},
  language::LanguageCode,
};

pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;
pub type ProviderResult<T> = Result<T, ProviderError>;

// ─── Translation ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
  pub text:            String,
  pub detected_source: Option<LanguageCode>,
}

#[async_trait]
pub trait Translator: Send + Sync {
  async fn translate(
    &self,
    text: &str,
    source: Option<LanguageCode>,
    target: LanguageCode,
  ) -> ProviderResult<Translation>;
}

// ─── Embedding & generation ──────────────────────────────────────────────────

#[async_trait]
pub trait Embedder: Send + Sync {
  async fn embed(&self, text: &str) -> ProviderResult<Vec<f32>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
  User,
  Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTurn {
  pub role:    PromptRole,
  pub content: String,
}

/// A provider-neutral chat prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Prompt {
  pub system: String,
  /// Conversation history followed by the current question, oldest first.
  pub turns:  Vec<PromptTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
  pub text:        String,
  pub tokens_used: u32,
}

#[async_trait]
pub trait Generator: Send + Sync {
  async fn generate(&self, prompt: &Prompt, model: &str) -> ProviderResult<Generation>;
}

// ─── Lock & cache store ──────────────────────────────────────────────────────

#[async_trait]
pub trait LockStore: Send + Sync {
  /// Claim `key` for `ttl` unless a live claim exists. Returns whether this
  /// caller now holds it.
  async fn set_if_not_exists(&self, key: &str, token: &str, ttl: Duration)
  -> ProviderResult<bool>;

  /// Delete `key` only if it still holds `token`.
  async fn compare_and_delete(&self, key: &str, token: &str) -> ProviderResult<bool>;
}

#[async_trait]
pub trait CacheStore: Send + Sync {
  async fn get(&self, key: &str) -> ProviderResult<Option<String>>;

  async fn set(&self, key: &str, value: &str, ttl: Duration) -> ProviderResult<()>;
}

// ─── Side channels ───────────────────────────────────────────────────────────

/// Fire-and-forget sink for human notifications (Slack or similar).
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn notify(&self, job: &NotificationJob) -> ProviderResult<()>;
}

/// Delivers outbound messages to a channel provider.
#[async_trait]
pub trait ChannelSender: Send + Sync {
  async fn send(&self, account: &ChannelAccount, payload: &OutboundPayload) -> SendResult;
}
