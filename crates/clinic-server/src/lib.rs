//! HTTP front door for the clinic platform.
//!
//! Serves channel webhooks, widget polling and the Basic-auth protected
//! admin API, all backed by any [`Store`].

pub mod auth;
pub mod error;
pub mod webhooks;
pub mod widget;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, middleware, routing::get};
use clinic_core::store::Store;
use clinic_pipeline::{
  InboundProcessor, PipelineConfig,
  providers::{DeepLConfig, OpenAiConfig},
  rag::{ModelSelector, RagConfig},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::AuthConfig;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `CLINIC_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                  String,
  pub port:                  u16,
  pub store_path:            PathBuf,
  pub admin_username:        String,
  pub admin_password_hash:   String,
  #[serde(default = "default_lock_ttl_secs")]
  pub lock_ttl_secs:         u64,
  #[serde(default = "default_tenant_cache_ttl_secs")]
  pub tenant_cache_ttl_secs: u64,
  #[serde(default = "default_provider_timeout_secs")]
  pub provider_timeout_secs: u64,
  pub translation:           TranslationSettings,
  pub llm:                   LlmSettings,
  /// Escalation notifications are only logged when unset.
  #[serde(default)]
  pub notify_webhook_url:    Option<String>,
}

#[derive(Deserialize, Clone)]
pub struct TranslationSettings {
  pub endpoint: String,
  pub api_key:  String,
}

#[derive(Deserialize, Clone)]
pub struct LlmSettings {
  pub endpoint:        String,
  pub api_key:         String,
  #[serde(default = "default_model")]
  pub default_model:   String,
  #[serde(default = "default_advanced_model")]
  pub advanced_model:  String,
  #[serde(default = "default_embedding_model")]
  pub embedding_model: String,
}

fn default_lock_ttl_secs() -> u64 { 300 }
fn default_tenant_cache_ttl_secs() -> u64 { 60 }
fn default_provider_timeout_secs() -> u64 { 30 }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_advanced_model() -> String { "gpt-4o".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }

impl ServerConfig {
  pub fn provider_timeout(&self) -> Duration { Duration::from_secs(self.provider_timeout_secs) }

  pub fn pipeline_config(&self) -> PipelineConfig {
    PipelineConfig {
      lock_ttl:         Duration::from_secs(self.lock_ttl_secs),
      tenant_cache_ttl: Duration::from_secs(self.tenant_cache_ttl_secs),
      provider_timeout: self.provider_timeout(),
      rag:              RagConfig {
        models: ModelSelector::new(&self.llm.default_model, &self.llm.advanced_model),
        ..RagConfig::default()
      },
    }
  }

  pub fn deepl(&self) -> DeepLConfig {
    DeepLConfig {
      endpoint: self.translation.endpoint.clone(),
      api_key:  self.translation.api_key.clone(),
    }
  }

  pub fn openai(&self) -> OpenAiConfig {
    OpenAiConfig {
      endpoint:        self.llm.endpoint.clone(),
      api_key:         self.llm.api_key.clone(),
      embedding_model: self.llm.embedding_model.clone(),
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store:     Arc<S>,
  pub processor: Arc<InboundProcessor<S>>,
  pub config:    Arc<ServerConfig>,
  pub auth:      Arc<AuthConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:     self.store.clone(),
      processor: self.processor.clone(),
      config:    self.config.clone(),
      auth:      self.auth.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: Store + 'static,
{
  let admin = clinic_api::api_router(state.store.clone()).layer(
    middleware::from_fn_with_state(state.auth.clone(), auth::require_admin),
  );

  Router::new()
    .route(
      "/webhooks/{channel}/{account}",
      get(webhooks::handshake::<S>).post(webhooks::receive::<S>),
    )
    .route("/widget/{account}/messages", get(widget::messages::<S>))
    .with_state(state)
    .nest("/api", admin)
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests;
