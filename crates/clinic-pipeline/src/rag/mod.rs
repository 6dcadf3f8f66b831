//! Retrieval-augmented answer generation for one customer message.
//!
//! The pipeline never sends anything. It returns a [`RagOutput`] whose
//! `should_escalate` flag the caller must honour before any customer-facing
//! send.

pub mod confidence;
pub mod model;
pub mod policy;
pub mod prompt;
pub mod retrieval;

use std::{sync::Arc, time::Duration};

use clinic_core::{
  customer::Customer,
  knowledge::TenantFilter,
  language::LanguageCode,
  provider::{Embedder, Generator},
  store::{KnowledgeRepository, MessageRepository},
  tenant::Tenant,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub use self::{
  model::{ModelChoice, ModelSelector, SelectionReason},
  policy::{EscalationPolicy, EscalationReason},
  retrieval::{FusionParams, RetrievedChunk},
};
use crate::{
  Error, Result,
  translation::{CsDirection, TranslationService, detect_language},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
  pub top_k:          usize,
  pub history_limit:  usize,
  pub min_similarity: f32,
  pub rrf_k:          usize,
  pub vector_weight:  f32,
  pub keyword_weight: f32,
  pub models:         ModelSelector,
}

impl Default for RagConfig {
  fn default() -> Self {
    Self {
      top_k:          5,
      history_limit:  10,
      min_similarity: 0.3,
      rrf_k:          60,
      vector_weight:  0.7,
      keyword_weight: 0.3,
      models:         ModelSelector::new("gpt-4o-mini", "gpt-4o"),
    }
  }
}

impl RagConfig {
  fn fusion(&self) -> FusionParams {
    FusionParams {
      top_k:          self.top_k,
      rrf_k:          self.rrf_k,
      vector_weight:  self.vector_weight,
      keyword_weight: self.keyword_weight,
      min_similarity: self.min_similarity,
    }
  }
}

/// A customer message prepared for retrieval.
#[derive(Debug, Clone)]
pub struct ProcessedQuery {
  pub original:   String,
  pub language:   LanguageCode,
  /// The text in the working language; the original when no translation was
  /// needed or translation failed.
  pub text:       String,
  pub translated: bool,
}

pub struct RagInput<'a> {
  pub tenant:            &'a Tenant,
  pub customer:          &'a Customer,
  pub conversation_id:   Uuid,
  /// The persisted triggering message.
  pub message_id:        Option<Uuid>,
  pub query:             &'a ProcessedQuery,
  pub customer_language: LanguageCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
  pub name:            String,
  pub relevance_score: f32,
  pub description:     Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagOutput {
  /// The answer in the working language.
  pub response:            String,
  /// The answer in the customer's language, when it differs.
  pub translated_response: Option<String>,
  pub confidence:          f32,
  pub model:               String,
  pub model_reason:        SelectionReason,
  pub tokens_used:         u32,
  pub sources:             Vec<Source>,
  pub should_escalate:     bool,
  pub escalation_reason:   Option<EscalationReason>,
}

impl RagOutput {
  /// The text to send to the customer if the answer is not escalated.
  pub fn customer_text(&self) -> &str {
    self.translated_response.as_deref().unwrap_or(&self.response)
  }
}

pub struct RagPipeline<S> {
  store:       Arc<S>,
  embedder:    Arc<dyn Embedder>,
  generator:   Arc<dyn Generator>,
  translation: Arc<TranslationService>,
  policy:      EscalationPolicy,
  config:      RagConfig,
  timeout:     Duration,
}

impl<S> RagPipeline<S>
where
  S: KnowledgeRepository + MessageRepository,
{
  pub fn new(
    store: Arc<S>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    translation: Arc<TranslationService>,
    config: RagConfig,
    timeout: Duration,
  ) -> Self {
    Self {
      store,
      embedder,
      generator,
      translation,
      policy: EscalationPolicy::default(),
      config,
      timeout,
    }
  }

  pub fn policy(&self) -> &EscalationPolicy { &self.policy }

  /// Detect the language and bring the text into the clinic's working
  /// language. Translation failures keep the original text.
  pub async fn process_query(&self, text: &str, working: LanguageCode) -> ProcessedQuery {
    let language = detect_language(text);
    let mut query = ProcessedQuery {
      original: text.to_owned(),
      language,
      text: text.to_owned(),
      translated: false,
    };
    if language == working {
      return query;
    }
    match self
      .translation
      .translate_for_cs(text, CsDirection::ToAgent, language, working)
      .await
    {
      Ok(t) => {
        query.text = t.text;
        query.translated = true;
      }
      Err(e) => warn!(error = %e, %language, "query translation failed, using original text"),
    }
    query
  }

  /// Retrieve, generate, score and decide. Provider failures and timeouts of
  /// the embedding or generation calls are errors.
  pub async fn run(&self, input: RagInput<'_>) -> Result<RagOutput> {
    let filter = TenantFilter::new(input.tenant.tenant_id);
    let working = input.tenant.default_language;
    let query = input.query.text.as_str();

    let embedding = tokio::time::timeout(self.timeout, self.embedder.embed(query))
      .await
      .map_err(|_| Error::Timeout("embedding"))?
      .map_err(Error::provider("embedding"))?;

    let chunks = retrieval::hybrid_search(
      self.store.as_ref(),
      filter,
      embedding,
      query,
      self.config.fusion(),
    )
    .await?;

    let history = self
      .store
      .recent_messages(input.conversation_id, self.config.history_limit)
      .await
      .map_err(Error::store)?;

    let selector = self
      .config
      .models
      .with_default_model(input.tenant.ai.model_preference.as_deref());
    let choice = selector.select(query, retrieval::document_count(&chunks));

    let hints = input.customer.profile_hints();
    let prompt = prompt::build(prompt::PromptInput {
      tenant:           input.tenant,
      working_language: working,
      chunks:           &chunks,
      history:          &history,
      current_id:       input.message_id,
      query,
      profile_hints:    &hints,
    });

    let generation =
      tokio::time::timeout(self.timeout, self.generator.generate(&prompt, &choice.model))
        .await
        .map_err(|_| Error::Timeout("generation"))?
        .map_err(Error::provider("generation"))?;

    let similarities: Vec<f32> = chunks.iter().map(|c| c.similarity).collect();
    let consistency = confidence::self_consistency(&generation.text);
    let confidence =
      confidence::score(&similarities, retrieval::document_count(&chunks), consistency);

    let keyword = self.policy.matched_keyword(
      &[input.query.original.as_str(), query],
      &input.tenant.ai.escalation_keywords,
    );
    let threshold = input.tenant.ai.confidence_threshold;
    let reason = self.policy.decide(keyword, confidence, threshold);

    let translated_response = if reason.is_none()
      && input.customer_language != working
    {
      self
        .translate_answer(&generation.text, input.customer_language, working)
        .await
    } else {
      None
    };

    info!(
      conversation_id = %input.conversation_id,
      model = %choice.model,
      reason = %choice.reason,
      chunks = chunks.len(),
      confidence,
      escalate = reason.is_some(),
      "generated answer"
    );

    Ok(RagOutput {
      response: generation.text,
      translated_response,
      confidence,
      model: choice.model,
      model_reason: choice.reason,
      tokens_used: generation.tokens_used,
      sources: sources(&chunks),
      should_escalate: reason.is_some(),
      escalation_reason: reason,
    })
  }

  async fn translate_answer(
    &self,
    text: &str,
    lang: LanguageCode,
    working: LanguageCode,
  ) -> Option<String> {
    match self
      .translation
      .translate_for_cs(text, CsDirection::ToCustomer, lang, working)
      .await
    {
      Ok(t) => Some(t.text),
      Err(e) => {
        warn!(error = %e, %lang, "answer translation failed, sending working-language text");
        None
      }
    }
  }
}

/// One source per document, in retrieval order.
fn sources(chunks: &[RetrievedChunk]) -> Vec<Source> {
  let mut seen = Vec::new();
  chunks
    .iter()
    .filter(|c| {
      let fresh = !seen.contains(&c.hit.document_id);
      seen.push(c.hit.document_id);
      fresh
    })
    .map(|c| Source {
      name:            c.hit.document_name.clone(),
      relevance_score: c.similarity,
      description:     c.hit.document_description.clone(),
    })
    .collect()
}
