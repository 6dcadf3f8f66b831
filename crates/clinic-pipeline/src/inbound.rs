//! The inbound-message orchestrator.
//!
//! One call to [`InboundProcessor::process`] takes a normalised channel
//! message through resolution, persistence, the duplicate guard, query
//! processing, the escalation decision and, only when not escalated, the AI
//! answer and its send. For every triggering message the customer receives
//! exactly one of: the AI answer, the waiting placeholder, or the apology.

use std::{sync::Arc, time::Duration};

use clinic_core::{
  channel::ChannelAccount,
  conversation::{Conversation, ConversationStatus},
  customer::{Customer, CustomerIdentity},
  escalation::{NewEscalation, NotificationJob},
  event::EventSink,
  inbound::{OutboundPayload, SendResult, UnifiedInboundMessage},
  language::LanguageCode,
  message::{ContentType, Direction, Message, MessageStatus, SenderType},
  provider::{CacheStore, ChannelSender, Embedder, Generator, LockStore, Translator},
  store::{Inserted, Store},
  tenant::Tenant,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  escalation::EscalationService,
  fallback,
  guard::{self, Acquisition, IdempotencyGuard},
  persistence::{AiMessage, MessageService},
  rag::{EscalationReason, ProcessedQuery, RagConfig, RagInput, RagOutput, RagPipeline},
  resolver::Resolver,
  tenant_cache::TenantCache,
  translation::{TranslationService, detect_language},
};

// ─── Wiring ──────────────────────────────────────────────────────────────────

/// External systems the processor talks to.
pub struct Collaborators {
  pub translator:    Arc<dyn Translator>,
  pub embedder:      Arc<dyn Embedder>,
  pub generator:     Arc<dyn Generator>,
  pub locks:         Arc<dyn LockStore>,
  pub cache:         Option<Arc<dyn CacheStore>>,
  pub sender:        Arc<dyn ChannelSender>,
  pub events:        Arc<dyn EventSink>,
  /// Queue of the notification worker, if one is running.
  pub notifications: Option<mpsc::Sender<NotificationJob>>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub lock_ttl:         Duration,
  pub tenant_cache_ttl: Duration,
  pub provider_timeout: Duration,
  pub rag:              RagConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      lock_ttl:         guard::DEFAULT_LOCK_TTL,
      tenant_cache_ttl: Duration::from_secs(60),
      provider_timeout: Duration::from_secs(30),
      rag:              RagConfig::default(),
    }
  }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
  /// Unknown or inactive channel account.
  Ignored,
  /// Another delivery of the same event is in flight or was already handled.
  Duplicate,
  /// Stored without an AI turn (non-text content, AI disabled, or a human
  /// owns the conversation).
  Stored { message_id: Uuid },
  Answered { message_id: Uuid, confidence: f32, reply: String },
  Escalated { escalation_id: Option<Uuid>, reason: String, reply: String },
  /// An AI reply for this message already exists.
  Suppressed,
  /// The AI path failed; the conversation waits for a human.
  Failed { reply: String },
}

impl ProcessOutcome {
  /// The text sent to the customer for this message, if any.
  pub fn customer_reply(&self) -> Option<&str> {
    match self {
      Self::Answered { reply, .. } | Self::Escalated { reply, .. } | Self::Failed { reply } => {
        Some(reply)
      }
      _ => None,
    }
  }
}

// ─── Processor ───────────────────────────────────────────────────────────────

/// What is known about the message once it is stored.
struct Context<'a> {
  account:      &'a ChannelAccount,
  tenant:       &'a Tenant,
  customer:     &'a Customer,
  conversation: Conversation,
  inbound:      &'a UnifiedInboundMessage,
  message:      Message,
}

pub struct InboundProcessor<S> {
  store:       Arc<S>,
  tenants:     TenantCache<S>,
  resolver:    Resolver<S>,
  messages:    MessageService<S>,
  escalations: EscalationService<S>,
  rag:         RagPipeline<S>,
  guard:       IdempotencyGuard,
  sender:      Arc<dyn ChannelSender>,
}

impl<S: Store> InboundProcessor<S> {
  pub fn new(store: Arc<S>, collaborators: Collaborators, config: PipelineConfig) -> Self {
    let Collaborators {
      translator,
      embedder,
      generator,
      locks,
      cache,
      sender,
      events,
      notifications,
    } = collaborators;

    let translation =
      Arc::new(TranslationService::new(translator, cache, config.provider_timeout));
    let messages = MessageService::new(store.clone(), events);

    Self {
      tenants: TenantCache::new(store.clone(), config.tenant_cache_ttl),
      resolver: Resolver::new(store.clone()),
      escalations: EscalationService::new(store.clone(), messages.clone(), notifications),
      rag: RagPipeline::new(
        store.clone(),
        embedder,
        generator,
        translation,
        config.rag,
        config.provider_timeout,
      ),
      guard: IdempotencyGuard::new(locks, config.lock_ttl),
      messages,
      sender,
      store,
    }
  }

  pub fn messages(&self) -> &MessageService<S> { &self.messages }

  pub fn resolver(&self) -> &Resolver<S> { &self.resolver }

  pub fn tenants(&self) -> &TenantCache<S> { &self.tenants }

  /// Process one inbound message. Errors are store failures up to and
  /// including storing the message; any failure after that ends in
  /// [`ProcessOutcome::Failed`] with the apology sent.
  ///
  /// A redelivered message that never got a reply, placeholder or
  /// escalation is processed again rather than dropped.
  pub async fn process(&self, inbound: UnifiedInboundMessage) -> Result<ProcessOutcome> {
    let Some(account) = self
      .store
      .find_channel_account(inbound.channel_type, inbound.channel_account_id.clone())
      .await
      .map_err(Error::store)?
      .filter(|a| a.active)
    else {
      warn!(
        channel = %inbound.channel_type,
        account = %inbound.channel_account_id,
        "message for unknown channel account"
      );
      return Ok(ProcessOutcome::Ignored);
    };
    let tenant = self.tenants.get(account.tenant_id).await?;

    let is_text = inbound.content_type == ContentType::Text && !inbound.text.trim().is_empty();
    let language = is_text.then(|| detect_language(&inbound.text));

    let (customer, _) = self
      .resolver
      .find_or_create_customer(CustomerIdentity {
        tenant_id:          tenant.tenant_id,
        channel_account_id: account.channel_account_id,
        channel_user_id:    inbound.channel_user_id.clone(),
        channel_username:   inbound.channel_username.clone(),
        name:               None,
        profile_image_url:  None,
        language,
      })
      .await?;
    let conversation = self
      .resolver
      .get_or_create_conversation(customer.customer_id, tenant.tenant_id)
      .await?;

    let lock = match self
      .guard
      .acquire(conversation.conversation_id, &inbound.message_id)
      .await
    {
      Acquisition::Acquired(handle) => Some(handle),
      Acquisition::Held => {
        info!(
          conversation_id = %conversation.conversation_id,
          external_id = %inbound.message_id,
          "duplicate delivery in flight, skipping"
        );
        return Ok(ProcessOutcome::Duplicate);
      }
      Acquisition::Unavailable => None,
    };

    let outcome = self
      .process_locked(&account, &tenant, &customer, conversation, &inbound, language)
      .await;

    if let Some(handle) = lock {
      self.guard.release(handle).await;
    }
    outcome
  }

  async fn process_locked(
    &self,
    account: &ChannelAccount,
    tenant: &Tenant,
    customer: &Customer,
    conversation: Conversation,
    inbound: &UnifiedInboundMessage,
    language: Option<LanguageCode>,
  ) -> Result<ProcessOutcome> {
    let message = match self.messages.create_inbound(&conversation, inbound, language).await? {
      Inserted::Created(message) => message,
      Inserted::Existing(message) => {
        if self.handled(&message).await? {
          info!(
            conversation_id = %conversation.conversation_id,
            external_id = %inbound.message_id,
            "duplicate delivery, already handled"
          );
          return Ok(ProcessOutcome::Duplicate);
        }
        info!(
          conversation_id = %conversation.conversation_id,
          message_id = %message.message_id,
          "redelivered message was never answered, resuming"
        );
        message
      }
    };
    let message_id = message.message_id;

    let Some(language) = language else {
      return Ok(ProcessOutcome::Stored { message_id });
    };
    if !tenant.ai.enabled || !conversation.ai_enabled || conversation.status.awaits_human() {
      info!(
        conversation_id = %conversation.conversation_id,
        status = %conversation.status,
        "AI not answering this conversation"
      );
      return Ok(ProcessOutcome::Stored { message_id });
    }

    let ctx = Context { account, tenant, customer, conversation, inbound, message };
    match self.respond(&ctx, language).await {
      Ok(outcome) => Ok(outcome),
      Err(e) => {
        error!(
          conversation_id = %ctx.conversation.conversation_id,
          %message_id,
          error = %e,
          "AI turn failed, handing over to staff"
        );
        Ok(self.fail(&ctx, language).await)
      }
    }
  }

  /// Whether a stored inbound message already got a reply, a placeholder or
  /// an escalation.
  async fn handled(&self, message: &Message) -> Result<bool> {
    if self
      .store
      .find_escalation_by_message(message.message_id)
      .await
      .map_err(Error::store)?
      .is_some()
    {
      return Ok(true);
    }
    let later = self
      .store
      .messages_after(message.conversation_id, Some(message.created_at))
      .await
      .map_err(Error::store)?;
    Ok(later.iter().any(|m| m.direction == Direction::Outbound))
  }

  /// The AI turn for a stored text message: translate, decide, then answer
  /// or escalate.
  async fn respond(&self, ctx: &Context<'_>, language: LanguageCode) -> Result<ProcessOutcome> {
    let working = ctx.tenant.default_language;
    let message_id = ctx.message.message_id;

    let query = self.rag.process_query(&ctx.inbound.text, working).await;
    if query.translated {
      if let Err(e) = self
        .messages
        .update_translation(message_id, query.text.clone(), working)
        .await
      {
        warn!(%message_id, error = %e, "failed to store inbound translation");
      }
    }

    // Keyword escalations skip generation entirely.
    let texts = [query.original.as_str(), query.text.as_str()];
    if let Some(keyword) = self
      .rag
      .policy()
      .matched_keyword(&texts, &ctx.tenant.ai.escalation_keywords)
    {
      return Ok(
        self
          .escalate(ctx, EscalationReason::Keyword { keyword }, None, language)
          .await,
      );
    }

    let output = self.answer(ctx, &query, language).await?;
    if output.should_escalate {
      let reason = output.escalation_reason.clone().unwrap_or(EscalationReason::LowConfidence {
        confidence: output.confidence,
        threshold:  ctx.tenant.ai.confidence_threshold,
      });
      return Ok(self.escalate(ctx, reason, Some(output.confidence), language).await);
    }
    self.send_answer(ctx, output, language).await
  }

  async fn answer(
    &self,
    ctx: &Context<'_>,
    query: &ProcessedQuery,
    language: LanguageCode,
  ) -> Result<RagOutput> {
    self
      .rag
      .run(RagInput {
        tenant:            ctx.tenant,
        customer:          ctx.customer,
        conversation_id:   ctx.conversation.conversation_id,
        message_id:        Some(ctx.message.message_id),
        query,
        customer_language: language,
      })
      .await
  }

  async fn send_answer(
    &self,
    ctx: &Context<'_>,
    output: RagOutput,
    language: LanguageCode,
  ) -> Result<ProcessOutcome> {
    if guard::already_answered(
      self.store.as_ref(),
      ctx.conversation.conversation_id,
      ctx.message.created_at,
    )
    .await?
    {
      warn!(
        conversation_id = %ctx.conversation.conversation_id,
        message_id = %ctx.message.message_id,
        "AI reply already exists for this message, suppressing"
      );
      return Ok(ProcessOutcome::Suppressed);
    }

    let working = ctx.tenant.default_language;
    let reply = output.customer_text().to_owned();
    let (reply_language, working_text) = match &output.translated_response {
      Some(_) => (language, Some((output.response.clone(), working))),
      None => (working, None),
    };
    let message = self
      .messages
      .create_ai_message(&ctx.conversation, AiMessage {
        content: reply.clone(),
        language: reply_language,
        working_text,
        confidence: output.confidence,
        model: output.model.clone(),
      })
      .await?;
    self.deliver(ctx, &message).await;

    Ok(ProcessOutcome::Answered {
      message_id: message.message_id,
      confidence: output.confidence,
      reply,
    })
  }

  /// Hand the conversation to staff and send the waiting placeholder. Store
  /// failures along the way are logged; the placeholder always goes out.
  async fn escalate(
    &self,
    ctx: &Context<'_>,
    reason: EscalationReason,
    confidence: Option<f32>,
    language: LanguageCode,
  ) -> ProcessOutcome {
    let result = self
      .escalations
      .create_escalation(ctx.tenant, ctx.customer, &ctx.conversation, NewEscalation {
        conversation_id: ctx.conversation.conversation_id,
        message_id:      Some(ctx.message.message_id),
        reason:          reason.to_string(),
        ai_confidence:   confidence,
        priority:        reason.priority(),
      })
      .await;

    let reply = fallback::waiting_text(Some(language)).to_owned();
    let ctx = Context {
      conversation: result.conversation,
      message: ctx.message.clone(),
      ..*ctx
    };
    self.send_system(&ctx, &reply, language).await;

    ProcessOutcome::Escalated {
      escalation_id: result.escalation.map(|e| e.escalation_id),
      reason: reason.to_string(),
      reply,
    }
  }

  /// Park the conversation for a human and apologise. Never fails.
  async fn fail(&self, ctx: &Context<'_>, language: LanguageCode) -> ProcessOutcome {
    let conversation = match self
      .messages
      .set_conversation_status(&ctx.conversation, ConversationStatus::Waiting)
      .await
    {
      Ok(conversation) => conversation,
      Err(e) => {
        error!(
          conversation_id = %ctx.conversation.conversation_id,
          error = %e,
          "failed to mark conversation as waiting"
        );
        ctx.conversation.clone()
      }
    };
    let reply = fallback::apology_text(Some(language)).to_owned();
    let ctx = Context { conversation, message: ctx.message.clone(), ..*ctx };
    self.send_system(&ctx, &reply, language).await;
    ProcessOutcome::Failed { reply }
  }

  async fn send_system(&self, ctx: &Context<'_>, text: &str, language: LanguageCode) {
    match self
      .messages
      .create_outbound(&ctx.conversation, SenderType::System, text, Some(language))
      .await
    {
      Ok(message) => {
        self.deliver(ctx, &message).await;
      }
      Err(e) => error!(
        conversation_id = %ctx.conversation.conversation_id,
        error = %e,
        "failed to store placeholder message"
      ),
    }
  }

  /// Send a stored outbound message and track its status. Send failures are
  /// recorded on the message, never raised.
  async fn deliver(&self, ctx: &Context<'_>, message: &Message) -> SendResult {
    self.track(message.message_id, MessageStatus::Processing, None).await;

    let payload = OutboundPayload {
      reply_context: ctx.inbound.metadata.clone(),
      ..OutboundPayload::text(ctx.inbound.channel_user_id.clone(), message.content.clone())
    };
    let result = self.sender.send(ctx.account, &payload).await;

    if result.success {
      self
        .track(message.message_id, MessageStatus::Sent, result.message_id.clone())
        .await;
    } else {
      warn!(
        message_id = %message.message_id,
        error = result.error.as_deref().unwrap_or("unknown"),
        "outbound send failed"
      );
      self.track(message.message_id, MessageStatus::Failed, None).await;
    }
    result
  }

  async fn track(&self, message_id: Uuid, status: MessageStatus, external_id: Option<String>) {
    if let Err(e) = self.messages.update_status(message_id, status, external_id).await {
      warn!(%message_id, %status, error = %e, "failed to update message status");
    }
  }
}
