//! Repository traits, one per entity.
//!
//! The traits are implemented by storage backends (e.g.
//! `clinic-store-sqlite`). The pipeline and HTTP layers depend on these
//! abstractions, never on a concrete backend or query builder.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  channel::{ChannelAccount, ChannelType, NewChannelAccount},
  conversation::{Conversation, ConversationStatus},
  customer::{Customer, CustomerChannel, CustomerIdentity, MergeReport},
  escalation::{Escalation, EscalationStatus, NewEscalation},
  knowledge::{ChunkHit, KnowledgeDocument, NewChunk, NewDocument, TenantFilter},
  language::LanguageCode,
  message::{Direction, Message, MessageStatus, NewMessage},
  tenant::{NewTenant, Tenant},
};

// ─── Insert outcome ──────────────────────────────────────────────────────────

/// Outcome of an insert guarded by a uniqueness constraint.
///
/// `Existing` means a concurrent or earlier writer already created the row;
/// callers treat it as "already done".
#[derive(Debug, Clone)]
pub enum Inserted<T> {
  Created(T),
  Existing(T),
}

impl<T> Inserted<T> {
  pub fn is_created(&self) -> bool { matches!(self, Self::Created(_)) }

  pub fn into_inner(self) -> T {
    match self {
      Self::Created(v) | Self::Existing(v) => v,
    }
  }

  pub fn get(&self) -> &T {
    match self {
      Self::Created(v) | Self::Existing(v) => v,
    }
  }
}

// ─── Base ────────────────────────────────────────────────────────────────────

/// Shared error type for every repository a backend implements.
pub trait Repository: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
}

// ─── Tenants & channel accounts ──────────────────────────────────────────────

pub trait TenantRepository: Repository {
  fn add_tenant(
    &self,
    input: NewTenant,
  ) -> impl Future<Output = Result<Tenant, Self::Error>> + Send + '_;

  fn get_tenant(
    &self,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Option<Tenant>, Self::Error>> + Send + '_;

  fn add_channel_account(
    &self,
    input: NewChannelAccount,
  ) -> impl Future<Output = Result<ChannelAccount, Self::Error>> + Send + '_;

  /// Look up an active account by the provider's own identifier.
  fn find_channel_account(
    &self,
    channel_type: ChannelType,
    external_account_id: String,
  ) -> impl Future<Output = Result<Option<ChannelAccount>, Self::Error>> + Send + '_;

  fn get_channel_account(
    &self,
    channel_account_id: Uuid,
  ) -> impl Future<Output = Result<Option<ChannelAccount>, Self::Error>> + Send + '_;
}

// ─── Customers ───────────────────────────────────────────────────────────────

pub trait CustomerRepository: Repository {
  /// Find the customer owning `(channel_account_id, channel_user_id)`.
  fn find_by_channel_identity(
    &self,
    channel_account_id: Uuid,
    channel_user_id: String,
  ) -> impl Future<Output = Result<Option<(Customer, CustomerChannel)>, Self::Error>>
  + Send
  + '_;

  /// Atomically create a customer and its first channel identity.
  ///
  /// If the identity was claimed concurrently, returns the existing pair as
  /// [`Inserted::Existing`] and creates nothing.
  fn create_with_channel(
    &self,
    identity: CustomerIdentity,
  ) -> impl Future<Output = Result<Inserted<(Customer, CustomerChannel)>, Self::Error>>
  + Send
  + '_;

  fn get_customer(
    &self,
    customer_id: Uuid,
  ) -> impl Future<Output = Result<Option<Customer>, Self::Error>> + Send + '_;

  fn list_customer_channels(
    &self,
    customer_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CustomerChannel>, Self::Error>> + Send + '_;

  /// Set profile fields that were unknown. Never overwrites known values.
  fn fill_customer_profile(
    &self,
    customer_id: Uuid,
    display_name: Option<String>,
    language: Option<LanguageCode>,
  ) -> impl Future<Output = Result<Customer, Self::Error>> + Send + '_;

  /// Other customers of the same tenant that look like the same person
  /// (same display name, phone or email).
  fn find_duplicates(
    &self,
    customer_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Customer>, Self::Error>> + Send + '_;

  /// Move the secondary's channels and conversations to the primary and
  /// delete the secondary.
  fn merge_customers(
    &self,
    primary_id: Uuid,
    secondary_id: Uuid,
  ) -> impl Future<Output = Result<MergeReport, Self::Error>> + Send + '_;
}

// ─── Conversations ───────────────────────────────────────────────────────────

pub trait ConversationRepository: Repository {
  /// The most recently created non-resolved conversation for the pair.
  fn find_open_conversation(
    &self,
    customer_id: Uuid,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Option<Conversation>, Self::Error>> + Send + '_;

  /// Create an `active`, AI-enabled conversation. If another open one
  /// appeared concurrently, returns it as [`Inserted::Existing`].
  fn create_conversation(
    &self,
    customer_id: Uuid,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Inserted<Conversation>, Self::Error>> + Send + '_;

  fn get_conversation(
    &self,
    conversation_id: Uuid,
  ) -> impl Future<Output = Result<Option<Conversation>, Self::Error>> + Send + '_;

  fn set_conversation_status(
    &self,
    conversation_id: Uuid,
    status: ConversationStatus,
  ) -> impl Future<Output = Result<Conversation, Self::Error>> + Send + '_;

  fn touch_conversation(
    &self,
    conversation_id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Messages ────────────────────────────────────────────────────────────────

pub trait MessageRepository: Repository {
  /// Insert a message. A row with the same `(conversation_id, direction,
  /// external_id)` is returned as [`Inserted::Existing`] instead.
  fn insert_message(
    &self,
    input: NewMessage,
  ) -> impl Future<Output = Result<Inserted<Message>, Self::Error>> + Send + '_;

  fn get_message(
    &self,
    message_id: Uuid,
  ) -> impl Future<Output = Result<Option<Message>, Self::Error>> + Send + '_;

  /// Find a message by channel-native id and direction, across
  /// conversations.
  fn find_by_external_id(
    &self,
    direction: Direction,
    external_id: String,
  ) -> impl Future<Output = Result<Option<Message>, Self::Error>> + Send + '_;

  /// Forward-only status change; optionally records the channel-native id.
  fn update_message_status(
    &self,
    message_id: Uuid,
    status: MessageStatus,
    external_id: Option<String>,
  ) -> impl Future<Output = Result<Message, Self::Error>> + Send + '_;

  fn update_translation(
    &self,
    message_id: Uuid,
    text: String,
    language: LanguageCode,
  ) -> impl Future<Output = Result<Message, Self::Error>> + Send + '_;

  /// Up to `limit` messages, most recent first.
  fn recent_messages(
    &self,
    conversation_id: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Message>, Self::Error>> + Send + '_;

  /// Messages created strictly after `after` (all when `None`), oldest
  /// first.
  fn messages_after(
    &self,
    conversation_id: Uuid,
    after: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Vec<Message>, Self::Error>> + Send + '_;
}

// ─── Escalations ─────────────────────────────────────────────────────────────

pub trait EscalationRepository: Repository {
  /// Insert an escalation. A second escalation for the same `message_id` is
  /// rejected by the store and the first is returned as
  /// [`Inserted::Existing`].
  fn insert_escalation(
    &self,
    input: NewEscalation,
  ) -> impl Future<Output = Result<Inserted<Escalation>, Self::Error>> + Send + '_;

  fn find_escalation_by_message(
    &self,
    message_id: Uuid,
  ) -> impl Future<Output = Result<Option<Escalation>, Self::Error>> + Send + '_;

  fn list_escalations(
    &self,
    status: Option<EscalationStatus>,
  ) -> impl Future<Output = Result<Vec<Escalation>, Self::Error>> + Send + '_;
}

// ─── Knowledge ───────────────────────────────────────────────────────────────

pub trait KnowledgeRepository: Repository {
  /// Store a document with its pre-computed chunks.
  fn add_document(
    &self,
    input: NewDocument,
    chunks: Vec<NewChunk>,
  ) -> impl Future<Output = Result<KnowledgeDocument, Self::Error>> + Send + '_;

  /// Top-`k` chunks by cosine similarity, restricted to the filter's tenant.
  fn vector_search(
    &self,
    filter: TenantFilter,
    query: Vec<f32>,
    top_k: usize,
  ) -> impl Future<Output = Result<Vec<ChunkHit>, Self::Error>> + Send + '_;

  /// Top-`k` chunks by keyword relevance, restricted to the filter's tenant.
  fn keyword_search(
    &self,
    filter: TenantFilter,
    query: String,
    top_k: usize,
  ) -> impl Future<Output = Result<Vec<ChunkHit>, Self::Error>> + Send + '_;
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// Everything the pipeline needs from a backend.
pub trait Store:
  TenantRepository
  + CustomerRepository
  + ConversationRepository
  + MessageRepository
  + EscalationRepository
  + KnowledgeRepository
{
}

impl<T> Store for T where
  T: TenantRepository
    + CustomerRepository
    + ConversationRepository
    + MessageRepository
    + EscalationRepository
    + KnowledgeRepository
{
}
