//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with microsecond
//! precision so that lexical order equals chronological order. Enums use
//! their `strum` string forms. Structured fields are compact JSON.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use clinic_core::{
  channel::{ChannelAccount, ChannelCredentials},
  conversation::Conversation,
  customer::{Customer, CustomerChannel},
  escalation::Escalation,
  knowledge::ChunkHit,
  language::LanguageCode,
  message::Message,
  tenant::{AiConfig, Tenant},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

/// The current time, truncated to the precision the store keeps.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_enum<T: FromStr>(kind: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| Error::Decode { kind, value: s.to_owned() })
}

pub fn decode_language(s: Option<String>) -> Result<Option<LanguageCode>> {
  s.as_deref()
    .map(|v| LanguageCode::from_str(v).map_err(Error::Core))
    .transpose()
}

pub fn encode_language(lang: Option<LanguageCode>) -> Option<String> {
  lang.map(|l| l.code().to_owned())
}

pub fn encode_embedding(v: &[f32]) -> Result<String> { Ok(serde_json::to_string(v)?) }

pub fn decode_embedding(s: &str) -> Result<Vec<f32>> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const TENANT_COLUMNS: &str =
  "tenant_id, name, specialty, default_language, ai_config, created_at";

pub struct RawTenant {
  pub tenant_id:        String,
  pub name:             String,
  pub specialty:        Option<String>,
  pub default_language: String,
  pub ai_config:        String,
  pub created_at:       String,
}

impl RawTenant {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      tenant_id:        row.get(0)?,
      name:             row.get(1)?,
      specialty:        row.get(2)?,
      default_language: row.get(3)?,
      ai_config:        row.get(4)?,
      created_at:       row.get(5)?,
    })
  }

  pub fn into_tenant(self) -> Result<Tenant> {
    let ai: AiConfig = serde_json::from_str(&self.ai_config)?;
    Ok(Tenant {
      tenant_id: decode_uuid(&self.tenant_id)?,
      name: self.name,
      specialty: self.specialty,
      default_language: LanguageCode::from_str(&self.default_language)?,
      ai,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const CHANNEL_ACCOUNT_COLUMNS: &str = "channel_account_id, tenant_id, channel_type, \
   external_account_id, credentials, active, created_at";

pub struct RawChannelAccount {
  pub channel_account_id:  String,
  pub tenant_id:           String,
  pub channel_type:        String,
  pub external_account_id: String,
  pub credentials:         String,
  pub active:              bool,
  pub created_at:          String,
}

impl RawChannelAccount {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      channel_account_id:  row.get(0)?,
      tenant_id:           row.get(1)?,
      channel_type:        row.get(2)?,
      external_account_id: row.get(3)?,
      credentials:         row.get(4)?,
      active:              row.get(5)?,
      created_at:          row.get(6)?,
    })
  }

  pub fn into_account(self) -> Result<ChannelAccount> {
    let credentials: ChannelCredentials = serde_json::from_str(&self.credentials)?;
    Ok(ChannelAccount {
      channel_account_id: decode_uuid(&self.channel_account_id)?,
      tenant_id: decode_uuid(&self.tenant_id)?,
      channel_type: decode_enum("channel type", &self.channel_type)?,
      external_account_id: self.external_account_id,
      credentials,
      active: self.active,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const CUSTOMER_COLUMNS: &str = "customer_id, tenant_id, display_name, profile_image_url, \
   language, country, tags, metadata, created_at";

pub struct RawCustomer {
  pub customer_id:       String,
  pub tenant_id:         String,
  pub display_name:      Option<String>,
  pub profile_image_url: Option<String>,
  pub language:          Option<String>,
  pub country:           Option<String>,
  pub tags:              String,
  pub metadata:          String,
  pub created_at:        String,
}

impl RawCustomer {
  /// Reads the customer columns starting at `offset`.
  pub fn from_row_at(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      customer_id:       row.get(offset)?,
      tenant_id:         row.get(offset + 1)?,
      display_name:      row.get(offset + 2)?,
      profile_image_url: row.get(offset + 3)?,
      language:          row.get(offset + 4)?,
      country:           row.get(offset + 5)?,
      tags:              row.get(offset + 6)?,
      metadata:          row.get(offset + 7)?,
      created_at:        row.get(offset + 8)?,
    })
  }

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> { Self::from_row_at(row, 0) }

  pub fn into_customer(self) -> Result<Customer> {
    Ok(Customer {
      customer_id:       decode_uuid(&self.customer_id)?,
      tenant_id:         decode_uuid(&self.tenant_id)?,
      display_name:      self.display_name,
      profile_image_url: self.profile_image_url,
      language:          decode_language(self.language)?,
      country:           self.country,
      tags:              serde_json::from_str(&self.tags)?,
      metadata:          serde_json::from_str(&self.metadata)?,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

pub const CUSTOMER_CHANNEL_COLUMNS: &str = "customer_channel_id, customer_id, \
   channel_account_id, channel_user_id, channel_username, created_at";

pub struct RawCustomerChannel {
  pub customer_channel_id: String,
  pub customer_id:         String,
  pub channel_account_id:  String,
  pub channel_user_id:     String,
  pub channel_username:    Option<String>,
  pub created_at:          String,
}

impl RawCustomerChannel {
  pub fn from_row_at(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      customer_channel_id: row.get(offset)?,
      customer_id:         row.get(offset + 1)?,
      channel_account_id:  row.get(offset + 2)?,
      channel_user_id:     row.get(offset + 3)?,
      channel_username:    row.get(offset + 4)?,
      created_at:          row.get(offset + 5)?,
    })
  }

  pub fn into_channel(self) -> Result<CustomerChannel> {
    Ok(CustomerChannel {
      customer_channel_id: decode_uuid(&self.customer_channel_id)?,
      customer_id:         decode_uuid(&self.customer_id)?,
      channel_account_id:  decode_uuid(&self.channel_account_id)?,
      channel_user_id:     self.channel_user_id,
      channel_username:    self.channel_username,
      created_at:          decode_dt(&self.created_at)?,
    })
  }
}

pub const CONVERSATION_COLUMNS: &str = "conversation_id, customer_id, tenant_id, status, \
   ai_enabled, assigned_agent_id, last_message_at, created_at";

pub struct RawConversation {
  pub conversation_id:   String,
  pub customer_id:       String,
  pub tenant_id:         String,
  pub status:            String,
  pub ai_enabled:        bool,
  pub assigned_agent_id: Option<String>,
  pub last_message_at:   Option<String>,
  pub created_at:        String,
}

impl RawConversation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      conversation_id:   row.get(0)?,
      customer_id:       row.get(1)?,
      tenant_id:         row.get(2)?,
      status:            row.get(3)?,
      ai_enabled:        row.get(4)?,
      assigned_agent_id: row.get(5)?,
      last_message_at:   row.get(6)?,
      created_at:        row.get(7)?,
    })
  }

  pub fn into_conversation(self) -> Result<Conversation> {
    Ok(Conversation {
      conversation_id:   decode_uuid(&self.conversation_id)?,
      customer_id:       decode_uuid(&self.customer_id)?,
      tenant_id:         decode_uuid(&self.tenant_id)?,
      status:            decode_enum("conversation status", &self.status)?,
      ai_enabled:        self.ai_enabled,
      assigned_agent_id: decode_opt_uuid(self.assigned_agent_id)?,
      last_message_at:   self.last_message_at.as_deref().map(decode_dt).transpose()?,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

pub const MESSAGE_COLUMNS: &str = "message_id, conversation_id, direction, sender_type, \
   content, content_type, media_url, original_language, translated_content, \
   translated_language, ai_confidence, ai_model, status, external_id, created_at";

pub struct RawMessage {
  pub message_id:          String,
  pub conversation_id:     String,
  pub direction:           String,
  pub sender_type:         String,
  pub content:             String,
  pub content_type:        String,
  pub media_url:           Option<String>,
  pub original_language:   Option<String>,
  pub translated_content:  Option<String>,
  pub translated_language: Option<String>,
  pub ai_confidence:       Option<f64>,
  pub ai_model:            Option<String>,
  pub status:              String,
  pub external_id:         Option<String>,
  pub created_at:          String,
}

impl RawMessage {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      message_id:          row.get(0)?,
      conversation_id:     row.get(1)?,
      direction:           row.get(2)?,
      sender_type:         row.get(3)?,
      content:             row.get(4)?,
      content_type:        row.get(5)?,
      media_url:           row.get(6)?,
      original_language:   row.get(7)?,
      translated_content:  row.get(8)?,
      translated_language: row.get(9)?,
      ai_confidence:       row.get(10)?,
      ai_model:            row.get(11)?,
      status:              row.get(12)?,
      external_id:         row.get(13)?,
      created_at:          row.get(14)?,
    })
  }

  pub fn into_message(self) -> Result<Message> {
    Ok(Message {
      message_id:          decode_uuid(&self.message_id)?,
      conversation_id:     decode_uuid(&self.conversation_id)?,
      direction:           decode_enum("direction", &self.direction)?,
      sender_type:         decode_enum("sender type", &self.sender_type)?,
      content:             self.content,
      content_type:        decode_enum("content type", &self.content_type)?,
      media_url:           self.media_url,
      original_language:   decode_language(self.original_language)?,
      translated_content:  self.translated_content,
      translated_language: decode_language(self.translated_language)?,
      ai_confidence:       self.ai_confidence.map(|c| c as f32),
      ai_model:            self.ai_model,
      status:              decode_enum("message status", &self.status)?,
      external_id:         self.external_id,
      created_at:          decode_dt(&self.created_at)?,
    })
  }
}

pub const ESCALATION_COLUMNS: &str = "escalation_id, conversation_id, message_id, reason, \
   ai_confidence, priority, status, created_at";

pub struct RawEscalation {
  pub escalation_id:   String,
  pub conversation_id: String,
  pub message_id:      Option<String>,
  pub reason:          String,
  pub ai_confidence:   Option<f64>,
  pub priority:        String,
  pub status:          String,
  pub created_at:      String,
}

impl RawEscalation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      escalation_id:   row.get(0)?,
      conversation_id: row.get(1)?,
      message_id:      row.get(2)?,
      reason:          row.get(3)?,
      ai_confidence:   row.get(4)?,
      priority:        row.get(5)?,
      status:          row.get(6)?,
      created_at:      row.get(7)?,
    })
  }

  pub fn into_escalation(self) -> Result<Escalation> {
    Ok(Escalation {
      escalation_id:   decode_uuid(&self.escalation_id)?,
      conversation_id: decode_uuid(&self.conversation_id)?,
      message_id:      decode_opt_uuid(self.message_id)?,
      reason:          self.reason,
      ai_confidence:   self.ai_confidence.map(|c| c as f32),
      priority:        decode_enum("escalation priority", &self.priority)?,
      status:          decode_enum("escalation status", &self.status)?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

/// A chunk joined with its document, before scoring.
pub struct RawChunk {
  pub chunk_id:             String,
  pub document_id:          String,
  pub document_name:        String,
  pub document_description: Option<String>,
  pub content:              String,
  pub embedding:            String,
}

impl RawChunk {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      chunk_id:             row.get(0)?,
      document_id:          row.get(1)?,
      document_name:        row.get(2)?,
      document_description: row.get(3)?,
      content:              row.get(4)?,
      embedding:            row.get(5)?,
    })
  }

  pub fn into_hit(self, score: f32) -> Result<ChunkHit> {
    Ok(ChunkHit {
      chunk_id: decode_uuid(&self.chunk_id)?,
      document_id: decode_uuid(&self.document_id)?,
      document_name: self.document_name,
      document_description: self.document_description,
      content: self.content,
      score,
    })
  }
}
