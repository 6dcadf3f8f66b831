//! [`SqliteStore`]: the SQLite implementation of the repository traits.

use std::path::Path;

use chrono::{DateTime, Utc};
use clinic_core::{
  channel::{ChannelAccount, ChannelType, NewChannelAccount},
  conversation::{Conversation, ConversationStatus},
  customer::{Customer, CustomerChannel, CustomerIdentity, MergeReport},
  escalation::{Escalation, EscalationStatus, NewEscalation},
  knowledge::{ChunkHit, KnowledgeDocument, NewChunk, NewDocument, TenantFilter},
  language::LanguageCode,
  message::{Direction, Message, MessageStatus, NewMessage},
  store::{
    ConversationRepository, CustomerRepository, EscalationRepository, Inserted,
    KnowledgeRepository, MessageRepository, Repository, TenantRepository,
  },
  tenant::{NewTenant, Tenant},
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    CHANNEL_ACCOUNT_COLUMNS, CONVERSATION_COLUMNS, CUSTOMER_CHANNEL_COLUMNS, CUSTOMER_COLUMNS,
    ESCALATION_COLUMNS, MESSAGE_COLUMNS, RawChannelAccount, RawChunk, RawConversation,
    RawCustomer, RawCustomerChannel, RawEscalation, RawMessage, RawTenant, TENANT_COLUMNS,
    decode_embedding, encode_dt, encode_embedding, encode_language, encode_uuid, now,
  },
  rank::{bm25_scores, cosine_similarity},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The platform store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

/// True for UNIQUE / PRIMARY KEY violations, which the repositories turn
/// into [`Inserted::Existing`].
fn is_unique_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(err, _)
      if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
  )
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn message_by_external(
    &self,
    conversation_id: Uuid,
    direction: Direction,
    external_id: String,
  ) -> Result<Option<Message>> {
    let conv_str = encode_uuid(conversation_id);
    let dir_str = direction.as_ref().to_owned();

    let raw: Option<RawMessage> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1 AND direction = ?2 AND external_id = ?3"
              ),
              rusqlite::params![conv_str, dir_str, external_id],
              RawMessage::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawMessage::into_message).transpose()
  }

  async fn tenant_chunks(&self, filter: TenantFilter) -> Result<Vec<RawChunk>> {
    let tenant_str = encode_uuid(filter.tenant_id());

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT c.chunk_id, c.document_id, d.name, d.description, c.content, c.embedding
           FROM knowledge_chunks c
           JOIN knowledge_documents d ON d.document_id = c.document_id
           WHERE c.tenant_id = ?1 AND d.tenant_id = ?1
           ORDER BY c.document_id, c.chunk_index",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str], RawChunk::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(raws)
  }
}

fn top_k(mut hits: Vec<ChunkHit>, k: usize) -> Vec<ChunkHit> {
  hits.sort_by(|a, b| {
    b.score
      .total_cmp(&a.score)
      .then_with(|| a.chunk_id.cmp(&b.chunk_id))
  });
  hits.truncate(k);
  hits
}

impl Repository for SqliteStore {
  type Error = Error;
}

// ─── Tenants ─────────────────────────────────────────────────────────────────

impl TenantRepository for SqliteStore {
  async fn add_tenant(&self, input: NewTenant) -> Result<Tenant> {
    let tenant = Tenant {
      tenant_id:        Uuid::new_v4(),
      name:             input.name,
      specialty:        input.specialty,
      default_language: input.default_language,
      ai:               input.ai,
      created_at:       now(),
    };

    let id_str = encode_uuid(tenant.tenant_id);
    let name = tenant.name.clone();
    let specialty = tenant.specialty.clone();
    let lang = tenant.default_language.code().to_owned();
    let ai_str = serde_json::to_string(&tenant.ai)?;
    let at_str = encode_dt(tenant.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO tenants (tenant_id, name, specialty, default_language, ai_config, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, name, specialty, lang, ai_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(tenant)
  }

  async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>> {
    let id_str = encode_uuid(tenant_id);

    let raw: Option<RawTenant> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE tenant_id = ?1"),
              rusqlite::params![id_str],
              RawTenant::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTenant::into_tenant).transpose()
  }

  async fn add_channel_account(&self, input: NewChannelAccount) -> Result<ChannelAccount> {
    let account = ChannelAccount {
      channel_account_id:  Uuid::new_v4(),
      tenant_id:           input.tenant_id,
      channel_type:        input.channel_type,
      external_account_id: input.external_account_id,
      credentials:         input.credentials,
      active:              true,
      created_at:          now(),
    };

    let id_str = encode_uuid(account.channel_account_id);
    let tenant_str = encode_uuid(account.tenant_id);
    let type_str = account.channel_type.as_ref().to_owned();
    let external = account.external_account_id.clone();
    let creds_str = serde_json::to_string(&account.credentials)?;
    let at_str = encode_dt(account.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO channel_accounts (
             channel_account_id, tenant_id, channel_type, external_account_id,
             credentials, active, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
          rusqlite::params![id_str, tenant_str, type_str, external, creds_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(account)
  }

  async fn find_channel_account(
    &self,
    channel_type: ChannelType,
    external_account_id: String,
  ) -> Result<Option<ChannelAccount>> {
    let type_str = channel_type.as_ref().to_owned();

    let raw: Option<RawChannelAccount> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CHANNEL_ACCOUNT_COLUMNS} FROM channel_accounts
                 WHERE channel_type = ?1 AND external_account_id = ?2 AND active = 1"
              ),
              rusqlite::params![type_str, external_account_id],
              RawChannelAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawChannelAccount::into_account).transpose()
  }

  async fn get_channel_account(&self, channel_account_id: Uuid) -> Result<Option<ChannelAccount>> {
    let id_str = encode_uuid(channel_account_id);

    let raw: Option<RawChannelAccount> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CHANNEL_ACCOUNT_COLUMNS} FROM channel_accounts
                 WHERE channel_account_id = ?1"
              ),
              rusqlite::params![id_str],
              RawChannelAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawChannelAccount::into_account).transpose()
  }
}

// ─── Customers ───────────────────────────────────────────────────────────────

impl CustomerRepository for SqliteStore {
  async fn find_by_channel_identity(
    &self,
    channel_account_id: Uuid,
    channel_user_id: String,
  ) -> Result<Option<(Customer, CustomerChannel)>> {
    let account_str = encode_uuid(channel_account_id);

    let raw: Option<(RawCustomer, RawCustomerChannel)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT c.customer_id, c.tenant_id, c.display_name, c.profile_image_url,
                      c.language, c.country, c.tags, c.metadata, c.created_at,
                      cc.customer_channel_id, cc.customer_id, cc.channel_account_id,
                      cc.channel_user_id, cc.channel_username, cc.created_at
               FROM customer_channels cc
               JOIN customers c ON c.customer_id = cc.customer_id
               WHERE cc.channel_account_id = ?1 AND cc.channel_user_id = ?2",
              rusqlite::params![account_str, channel_user_id],
              |row| Ok((RawCustomer::from_row_at(row, 0)?, RawCustomerChannel::from_row_at(row, 9)?)),
            )
            .optional()?,
        )
      })
      .await?;

    raw
      .map(|(c, cc)| Ok((c.into_customer()?, cc.into_channel()?)))
      .transpose()
  }

  async fn create_with_channel(
    &self,
    identity: CustomerIdentity,
  ) -> Result<Inserted<(Customer, CustomerChannel)>> {
    let created_at = now();
    let customer = Customer {
      customer_id: Uuid::new_v4(),
      tenant_id: identity.tenant_id,
      display_name: identity.name.clone().or_else(|| identity.channel_username.clone()),
      profile_image_url: identity.profile_image_url.clone(),
      language: identity.language,
      country: None,
      tags: Vec::new(),
      metadata: serde_json::json!({}),
      created_at,
    };
    let channel = CustomerChannel {
      customer_channel_id: Uuid::new_v4(),
      customer_id: customer.customer_id,
      channel_account_id: identity.channel_account_id,
      channel_user_id: identity.channel_user_id.clone(),
      channel_username: identity.channel_username.clone(),
      created_at,
    };

    let customer_str = encode_uuid(customer.customer_id);
    let tenant_str = encode_uuid(customer.tenant_id);
    let name = customer.display_name.clone();
    let image = customer.profile_image_url.clone();
    let lang = encode_language(customer.language);
    let channel_str = encode_uuid(channel.customer_channel_id);
    let account_str = encode_uuid(channel.channel_account_id);
    let user_id = channel.channel_user_id.clone();
    let username = channel.channel_username.clone();
    let at_str = encode_dt(created_at);

    let created = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO customers (
             customer_id, tenant_id, display_name, profile_image_url, language, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![customer_str, tenant_str, name, image, lang, at_str],
        )?;
        let res = tx.execute(
          "INSERT INTO customer_channels (
             customer_channel_id, customer_id, channel_account_id, channel_user_id,
             channel_username, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![channel_str, customer_str, account_str, user_id, username, at_str],
        );
        match res {
          Ok(_) => {
            tx.commit()?;
            Ok(true)
          }
          // Dropping `tx` rolls back the customer row as well.
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if created {
      return Ok(Inserted::Created((customer, channel)));
    }

    self
      .find_by_channel_identity(identity.channel_account_id, identity.channel_user_id)
      .await?
      .map(Inserted::Existing)
      .ok_or(Error::Conflict { entity: "customer channel", id: identity.channel_account_id })
  }

  async fn get_customer(&self, customer_id: Uuid) -> Result<Option<Customer>> {
    let id_str = encode_uuid(customer_id);

    let raw: Option<RawCustomer> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE customer_id = ?1"),
              rusqlite::params![id_str],
              RawCustomer::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCustomer::into_customer).transpose()
  }

  async fn list_customer_channels(&self, customer_id: Uuid) -> Result<Vec<CustomerChannel>> {
    let id_str = encode_uuid(customer_id);

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CUSTOMER_CHANNEL_COLUMNS} FROM customer_channels
           WHERE customer_id = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| RawCustomerChannel::from_row_at(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCustomerChannel::into_channel).collect()
  }

  async fn fill_customer_profile(
    &self,
    customer_id: Uuid,
    display_name: Option<String>,
    language: Option<LanguageCode>,
  ) -> Result<Customer> {
    let id_str = encode_uuid(customer_id);
    let lang = encode_language(language);

    let changed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE customers
           SET display_name = COALESCE(display_name, ?2),
               language     = COALESCE(language, ?3)
           WHERE customer_id = ?1",
          rusqlite::params![id_str, display_name, lang],
        )?;
        Ok(n)
      })
      .await?;

    if changed == 0 {
      return Err(Error::NotFound { entity: "customer", id: customer_id });
    }
    self
      .get_customer(customer_id)
      .await?
      .ok_or(Error::NotFound { entity: "customer", id: customer_id })
  }

  async fn find_duplicates(&self, customer_id: Uuid) -> Result<Vec<Customer>> {
    let target = self
      .get_customer(customer_id)
      .await?
      .ok_or(Error::NotFound { entity: "customer", id: customer_id })?;

    let name = target
      .display_name
      .as_deref()
      .map(str::trim)
      .filter(|n| !n.is_empty())
      .map(str::to_owned);
    let meta_str = |key: &str| {
      target
        .metadata
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
    };
    let phone = meta_str("phone");
    let email = meta_str("email");

    if name.is_none() && phone.is_none() && email.is_none() {
      return Ok(Vec::new());
    }

    let id_str = encode_uuid(customer_id);
    let tenant_str = encode_uuid(target.tenant_id);

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CUSTOMER_COLUMNS} FROM customers
           WHERE tenant_id = ?1 AND customer_id != ?2
             AND (
               (?3 IS NOT NULL AND lower(trim(display_name)) = lower(?3))
               OR (?4 IS NOT NULL AND json_extract(metadata, '$.phone') = ?4)
               OR (?5 IS NOT NULL AND lower(json_extract(metadata, '$.email')) = lower(?5))
             )
           ORDER BY created_at"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![tenant_str, id_str, name, phone, email],
            RawCustomer::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCustomer::into_customer).collect()
  }

  async fn merge_customers(&self, primary_id: Uuid, secondary_id: Uuid) -> Result<MergeReport> {
    if primary_id == secondary_id {
      return Err(Error::SelfMerge(primary_id));
    }
    let primary = self
      .get_customer(primary_id)
      .await?
      .ok_or(Error::NotFound { entity: "customer", id: primary_id })?;
    let secondary = self
      .get_customer(secondary_id)
      .await?
      .ok_or(Error::NotFound { entity: "customer", id: secondary_id })?;
    if primary.tenant_id != secondary.tenant_id {
      return Err(Error::CrossTenantMerge(primary_id, secondary_id));
    }

    let primary_str = encode_uuid(primary_id);
    let secondary_str = encode_uuid(secondary_id);

    let (channels_moved, conversations_resolved, conversations_moved) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let channels = tx.execute(
          "UPDATE customer_channels SET customer_id = ?1 WHERE customer_id = ?2",
          rusqlite::params![primary_str, secondary_str],
        )?;

        // Keep the one-open-thread rule: the secondary's live thread yields
        // when the primary already has one with the same tenant.
        let resolved = tx.execute(
          "UPDATE conversations SET status = 'resolved'
           WHERE customer_id = ?2 AND status != 'resolved'
             AND EXISTS (
               SELECT 1 FROM conversations p
               WHERE p.customer_id = ?1
                 AND p.tenant_id = conversations.tenant_id
                 AND p.status != 'resolved'
             )",
          rusqlite::params![primary_str, secondary_str],
        )?;

        let moved = tx.execute(
          "UPDATE conversations SET customer_id = ?1 WHERE customer_id = ?2",
          rusqlite::params![primary_str, secondary_str],
        )?;

        tx.execute(
          "UPDATE customers SET
             display_name      = COALESCE(display_name,
                                   (SELECT display_name FROM customers WHERE customer_id = ?2)),
             profile_image_url = COALESCE(profile_image_url,
                                   (SELECT profile_image_url FROM customers WHERE customer_id = ?2)),
             language          = COALESCE(language,
                                   (SELECT language FROM customers WHERE customer_id = ?2)),
             country           = COALESCE(country,
                                   (SELECT country FROM customers WHERE customer_id = ?2))
           WHERE customer_id = ?1",
          rusqlite::params![primary_str, secondary_str],
        )?;

        tx.execute(
          "DELETE FROM customers WHERE customer_id = ?1",
          rusqlite::params![secondary_str],
        )?;

        tx.commit()?;
        Ok((channels, resolved, moved))
      })
      .await?;

    tracing::info!(
      %primary_id,
      %secondary_id,
      channels_moved,
      conversations_moved,
      conversations_resolved,
      "merged customers"
    );

    Ok(MergeReport {
      primary_id,
      secondary_id,
      channels_moved,
      conversations_moved,
      conversations_resolved,
    })
  }
}

// ─── Conversations ───────────────────────────────────────────────────────────

impl ConversationRepository for SqliteStore {
  async fn find_open_conversation(
    &self,
    customer_id: Uuid,
    tenant_id: Uuid,
  ) -> Result<Option<Conversation>> {
    let customer_str = encode_uuid(customer_id);
    let tenant_str = encode_uuid(tenant_id);

    let raw: Option<RawConversation> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE customer_id = ?1 AND tenant_id = ?2 AND status != 'resolved'
                 ORDER BY created_at DESC
                 LIMIT 1"
              ),
              rusqlite::params![customer_str, tenant_str],
              RawConversation::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawConversation::into_conversation).transpose()
  }

  async fn create_conversation(
    &self,
    customer_id: Uuid,
    tenant_id: Uuid,
  ) -> Result<Inserted<Conversation>> {
    let conversation = Conversation {
      conversation_id: Uuid::new_v4(),
      customer_id,
      tenant_id,
      status: ConversationStatus::Active,
      ai_enabled: true,
      assigned_agent_id: None,
      last_message_at: None,
      created_at: now(),
    };

    let id_str = encode_uuid(conversation.conversation_id);
    let customer_str = encode_uuid(customer_id);
    let tenant_str = encode_uuid(tenant_id);
    let status_str = conversation.status.as_ref().to_owned();
    let at_str = encode_dt(conversation.created_at);

    let created = self
      .conn
      .call(move |conn| {
        let res = conn.execute(
          "INSERT INTO conversations (
             conversation_id, customer_id, tenant_id, status, ai_enabled, created_at
           ) VALUES (?1, ?2, ?3, ?4, 1, ?5)",
          rusqlite::params![id_str, customer_str, tenant_str, status_str, at_str],
        );
        match res {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if created {
      return Ok(Inserted::Created(conversation));
    }

    self
      .find_open_conversation(customer_id, tenant_id)
      .await?
      .map(Inserted::Existing)
      .ok_or(Error::Conflict { entity: "conversation", id: customer_id })
  }

  async fn get_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
    let id_str = encode_uuid(conversation_id);

    let raw: Option<RawConversation> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE conversation_id = ?1"),
              rusqlite::params![id_str],
              RawConversation::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawConversation::into_conversation).transpose()
  }

  async fn set_conversation_status(
    &self,
    conversation_id: Uuid,
    status: ConversationStatus,
  ) -> Result<Conversation> {
    let id_str = encode_uuid(conversation_id);
    let status_str = status.as_ref().to_owned();

    let changed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE conversations SET status = ?2 WHERE conversation_id = ?1",
          rusqlite::params![id_str, status_str],
        )?;
        Ok(n)
      })
      .await?;

    if changed == 0 {
      return Err(Error::NotFound { entity: "conversation", id: conversation_id });
    }
    self
      .get_conversation(conversation_id)
      .await?
      .ok_or(Error::NotFound { entity: "conversation", id: conversation_id })
  }

  async fn touch_conversation(&self, conversation_id: Uuid, at: DateTime<Utc>) -> Result<()> {
    let id_str = encode_uuid(conversation_id);
    let at_str = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE conversations
           SET last_message_at = ?2
           WHERE conversation_id = ?1 AND (last_message_at IS NULL OR last_message_at < ?2)",
          rusqlite::params![id_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Messages ────────────────────────────────────────────────────────────────

impl MessageRepository for SqliteStore {
  async fn insert_message(&self, input: NewMessage) -> Result<Inserted<Message>> {
    let message = Message {
      message_id:          Uuid::new_v4(),
      conversation_id:     input.conversation_id,
      direction:           input.direction,
      sender_type:         input.sender_type,
      content:             input.content,
      content_type:        input.content_type,
      media_url:           input.media_url,
      original_language:   input.original_language,
      translated_content:  input.translated_content,
      translated_language: input.translated_language,
      ai_confidence:       input.ai_confidence,
      ai_model:            input.ai_model,
      status:              input.status,
      external_id:         input.external_id,
      created_at:          now(),
    };

    let id_str = encode_uuid(message.message_id);
    let conv_str = encode_uuid(message.conversation_id);
    let dir_str = message.direction.as_ref().to_owned();
    let sender_str = message.sender_type.as_ref().to_owned();
    let content = message.content.clone();
    let ctype_str = message.content_type.as_ref().to_owned();
    let media = message.media_url.clone();
    let orig_lang = encode_language(message.original_language);
    let translated = message.translated_content.clone();
    let trans_lang = encode_language(message.translated_language);
    let confidence = message.ai_confidence.map(f64::from);
    let model = message.ai_model.clone();
    let status_str = message.status.as_ref().to_owned();
    let external = message.external_id.clone();
    let at_str = encode_dt(message.created_at);

    let created = self
      .conn
      .call(move |conn| {
        let res = conn.execute(
          &format!(
            "INSERT INTO messages ({MESSAGE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
          ),
          rusqlite::params![
            id_str, conv_str, dir_str, sender_str, content, ctype_str, media, orig_lang,
            translated, trans_lang, confidence, model, status_str, external, at_str,
          ],
        );
        match res {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if created {
      return Ok(Inserted::Created(message));
    }

    let external_id = message
      .external_id
      .clone()
      .ok_or(Error::Conflict { entity: "message", id: message.message_id })?;
    self
      .message_by_external(message.conversation_id, message.direction, external_id)
      .await?
      .map(Inserted::Existing)
      .ok_or(Error::Conflict { entity: "message", id: message.message_id })
  }

  async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>> {
    let id_str = encode_uuid(message_id);

    let raw: Option<RawMessage> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ?1"),
              rusqlite::params![id_str],
              RawMessage::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawMessage::into_message).transpose()
  }

  async fn find_by_external_id(
    &self,
    direction: Direction,
    external_id: String,
  ) -> Result<Option<Message>> {
    let dir_str = direction.as_ref().to_owned();

    let raw: Option<RawMessage> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE direction = ?1 AND external_id = ?2
                 ORDER BY created_at DESC
                 LIMIT 1"
              ),
              rusqlite::params![dir_str, external_id],
              RawMessage::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawMessage::into_message).transpose()
  }

  async fn update_message_status(
    &self,
    message_id: Uuid,
    status: MessageStatus,
    external_id: Option<String>,
  ) -> Result<Message> {
    let current = self
      .get_message(message_id)
      .await?
      .ok_or(Error::NotFound { entity: "message", id: message_id })?;

    let moves = current.status.check_transition(status)?;
    if !moves && external_id.is_none() {
      return Ok(current);
    }

    let id_str = encode_uuid(message_id);
    let old_str = current.status.as_ref().to_owned();
    let new_str = status.as_ref().to_owned();

    // Conditional on the status we validated against, so a concurrent
    // transition cannot be overwritten.
    let changed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE messages
           SET status = ?3, external_id = COALESCE(?4, external_id)
           WHERE message_id = ?1 AND status = ?2",
          rusqlite::params![id_str, old_str, new_str, external_id],
        )?;
        Ok(n)
      })
      .await?;

    if changed == 0 {
      return Err(Error::Conflict { entity: "message", id: message_id });
    }
    self
      .get_message(message_id)
      .await?
      .ok_or(Error::NotFound { entity: "message", id: message_id })
  }

  async fn update_translation(
    &self,
    message_id: Uuid,
    text: String,
    language: LanguageCode,
  ) -> Result<Message> {
    let id_str = encode_uuid(message_id);
    let lang = language.code().to_owned();

    let changed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE messages SET translated_content = ?2, translated_language = ?3
           WHERE message_id = ?1",
          rusqlite::params![id_str, text, lang],
        )?;
        Ok(n)
      })
      .await?;

    if changed == 0 {
      return Err(Error::NotFound { entity: "message", id: message_id });
    }
    self
      .get_message(message_id)
      .await?
      .ok_or(Error::NotFound { entity: "message", id: message_id })
  }

  async fn recent_messages(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<Message>> {
    let id_str = encode_uuid(conversation_id);
    let limit_val = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MESSAGE_COLUMNS} FROM messages
           WHERE conversation_id = ?1
           ORDER BY created_at DESC, rowid DESC
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, limit_val], RawMessage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }

  async fn messages_after(
    &self,
    conversation_id: Uuid,
    after: Option<DateTime<Utc>>,
  ) -> Result<Vec<Message>> {
    let id_str = encode_uuid(conversation_id);
    let after_str = after.map(encode_dt);

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MESSAGE_COLUMNS} FROM messages
           WHERE conversation_id = ?1 AND (?2 IS NULL OR created_at > ?2)
           ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, after_str], RawMessage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }
}

// ─── Escalations ─────────────────────────────────────────────────────────────

impl EscalationRepository for SqliteStore {
  async fn insert_escalation(&self, input: NewEscalation) -> Result<Inserted<Escalation>> {
    let escalation = Escalation {
      escalation_id:   Uuid::new_v4(),
      conversation_id: input.conversation_id,
      message_id:      input.message_id,
      reason:          input.reason,
      ai_confidence:   input.ai_confidence,
      priority:        input.priority,
      status:          EscalationStatus::Pending,
      created_at:      now(),
    };

    let id_str = encode_uuid(escalation.escalation_id);
    let conv_str = encode_uuid(escalation.conversation_id);
    let msg_str = escalation.message_id.map(encode_uuid);
    let reason = escalation.reason.clone();
    let confidence = escalation.ai_confidence.map(f64::from);
    let priority_str = escalation.priority.as_ref().to_owned();
    let status_str = escalation.status.as_ref().to_owned();
    let at_str = encode_dt(escalation.created_at);

    let created = self
      .conn
      .call(move |conn| {
        let res = conn.execute(
          &format!(
            "INSERT INTO escalations ({ESCALATION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
          ),
          rusqlite::params![
            id_str, conv_str, msg_str, reason, confidence, priority_str, status_str, at_str,
          ],
        );
        match res {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if created {
      return Ok(Inserted::Created(escalation));
    }

    let message_id = escalation
      .message_id
      .ok_or(Error::Conflict { entity: "escalation", id: escalation.escalation_id })?;
    self
      .find_escalation_by_message(message_id)
      .await?
      .map(Inserted::Existing)
      .ok_or(Error::Conflict { entity: "escalation", id: escalation.escalation_id })
  }

  async fn find_escalation_by_message(&self, message_id: Uuid) -> Result<Option<Escalation>> {
    let id_str = encode_uuid(message_id);

    let raw: Option<RawEscalation> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ESCALATION_COLUMNS} FROM escalations WHERE message_id = ?1"),
              rusqlite::params![id_str],
              RawEscalation::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEscalation::into_escalation).transpose()
  }

  async fn list_escalations(&self, status: Option<EscalationStatus>) -> Result<Vec<Escalation>> {
    let status_str = status.map(|s| s.as_ref().to_owned());

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ESCALATION_COLUMNS} FROM escalations
           WHERE ?1 IS NULL OR status = ?1
           ORDER BY created_at DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![status_str], RawEscalation::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEscalation::into_escalation).collect()
  }
}

// ─── Knowledge ───────────────────────────────────────────────────────────────

impl KnowledgeRepository for SqliteStore {
  async fn add_document(
    &self,
    input: NewDocument,
    chunks: Vec<NewChunk>,
  ) -> Result<KnowledgeDocument> {
    let document = KnowledgeDocument {
      document_id: Uuid::new_v4(),
      tenant_id:   input.tenant_id,
      name:        input.name,
      description: input.description,
      content:     input.content,
      created_at:  now(),
    };

    let doc_str = encode_uuid(document.document_id);
    let tenant_str = encode_uuid(document.tenant_id);
    let name = document.name.clone();
    let description = document.description.clone();
    let content = document.content.clone();
    let at_str = encode_dt(document.created_at);
    let encoded_chunks = chunks
      .into_iter()
      .map(|c| Ok((encode_uuid(Uuid::new_v4()), c.content, encode_embedding(&c.embedding)?)))
      .collect::<Result<Vec<_>>>()?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO knowledge_documents (document_id, tenant_id, name, description, content, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![doc_str, tenant_str, name, description, content, at_str],
        )?;
        for (index, (chunk_id, chunk_content, embedding)) in encoded_chunks.into_iter().enumerate() {
          tx.execute(
            "INSERT INTO knowledge_chunks (chunk_id, document_id, tenant_id, chunk_index, content, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![chunk_id, doc_str, tenant_str, index as i64, chunk_content, embedding],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(document)
  }

  async fn vector_search(
    &self,
    filter: TenantFilter,
    query: Vec<f32>,
    top: usize,
  ) -> Result<Vec<ChunkHit>> {
    let raws = self.tenant_chunks(filter).await?;

    let hits = raws
      .into_iter()
      .map(|raw| {
        let embedding = decode_embedding(&raw.embedding)?;
        let score = cosine_similarity(&query, &embedding);
        raw.into_hit(score)
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(top_k(hits, top))
  }

  async fn keyword_search(
    &self,
    filter: TenantFilter,
    query: String,
    top: usize,
  ) -> Result<Vec<ChunkHit>> {
    let raws = self.tenant_chunks(filter).await?;
    let texts: Vec<&str> = raws.iter().map(|r| r.content.as_str()).collect();
    let scores = bm25_scores(&query, &texts);

    let hits = raws
      .into_iter()
      .zip(scores)
      .filter(|(_, score)| *score > 0.0)
      .map(|(raw, score)| raw.into_hit(score))
      .collect::<Result<Vec<_>>>()?;

    Ok(top_k(hits, top))
  }
}
