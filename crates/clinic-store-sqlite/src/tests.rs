//! Integration tests for `SqliteStore` against an in-memory database.

use std::time::Duration;

use clinic_core::{
  channel::{ChannelAccount, ChannelCredentials, ChannelType, NewChannelAccount},
  conversation::ConversationStatus,
  customer::CustomerIdentity,
  escalation::{EscalationPriority, EscalationStatus, NewEscalation},
  knowledge::{NewChunk, NewDocument, TenantFilter},
  language::LanguageCode,
  message::{Direction, MessageStatus, NewMessage, SenderType},
  provider::{CacheStore, LockStore},
  store::{
    ConversationRepository, CustomerRepository, EscalationRepository, KnowledgeRepository,
    MessageRepository, TenantRepository,
  },
  tenant::{AiConfig, NewTenant, Tenant},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn tenant(s: &SqliteStore, name: &str) -> Tenant {
  s.add_tenant(NewTenant {
    name:             name.into(),
    specialty:        Some("ophthalmology".into()),
    default_language: LanguageCode::Ko,
    ai:               AiConfig::default(),
  })
  .await
  .unwrap()
}

async fn account(s: &SqliteStore, tenant: &Tenant, external: &str) -> ChannelAccount {
  s.add_channel_account(NewChannelAccount {
    tenant_id:           tenant.tenant_id,
    channel_type:        ChannelType::Line,
    external_account_id: external.into(),
    credentials:         ChannelCredentials {
      secret: Some("line-secret".into()),
      ..Default::default()
    },
  })
  .await
  .unwrap()
}

fn identity(account: &ChannelAccount, user: &str, name: Option<&str>) -> CustomerIdentity {
  CustomerIdentity {
    tenant_id:          account.tenant_id,
    channel_account_id: account.channel_account_id,
    channel_user_id:    user.into(),
    channel_username:   None,
    name:               name.map(Into::into),
    profile_image_url:  None,
    language:           Some(LanguageCode::Ja),
  }
}

// ─── Tenants & accounts ──────────────────────────────────────────────────────

#[tokio::test]
async fn tenant_config_roundtrips() {
  let s = store().await;
  let t = tenant(&s, "Bright Eye").await;

  let fetched = s.get_tenant(t.tenant_id).await.unwrap().unwrap();
  assert_eq!(fetched.name, "Bright Eye");
  assert_eq!(fetched.default_language, LanguageCode::Ko);
  assert!(fetched.ai.enabled);
  assert!(s.get_tenant(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn channel_account_found_by_provider_id() {
  let s = store().await;
  let t = tenant(&s, "Bright Eye").await;
  let acc = account(&s, &t, "U-bot-1").await;

  let found = s
    .find_channel_account(ChannelType::Line, "U-bot-1".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.channel_account_id, acc.channel_account_id);
  assert_eq!(found.credentials.secret.as_deref(), Some("line-secret"));

  let other_type = s
    .find_channel_account(ChannelType::Kakao, "U-bot-1".into())
    .await
    .unwrap();
  assert!(other_type.is_none());
}

// ─── Customers ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn identity_resolves_to_single_customer() {
  let s = store().await;
  let t = tenant(&s, "Bright Eye").await;
  let acc = account(&s, &t, "U-bot-1").await;

  let first = s.create_with_channel(identity(&acc, "U1", Some("Tanaka"))).await.unwrap();
  assert!(first.is_created());

  let second = s.create_with_channel(identity(&acc, "U1", None)).await.unwrap();
  assert!(!second.is_created());
  assert_eq!(second.get().0.customer_id, first.get().0.customer_id);

  let (found, channel) = s
    .find_by_channel_identity(acc.channel_account_id, "U1".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.customer_id, first.get().0.customer_id);
  assert_eq!(channel.channel_user_id, "U1");
  assert_eq!(found.language, Some(LanguageCode::Ja));
}

#[tokio::test]
async fn concurrent_identity_creation_yields_one_customer() {
  let s = store().await;
  let t = tenant(&s, "Bright Eye").await;
  let acc = account(&s, &t, "U-bot-1").await;

  let (a, b) = tokio::join!(
    s.create_with_channel(identity(&acc, "U1", None)),
    s.create_with_channel(identity(&acc, "U1", None)),
  );
  let (a, b) = (a.unwrap(), b.unwrap());
  assert_eq!(a.get().0.customer_id, b.get().0.customer_id);
  assert!(a.is_created() ^ b.is_created());
}

#[tokio::test]
async fn fill_profile_never_overwrites() {
  let s = store().await;
  let t = tenant(&s, "Bright Eye").await;
  let acc = account(&s, &t, "U-bot-1").await;
  let mut ident = identity(&acc, "U1", None);
  ident.language = None;
  let (c, _) = s.create_with_channel(ident).await.unwrap().into_inner();

  let filled = s
    .fill_customer_profile(c.customer_id, Some("Mai".into()), Some(LanguageCode::Vi))
    .await
    .unwrap();
  assert_eq!(filled.display_name.as_deref(), Some("Mai"));
  assert_eq!(filled.language, Some(LanguageCode::Vi));

  let again = s
    .fill_customer_profile(c.customer_id, Some("Other".into()), Some(LanguageCode::En))
    .await
    .unwrap();
  assert_eq!(again.display_name.as_deref(), Some("Mai"));
  assert_eq!(again.language, Some(LanguageCode::Vi));
}

#[tokio::test]
async fn duplicates_match_name_within_tenant() {
  let s = store().await;
  let t = tenant(&s, "Bright Eye").await;
  let other = tenant(&s, "Other Clinic").await;
  let acc = account(&s, &t, "U-bot-1").await;
  let other_acc = account(&s, &other, "U-bot-2").await;

  let (a, _) = s
    .create_with_channel(identity(&acc, "U1", Some("Tanaka")))
    .await
    .unwrap()
    .into_inner();
  let (b, _) = s
    .create_with_channel(identity(&acc, "U2", Some("tanaka")))
    .await
    .unwrap()
    .into_inner();
  s.create_with_channel(identity(&acc, "U3", Some("Suzuki"))).await.unwrap();
  s.create_with_channel(identity(&other_acc, "U1", Some("Tanaka"))).await.unwrap();

  let dups = s.find_duplicates(a.customer_id).await.unwrap();
  assert_eq!(dups.len(), 1);
  assert_eq!(dups[0].customer_id, b.customer_id);
}

#[tokio::test]
async fn merge_moves_channels_and_resolves_clashing_thread() {
  let s = store().await;
  let t = tenant(&s, "Bright Eye").await;
  let acc = account(&s, &t, "U-bot-1").await;

  let (primary, _) = s
    .create_with_channel(identity(&acc, "U1", Some("Tanaka")))
    .await
    .unwrap()
    .into_inner();
  let (secondary, _) = s
    .create_with_channel(identity(&acc, "U2", None))
    .await
    .unwrap()
    .into_inner();

  let keep = s
    .create_conversation(primary.customer_id, t.tenant_id)
    .await
    .unwrap()
    .into_inner();
  let clash = s
    .create_conversation(secondary.customer_id, t.tenant_id)
    .await
    .unwrap()
    .into_inner();
  s.insert_message(NewMessage::inbound(clash.conversation_id, "hello"))
    .await
    .unwrap();

  let report = s
    .merge_customers(primary.customer_id, secondary.customer_id)
    .await
    .unwrap();
  assert_eq!(report.channels_moved, 1);
  assert_eq!(report.conversations_moved, 1);
  assert_eq!(report.conversations_resolved, 1);

  assert!(s.get_customer(secondary.customer_id).await.unwrap().is_none());
  let channels = s.list_customer_channels(primary.customer_id).await.unwrap();
  assert_eq!(channels.len(), 2);

  let moved = s.get_conversation(clash.conversation_id).await.unwrap().unwrap();
  assert_eq!(moved.customer_id, primary.customer_id);
  assert_eq!(moved.status, ConversationStatus::Resolved);

  let open = s
    .find_open_conversation(primary.customer_id, t.tenant_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(open.conversation_id, keep.conversation_id);

  // Messages follow their conversation.
  let msgs = s.messages_after(clash.conversation_id, None).await.unwrap();
  assert_eq!(msgs.len(), 1);
}

#[tokio::test]
async fn merge_rejects_self_and_cross_tenant() {
  let s = store().await;
  let t = tenant(&s, "Bright Eye").await;
  let other = tenant(&s, "Other Clinic").await;
  let acc = account(&s, &t, "U-bot-1").await;
  let other_acc = account(&s, &other, "U-bot-2").await;

  let (a, _) = s.create_with_channel(identity(&acc, "U1", None)).await.unwrap().into_inner();
  let (b, _) = s
    .create_with_channel(identity(&other_acc, "U1", None))
    .await
    .unwrap()
    .into_inner();

  assert!(matches!(
    s.merge_customers(a.customer_id, a.customer_id).await,
    Err(Error::SelfMerge(_))
  ));
  assert!(matches!(
    s.merge_customers(a.customer_id, b.customer_id).await,
    Err(Error::CrossTenantMerge(..))
  ));
}

// ─── Conversations ───────────────────────────────────────────────────────────

#[tokio::test]
async fn one_open_conversation_per_customer_and_tenant() {
  let s = store().await;
  let t = tenant(&s, "Bright Eye").await;
  let acc = account(&s, &t, "U-bot-1").await;
  let (c, _) = s.create_with_channel(identity(&acc, "U1", None)).await.unwrap().into_inner();

  let first = s.create_conversation(c.customer_id, t.tenant_id).await.unwrap();
  let second = s.create_conversation(c.customer_id, t.tenant_id).await.unwrap();
  assert!(first.is_created());
  assert!(!second.is_created());
  assert_eq!(first.get().conversation_id, second.get().conversation_id);

  // Once resolved, a fresh thread may start.
  s.set_conversation_status(first.get().conversation_id, ConversationStatus::Resolved)
    .await
    .unwrap();
  let third = s.create_conversation(c.customer_id, t.tenant_id).await.unwrap();
  assert!(third.is_created());
  assert_ne!(third.get().conversation_id, first.get().conversation_id);
}

#[tokio::test]
async fn set_status_on_missing_conversation_is_not_found() {
  let s = store().await;
  let result = s
    .set_conversation_status(Uuid::new_v4(), ConversationStatus::Waiting)
    .await;
  assert!(matches!(result, Err(Error::NotFound { .. })));
}

// ─── Messages ────────────────────────────────────────────────────────────────

async fn conversation_id(s: &SqliteStore) -> Uuid {
  let t = tenant(s, "Bright Eye").await;
  let acc = account(s, &t, "U-bot-1").await;
  let (c, _) = s.create_with_channel(identity(&acc, "U1", None)).await.unwrap().into_inner();
  s.create_conversation(c.customer_id, t.tenant_id)
    .await
    .unwrap()
    .into_inner()
    .conversation_id
}

#[tokio::test]
async fn external_id_deduplicates_inbound() {
  let s = store().await;
  let conv = conversation_id(&s).await;

  let mut msg = NewMessage::inbound(conv, "hello");
  msg.external_id = Some("m-1".into());

  let first = s.insert_message(msg.clone()).await.unwrap();
  let second = s.insert_message(msg).await.unwrap();
  assert!(first.is_created());
  assert!(!second.is_created());
  assert_eq!(first.get().message_id, second.get().message_id);

  let all = s.messages_after(conv, None).await.unwrap();
  assert_eq!(all.len(), 1);

  let by_ext = s
    .find_by_external_id(Direction::Inbound, "m-1".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(by_ext.message_id, first.get().message_id);
}

#[tokio::test]
async fn messages_without_external_id_never_collide() {
  let s = store().await;
  let conv = conversation_id(&s).await;

  s.insert_message(NewMessage::outbound(conv, SenderType::Ai, "a")).await.unwrap();
  s.insert_message(NewMessage::outbound(conv, SenderType::Ai, "a")).await.unwrap();
  assert_eq!(s.messages_after(conv, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn status_moves_forward_only() {
  let s = store().await;
  let conv = conversation_id(&s).await;
  let msg = s
    .insert_message(NewMessage::outbound(conv, SenderType::Ai, "answer"))
    .await
    .unwrap()
    .into_inner();

  let m = s
    .update_message_status(msg.message_id, MessageStatus::Processing, None)
    .await
    .unwrap();
  assert_eq!(m.status, MessageStatus::Processing);

  let m = s
    .update_message_status(msg.message_id, MessageStatus::Sent, Some("out-1".into()))
    .await
    .unwrap();
  assert_eq!(m.status, MessageStatus::Sent);
  assert_eq!(m.external_id.as_deref(), Some("out-1"));

  // Idempotent re-application.
  let m = s
    .update_message_status(msg.message_id, MessageStatus::Sent, None)
    .await
    .unwrap();
  assert_eq!(m.status, MessageStatus::Sent);

  let back = s
    .update_message_status(msg.message_id, MessageStatus::Pending, None)
    .await;
  assert!(matches!(back, Err(Error::Core(_))));

  let m = s
    .update_message_status(msg.message_id, MessageStatus::Delivered, None)
    .await
    .unwrap();
  assert_eq!(m.status, MessageStatus::Delivered);
}

#[tokio::test]
async fn recent_and_after_ordering() {
  let s = store().await;
  let conv = conversation_id(&s).await;

  let first = s
    .insert_message(NewMessage::inbound(conv, "one"))
    .await
    .unwrap()
    .into_inner();
  tokio::time::sleep(Duration::from_millis(2)).await;
  s.insert_message(NewMessage::outbound(conv, SenderType::Ai, "two")).await.unwrap();
  tokio::time::sleep(Duration::from_millis(2)).await;
  s.insert_message(NewMessage::inbound(conv, "three")).await.unwrap();

  let recent = s.recent_messages(conv, 2).await.unwrap();
  assert_eq!(recent.len(), 2);
  assert_eq!(recent[0].content, "three");
  assert_eq!(recent[1].content, "two");

  let after = s.messages_after(conv, Some(first.created_at)).await.unwrap();
  let contents: Vec<_> = after.iter().map(|m| m.content.as_str()).collect();
  assert!(!contents.contains(&"one"));
  assert!(contents.contains(&"three"));
}

#[tokio::test]
async fn translation_is_recorded() {
  let s = store().await;
  let conv = conversation_id(&s).await;
  let msg = s
    .insert_message(NewMessage::inbound(conv, "こんにちは"))
    .await
    .unwrap()
    .into_inner();

  let m = s
    .update_translation(msg.message_id, "안녕하세요".into(), LanguageCode::Ko)
    .await
    .unwrap();
  assert_eq!(m.translated_content.as_deref(), Some("안녕하세요"));
  assert_eq!(m.translated_language, Some(LanguageCode::Ko));
}

// ─── Escalations ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_escalation_per_message() {
  let s = store().await;
  let conv = conversation_id(&s).await;
  let msg = s
    .insert_message(NewMessage::inbound(conv, "환불 요청합니다"))
    .await
    .unwrap()
    .into_inner();

  let input = NewEscalation {
    conversation_id: conv,
    message_id:      Some(msg.message_id),
    reason:          "keyword: 환불".into(),
    ai_confidence:   None,
    priority:        EscalationPriority::High,
  };
  let first = s.insert_escalation(input.clone()).await.unwrap();
  let second = s.insert_escalation(input).await.unwrap();
  assert!(first.is_created());
  assert!(!second.is_created());
  assert_eq!(first.get().escalation_id, second.get().escalation_id);

  let pending = s.list_escalations(Some(EscalationStatus::Pending)).await.unwrap();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].priority, EscalationPriority::High);
  assert!(s.list_escalations(Some(EscalationStatus::Resolved)).await.unwrap().is_empty());
}

// ─── Knowledge ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_is_tenant_scoped() {
  let s = store().await;
  let a = tenant(&s, "Clinic A").await;
  let b = tenant(&s, "Clinic B").await;

  s.add_document(
    NewDocument {
      tenant_id:   a.tenant_id,
      name:        "LASIK FAQ".into(),
      description: None,
      content:     "LASIK recovery takes about one week.".into(),
    },
    vec![NewChunk {
      content:   "LASIK recovery takes about one week.".into(),
      embedding: vec![1.0, 0.0, 0.0],
    }],
  )
  .await
  .unwrap();
  s.add_document(
    NewDocument {
      tenant_id:   b.tenant_id,
      name:        "Other FAQ".into(),
      description: Some("private".into()),
      content:     "LASIK pricing is private to clinic B.".into(),
    },
    vec![NewChunk {
      content:   "LASIK pricing is private to clinic B.".into(),
      embedding: vec![1.0, 0.0, 0.0],
    }],
  )
  .await
  .unwrap();

  let hits = s
    .vector_search(TenantFilter::new(a.tenant_id), vec![1.0, 0.0, 0.0], 5)
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].document_name, "LASIK FAQ");
  assert!((hits[0].score - 1.0).abs() < 1e-5);

  let kw = s
    .keyword_search(TenantFilter::new(a.tenant_id), "LASIK recovery".into(), 5)
    .await
    .unwrap();
  assert_eq!(kw.len(), 1);
  assert!(kw[0].content.contains("recovery"));

  let none = s
    .keyword_search(TenantFilter::new(a.tenant_id), "pricing".into(), 5)
    .await
    .unwrap();
  assert!(none.is_empty());
}

// ─── Locks & cache ───────────────────────────────────────────────────────────

#[tokio::test]
async fn lock_is_exclusive_until_released() {
  let s = store().await;
  let ttl = Duration::from_secs(300);

  assert!(s.set_if_not_exists("k", "t1", ttl).await.unwrap());
  assert!(!s.set_if_not_exists("k", "t2", ttl).await.unwrap());

  // Only the holder's token releases it.
  assert!(!s.compare_and_delete("k", "t2").await.unwrap());
  assert!(s.compare_and_delete("k", "t1").await.unwrap());
  assert!(s.set_if_not_exists("k", "t2", ttl).await.unwrap());
}

#[tokio::test]
async fn expired_lock_can_be_taken_over() {
  let s = store().await;

  assert!(s.set_if_not_exists("k", "t1", Duration::ZERO).await.unwrap());
  assert!(s.set_if_not_exists("k", "t2", Duration::from_secs(60)).await.unwrap());
  assert!(!s.compare_and_delete("k", "t1").await.unwrap());
}

#[tokio::test]
async fn cache_respects_ttl() {
  let s = store().await;

  s.set("a", "1", Duration::from_secs(60)).await.unwrap();
  s.set("b", "2", Duration::ZERO).await.unwrap();
  assert_eq!(s.get("a").await.unwrap().as_deref(), Some("1"));
  assert_eq!(s.get("b").await.unwrap(), None);
  assert_eq!(s.get("missing").await.unwrap(), None);
}
