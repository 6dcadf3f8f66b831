//! Router tests: webhooks, widget polling and admin auth against an
//! in-memory store with fake AI providers.

use std::{sync::Arc, time::Duration};

use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use async_trait::async_trait;
use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use clinic_channels::{HttpChannelSender, signature};
use clinic_core::{
  channel::{ChannelCredentials, ChannelType, NewChannelAccount},
  customer::CustomerIdentity,
  event::NoopEvents,
  knowledge::{NewChunk, NewDocument},
  language::LanguageCode,
  message::{MessageStatus, NewMessage, SenderType},
  provider::{Embedder, Generation, Generator, Prompt, ProviderResult, Translation, Translator},
  store::{ConversationRepository, CustomerRepository, KnowledgeRepository, MessageRepository, TenantRepository},
  tenant::{AiConfig, NewTenant, Tenant},
};
use clinic_pipeline::{
  Collaborators, InboundProcessor, PipelineConfig, fallback,
  rag::{ModelSelector, RagConfig},
};
use clinic_store_sqlite::SqliteStore;
use rand_core::OsRng;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::{AppState, LlmSettings, ServerConfig, TranslationSettings, auth::AuthConfig, router};

const ANSWER: &str = "라식 비용은 양안 200만원입니다.";
const WIDGET_SECRET: &str = "widget-secret";
const KAKAO_KEY: &str = "kakao-key";
const APP_SECRET: &str = "app-secret";

// ─── Fakes ───────────────────────────────────────────────────────────────────

struct EchoTranslator;

#[async_trait]
impl Translator for EchoTranslator {
  async fn translate(
    &self,
    text: &str,
    source: Option<LanguageCode>,
    _target: LanguageCode,
  ) -> ProviderResult<Translation> {
    Ok(Translation { text: text.to_owned(), detected_source: source })
  }
}

struct AxisEmbedder;

#[async_trait]
impl Embedder for AxisEmbedder {
  async fn embed(&self, _text: &str) -> ProviderResult<Vec<f32>> { Ok(vec![1.0, 0.0, 0.0]) }
}

struct FixedGenerator;

#[async_trait]
impl Generator for FixedGenerator {
  async fn generate(&self, _prompt: &Prompt, _model: &str) -> ProviderResult<Generation> {
    Ok(Generation { text: ANSWER.into(), tokens_used: 12 })
  }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

struct TestApp {
  router: Router,
  store:  Arc<SqliteStore>,
  tenant: Tenant,
}

impl TestApp {
  async fn call(&self, req: Request<Body>) -> Response {
    self.router.clone().oneshot(req).await.unwrap()
  }
}

fn credentials(secret: Option<&str>, api_key: Option<&str>, verify_token: Option<&str>) -> ChannelCredentials {
  ChannelCredentials {
    secret: secret.map(Into::into),
    api_key: api_key.map(Into::into),
    verify_token: verify_token.map(Into::into),
    ..ChannelCredentials::default()
  }
}

async fn test_app() -> TestApp {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let tenant = store
    .add_tenant(NewTenant {
      name:             "bright-eye".into(),
      specialty:        Some("ophthalmology".into()),
      default_language: LanguageCode::Ko,
      ai:               AiConfig::default(),
    })
    .await
    .unwrap();

  for (channel_type, external, creds) in [
    (ChannelType::Widget, "w-1", credentials(Some(WIDGET_SECRET), None, None)),
    (ChannelType::Kakao, "kbot-1", credentials(None, Some(KAKAO_KEY), None)),
    (ChannelType::Facebook, "page-1", credentials(Some(APP_SECRET), None, Some("verify-me"))),
    (ChannelType::Wechat, "gh_clinic", credentials(Some("wx-secret"), None, Some("wx-token"))),
  ] {
    store
      .add_channel_account(NewChannelAccount {
        tenant_id:           tenant.tenant_id,
        channel_type,
        external_account_id: external.into(),
        credentials:         creds,
      })
      .await
      .unwrap();
  }

  for name in ["LASIK pricing", "LASIK FAQ"] {
    store
      .add_document(
        NewDocument {
          tenant_id:   tenant.tenant_id,
          name:        name.into(),
          description: None,
          content:     "라식 비용 양안 200만원".into(),
        },
        vec![NewChunk { content: "라식 비용 양안 200만원".into(), embedding: vec![1.0, 0.0, 0.0] }],
      )
      .await
      .unwrap();
  }

  let processor = InboundProcessor::new(
    store.clone(),
    Collaborators {
      translator:    Arc::new(EchoTranslator),
      embedder:      Arc::new(AxisEmbedder),
      generator:     Arc::new(FixedGenerator),
      locks:         store.clone(),
      cache:         Some(store.clone()),
      sender:        Arc::new(HttpChannelSender::new(Duration::from_secs(2)).unwrap()),
      events:        Arc::new(NoopEvents),
      notifications: None,
    },
    PipelineConfig {
      rag: RagConfig { models: ModelSelector::new("light", "heavy"), ..RagConfig::default() },
      ..PipelineConfig::default()
    },
  );

  let salt = SaltString::generate(&mut OsRng);
  let hash = Argon2::default()
    .hash_password(b"secret", &salt)
    .unwrap()
    .to_string();

  let config = ServerConfig {
    host:                  "127.0.0.1".into(),
    port:                  8080,
    store_path:            ":memory:".into(),
    admin_username:        "admin".into(),
    admin_password_hash:   hash.clone(),
    lock_ttl_secs:         300,
    tenant_cache_ttl_secs: 60,
    provider_timeout_secs: 5,
    translation:           TranslationSettings {
      endpoint: "http://127.0.0.1:9/translate".into(),
      api_key:  "unused".into(),
    },
    llm:                   LlmSettings {
      endpoint:        "http://127.0.0.1:9/v1".into(),
      api_key:         "unused".into(),
      default_model:   "light".into(),
      advanced_model:  "heavy".into(),
      embedding_model: "embed".into(),
    },
    notify_webhook_url:    None,
  };

  let state = AppState {
    store:     store.clone(),
    processor: Arc::new(processor),
    config:    Arc::new(config),
    auth:      Arc::new(AuthConfig { username: "admin".into(), password_hash: hash }),
  };

  TestApp { router: router(state), store, tenant }
}

fn post(uri: &str, header_name: &str, header_value: &str, body: impl Into<String>) -> Request<Body> {
  Request::builder()
    .method("POST")
    .uri(uri)
    .header(header_name, header_value)
    .body(Body::from(body.into()))
    .unwrap()
}

fn get(uri: &str) -> Request<Body> {
  Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn text(res: Response) -> String {
  let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
  String::from_utf8(bytes.to_vec()).unwrap()
}

async fn json_body(res: Response) -> Value { serde_json::from_str(&text(res).await).unwrap() }

fn widget_body(text: &str, message_id: &str) -> String {
  json!({
    "widgetId": "w-1",
    "visitorId": "v-1",
    "text": text,
    "messageId": message_id,
  })
  .to_string()
}

fn kakao_body(callback: Option<&str>) -> String {
  let mut body = json!({
    "userRequest": {
      "utterance": "라식 비용이 얼마인가요?",
      "user": { "id": "kuser-1", "properties": {} }
    },
    "bot": { "id": "kbot-1" }
  });
  if let Some(url) = callback {
    body["userRequest"]["callbackUrl"] = json!(url);
  }
  body.to_string()
}

// ─── Widget ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn widget_message_is_answered_and_polled() {
  let app = test_app().await;
  let body = widget_body("라식 비용이 얼마인가요?", "c-1");
  let signature = signature::sign_hex(body.as_bytes(), WIDGET_SECRET);

  let res = app.call(post("/webhooks/widget/w-1", "x-widget-signature", &signature, body)).await;
  assert_eq!(res.status(), StatusCode::OK);
  let json = json_body(res).await;
  assert_eq!(json["outcomes"][0]["outcome"], "answered");

  let res = app.call(get("/widget/w-1/messages?visitor=v-1")).await;
  assert_eq!(res.status(), StatusCode::OK);
  let polled = json_body(res).await;
  let polled = polled.as_array().unwrap();
  assert_eq!(polled.len(), 1);
  assert_eq!(polled[0]["sender_type"], "ai");
  assert!(polled[0]["content"].as_str().unwrap().contains("200만원"));

  let id: Uuid = polled[0]["message_id"].as_str().unwrap().parse().unwrap();
  let stored = app.store.get_message(id).await.unwrap().unwrap();
  assert_eq!(stored.status, MessageStatus::Delivered);
}

#[tokio::test]
async fn widget_redelivery_is_a_duplicate() {
  let app = test_app().await;
  let body = widget_body("라식 비용이 얼마인가요?", "c-1");
  let signature = signature::sign_hex(body.as_bytes(), WIDGET_SECRET);

  let first = app
    .call(post("/webhooks/widget/w-1", "x-widget-signature", &signature, body.clone()))
    .await;
  assert_eq!(json_body(first).await["outcomes"][0]["outcome"], "answered");

  let second = app.call(post("/webhooks/widget/w-1", "x-widget-signature", &signature, body)).await;
  assert_eq!(json_body(second).await["outcomes"][0]["outcome"], "duplicate");

  let polled = json_body(app.call(get("/widget/w-1/messages?visitor=v-1")).await).await;
  assert_eq!(polled.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn widget_bad_signature_is_rejected() {
  let app = test_app().await;
  let body = widget_body("안녕하세요", "c-1");

  let res = app.call(post("/webhooks/widget/w-1", "x-widget-signature", "00ff", body)).await;
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

  let polled = json_body(app.call(get("/widget/w-1/messages?visitor=v-1")).await).await;
  assert!(polled.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn webhook_for_unknown_account_is_acknowledged() {
  let app = test_app().await;
  let res = app.call(post("/webhooks/widget/w-404", "x-widget-signature", "00", "{}")).await;
  assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn polling_unknown_widget_is_not_found() {
  let app = test_app().await;
  let res = app.call(get("/widget/w-404/messages?visitor=v-1")).await;
  assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_channel_is_not_found() {
  let app = test_app().await;
  let res = app.call(post("/webhooks/telegram/bot-1", "x-signature", "x", "{}")).await;
  assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

// ─── Kakao ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn kakao_reply_rides_on_the_response() {
  let app = test_app().await;
  let res = app.call(post("/webhooks/kakao/kbot-1", "x-api-key", KAKAO_KEY, kakao_body(None))).await;
  assert_eq!(res.status(), StatusCode::OK);

  let json = json_body(res).await;
  assert_eq!(json["version"], "2.0");
  let reply = json["template"]["outputs"][0]["simpleText"]["text"].as_str().unwrap();
  assert!(reply.contains("200만원"), "reply: {reply}");
}

#[tokio::test]
async fn kakao_repeated_utterance_is_answered_each_time() {
  let app = test_app().await;
  for _ in 0..2 {
    let res = app
      .call(post("/webhooks/kakao/kbot-1", "x-api-key", KAKAO_KEY, kakao_body(None)))
      .await;
    let json = json_body(res).await;
    let reply = json["template"]["outputs"][0]["simpleText"]["text"].as_str().unwrap();
    assert!(reply.contains("200만원"), "reply: {reply}");
  }
}

#[tokio::test]
async fn kakao_bad_key_still_gets_a_skill_response() {
  let app = test_app().await;
  let res = app.call(post("/webhooks/kakao/kbot-1", "x-api-key", "wrong", kakao_body(None))).await;
  assert_eq!(res.status(), StatusCode::OK);

  let json = json_body(res).await;
  assert_eq!(json["version"], "2.0");
  assert_eq!(
    json["template"]["outputs"][0]["simpleText"]["text"],
    fallback::apology_text(Some(LanguageCode::Ko))
  );
}

#[tokio::test]
async fn kakao_callback_is_acknowledged_at_once() {
  let app = test_app().await;
  let body = kakao_body(Some("http://127.0.0.1:9/callback"));
  let res = app.call(post("/webhooks/kakao/kbot-1", "x-api-key", KAKAO_KEY, body)).await;
  assert_eq!(res.status(), StatusCode::OK);

  let json = json_body(res).await;
  assert_eq!(json["useCallback"], true);
  assert_eq!(json["data"]["text"], fallback::waiting_text(Some(LanguageCode::Ko)));
}

// ─── WeChat ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn wechat_always_answers_success() {
  let app = test_app().await;
  let xml = "<xml><ToUserName>gh_clinic</ToUserName></xml>";

  let res = app.call(post("/webhooks/wechat/gh_clinic", "x-wechat-signature", "bad", xml)).await;
  assert_eq!(res.status(), StatusCode::OK);
  assert_eq!(text(res).await, "success");

  let res = app.call(post("/webhooks/wechat/gh_unknown", "x-wechat-signature", "bad", xml)).await;
  assert_eq!(text(res).await, "success");
}

#[tokio::test]
async fn wechat_url_verification_echoes() {
  let app = test_app().await;
  let sig = signature::sorted_sha1_hex(&["wx-token", "1700000000", "n1"]);

  let uri = format!(
    "/webhooks/wechat/gh_clinic?signature={sig}&timestamp=1700000000&nonce=n1&echostr=hello"
  );
  let res = app.call(get(&uri)).await;
  assert_eq!(res.status(), StatusCode::OK);
  assert_eq!(text(res).await, "hello");

  let uri = "/webhooks/wechat/gh_clinic?signature=bad&timestamp=1700000000&nonce=n1&echostr=hello";
  assert_eq!(app.call(get(uri)).await.status(), StatusCode::FORBIDDEN);
}

// ─── Meta ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn meta_subscription_handshake() {
  let app = test_app().await;

  let ok = "/webhooks/facebook/page-1?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=1234";
  let res = app.call(get(ok)).await;
  assert_eq!(res.status(), StatusCode::OK);
  assert_eq!(text(res).await, "1234");

  let bad = "/webhooks/facebook/page-1?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1234";
  assert_eq!(app.call(get(bad)).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn meta_delivery_receipt_marks_message_delivered() {
  let app = test_app().await;
  let account = app
    .store
    .find_channel_account(ChannelType::Facebook, "page-1".into())
    .await
    .unwrap()
    .unwrap();
  let customer = app
    .store
    .create_with_channel(CustomerIdentity {
      tenant_id:          app.tenant.tenant_id,
      channel_account_id: account.channel_account_id,
      channel_user_id:    "psid-1".into(),
      channel_username:   None,
      name:               None,
      profile_image_url:  None,
      language:           None,
    })
    .await
    .unwrap()
    .into_inner()
    .0;
  let conversation = app
    .store
    .create_conversation(customer.customer_id, app.tenant.tenant_id)
    .await
    .unwrap()
    .into_inner();
  let sent = app
    .store
    .insert_message(NewMessage {
      status: MessageStatus::Sent,
      external_id: Some("mid.out.1".into()),
      ..NewMessage::outbound(conversation.conversation_id, SenderType::Ai, "안내드립니다.")
    })
    .await
    .unwrap()
    .into_inner();

  let body = json!({
    "object": "page",
    "entry": [{
      "id": "page-1",
      "messaging": [{
        "sender": { "id": "psid-1" },
        "recipient": { "id": "page-1" },
        "delivery": { "mids": ["mid.out.1"], "watermark": 1710000000000i64 }
      }]
    }]
  })
  .to_string();
  let signature = format!("sha256={}", signature::sign_hex(body.as_bytes(), APP_SECRET));

  let res = app
    .call(post("/webhooks/facebook/page-1", "x-hub-signature-256", &signature, body))
    .await;
  assert_eq!(res.status(), StatusCode::OK);

  let stored = app.store.get_message(sent.message_id).await.unwrap().unwrap();
  assert_eq!(stored.status, MessageStatus::Delivered);
}

// ─── Admin API ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn admin_api_requires_basic_auth() {
  let app = test_app().await;

  let res = app.call(get("/api/escalations")).await;
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
  assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));

  let credentials = B64.encode("admin:secret");
  let req = Request::builder()
    .uri("/api/escalations")
    .header(header::AUTHORIZATION, format!("Basic {credentials}"))
    .body(Body::empty())
    .unwrap();
  let res = app.call(req).await;
  assert_eq!(res.status(), StatusCode::OK);
  assert_eq!(json_body(res).await, json!([]));
}
