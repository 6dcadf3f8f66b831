//! Language detection and cached translation.

use std::{sync::Arc, time::Duration};

use clinic_core::{
  language::LanguageCode,
  provider::{CacheStore, Translation, Translator},
};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{Error, Result};

/// How long a translation stays cached.
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ─── Detection ───────────────────────────────────────────────────────────────

fn is_hangul(c: char) -> bool {
  matches!(c, '\u{AC00}'..='\u{D7AF}' | '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}')
}

fn is_kana(c: char) -> bool { matches!(c, '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}') }

fn is_han(c: char) -> bool { matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}') }

fn is_thai(c: char) -> bool { matches!(c, '\u{0E00}'..='\u{0E7F}') }

fn is_arabic(c: char) -> bool { matches!(c, '\u{0600}'..='\u{06FF}') }

fn is_cyrillic(c: char) -> bool { matches!(c, '\u{0400}'..='\u{04FF}') }

/// Script-based detection. Scripts are tested in a fixed order and the first
/// script present anywhere in the text wins, so mixed Korean/Latin text is
/// Korean and Japanese text containing kanji is Japanese. Latin, numeric and
/// empty input default to English.
pub fn detect_language(text: &str) -> LanguageCode {
  const ORDER: [(fn(char) -> bool, LanguageCode); 6] = [
    (is_hangul, LanguageCode::Ko),
    (is_kana, LanguageCode::Ja),
    (is_han, LanguageCode::Zh),
    (is_thai, LanguageCode::Th),
    (is_arabic, LanguageCode::Ar),
    (is_cyrillic, LanguageCode::Ru),
  ];

  ORDER
    .iter()
    .find(|(test, _)| text.chars().any(test))
    .map(|(_, lang)| *lang)
    .unwrap_or(LanguageCode::En)
}

// ─── Service ─────────────────────────────────────────────────────────────────

/// The two fixed customer-service flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsDirection {
  /// Working language → customer's language.
  ToCustomer,
  /// Customer's language → working language.
  ToAgent,
}

pub struct TranslationService {
  translator: Arc<dyn Translator>,
  cache:      Option<Arc<dyn CacheStore>>,
  timeout:    Duration,
}

fn cache_key(text: &str, source: Option<LanguageCode>, target: LanguageCode) -> String {
  let mut hasher = Sha256::new();
  hasher.update(text.as_bytes());
  hasher.update(b"|");
  hasher.update(source.map(LanguageCode::code).unwrap_or("auto").as_bytes());
  hasher.update(b"|");
  hasher.update(target.code().as_bytes());
  format!("translation:{}", hex::encode(hasher.finalize()))
}

impl TranslationService {
  pub fn new(
    translator: Arc<dyn Translator>,
    cache: Option<Arc<dyn CacheStore>>,
    timeout: Duration,
  ) -> Self {
    Self { translator, cache, timeout }
  }

  /// Translate `text`, consulting the cache first. Cache failures are logged
  /// and bypassed.
  pub async fn translate(
    &self,
    text: &str,
    source: Option<LanguageCode>,
    target: LanguageCode,
  ) -> Result<Translation> {
    if text.trim().is_empty() || source == Some(target) {
      return Ok(Translation { text: text.to_owned(), detected_source: source });
    }

    let key = cache_key(text, source, target);
    if let Some(cached) = self.cache_get(&key).await {
      debug!(%target, "translation cache hit");
      return Ok(cached);
    }

    let translation = tokio::time::timeout(
      self.timeout,
      self.translator.translate(text, source, target),
    )
    .await
    .map_err(|_| Error::Timeout("translation"))?
    .map_err(Error::provider("translation"))?;

    self.cache_set(&key, &translation).await;
    Ok(translation)
  }

  /// Translate along one of the two fixed flows between a customer speaking
  /// `customer_language` and a clinic working in `working_language`.
  pub async fn translate_for_cs(
    &self,
    text: &str,
    direction: CsDirection,
    customer_language: LanguageCode,
    working_language: LanguageCode,
  ) -> Result<Translation> {
    match direction {
      CsDirection::ToCustomer => {
        self
          .translate(text, Some(working_language), customer_language)
          .await
      }
      CsDirection::ToAgent => {
        self
          .translate(text, Some(customer_language), working_language)
          .await
      }
    }
  }

  async fn cache_get(&self, key: &str) -> Option<Translation> {
    let cache = self.cache.as_ref()?;
    match cache.get(key).await {
      Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
      Ok(None) => None,
      Err(e) => {
        warn!(error = %e, "translation cache unavailable, translating directly");
        None
      }
    }
  }

  async fn cache_set(&self, key: &str, translation: &Translation) {
    let Some(cache) = &self.cache else {
      return;
    };
    let Ok(raw) = serde_json::to_string(translation) else {
      return;
    };
    if let Err(e) = cache.set(key, &raw, CACHE_TTL).await {
      warn!(error = %e, "failed to cache translation");
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use async_trait::async_trait;
  use clinic_core::provider::ProviderResult;

  use super::*;

  #[test]
  fn detection_order_is_pinned() {
    assert_eq!(detect_language("안녕 Hello"), LanguageCode::Ko);
    assert_eq!(detect_language("こんにちは"), LanguageCode::Ja);
    assert_eq!(detect_language("123"), LanguageCode::En);
    assert_eq!(detect_language(""), LanguageCode::En);
    // Kana before Han: Japanese with kanji stays Japanese.
    assert_eq!(detect_language("二重整形の費用は？"), LanguageCode::Ja);
    assert_eq!(detect_language("双眼皮手术多少钱"), LanguageCode::Zh);
    assert_eq!(detect_language("สวัสดีครับ"), LanguageCode::Th);
    assert_eq!(detect_language("مرحبا"), LanguageCode::Ar);
    assert_eq!(detect_language("Здравствуйте"), LanguageCode::Ru);
    assert_eq!(detect_language("Xin chào"), LanguageCode::En);
    // Hangul wins over every later script.
    assert_eq!(detect_language("Привет 안녕"), LanguageCode::Ko);
  }

  struct CountingTranslator(AtomicUsize);

  #[async_trait]
  impl Translator for CountingTranslator {
    async fn translate(
      &self,
      text: &str,
      source: Option<LanguageCode>,
      target: LanguageCode,
    ) -> ProviderResult<Translation> {
      self.0.fetch_add(1, Ordering::SeqCst);
      Ok(Translation { text: format!("{target}:{text}"), detected_source: source })
    }
  }

  struct BrokenCache;

  #[async_trait]
  impl CacheStore for BrokenCache {
    async fn get(&self, _key: &str) -> ProviderResult<Option<String>> {
      Err("cache down".into())
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> ProviderResult<()> {
      Err("cache down".into())
    }
  }

  #[derive(Default)]
  struct MapCache(std::sync::Mutex<std::collections::HashMap<String, String>>);

  #[async_trait]
  impl CacheStore for MapCache {
    async fn get(&self, key: &str) -> ProviderResult<Option<String>> {
      Ok(self.0.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, _ttl: Duration) -> ProviderResult<()> {
      self.0.lock().unwrap().insert(key.to_owned(), value.to_owned());
      Ok(())
    }
  }

  fn service(
    translator: Arc<CountingTranslator>,
    cache: Option<Arc<dyn CacheStore>>,
  ) -> TranslationService {
    TranslationService::new(translator, cache, Duration::from_secs(5))
  }

  #[tokio::test]
  async fn cache_avoids_second_provider_call() {
    let translator = Arc::new(CountingTranslator(AtomicUsize::new(0)));
    let svc = service(translator.clone(), Some(Arc::new(MapCache::default())));

    let a = svc.translate("hello", Some(LanguageCode::En), LanguageCode::Ko).await.unwrap();
    let b = svc.translate("hello", Some(LanguageCode::En), LanguageCode::Ko).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(translator.0.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn broken_cache_fails_open() {
    let translator = Arc::new(CountingTranslator(AtomicUsize::new(0)));
    let svc = service(translator.clone(), Some(Arc::new(BrokenCache)));

    let t = svc.translate("hello", None, LanguageCode::Ko).await.unwrap();
    assert_eq!(t.text, "ko:hello");
    assert_eq!(translator.0.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn cs_directions_pick_source_and_target() {
    let translator = Arc::new(CountingTranslator(AtomicUsize::new(0)));
    let svc = service(translator, None);

    let to_customer = svc
      .translate_for_cs("안녕하세요", CsDirection::ToCustomer, LanguageCode::Ja, LanguageCode::Ko)
      .await
      .unwrap();
    assert_eq!(to_customer.text, "ja:안녕하세요");

    let to_agent = svc
      .translate_for_cs("こんにちは", CsDirection::ToAgent, LanguageCode::Ja, LanguageCode::Ko)
      .await
      .unwrap();
    assert_eq!(to_agent.text, "ko:こんにちは");
    assert_eq!(to_agent.detected_source, Some(LanguageCode::Ja));

    // A clinic working in English.
    let to_agent = svc
      .translate_for_cs("こんにちは", CsDirection::ToAgent, LanguageCode::Ja, LanguageCode::En)
      .await
      .unwrap();
    assert_eq!(to_agent.text, "en:こんにちは");
  }

  #[tokio::test]
  async fn same_language_is_a_passthrough() {
    let translator = Arc::new(CountingTranslator(AtomicUsize::new(0)));
    let svc = service(translator.clone(), None);

    let t = svc
      .translate("안녕하세요", Some(LanguageCode::Ko), LanguageCode::Ko)
      .await
      .unwrap();
    assert_eq!(t.text, "안녕하세요");
    assert_eq!(translator.0.load(Ordering::SeqCst), 0);
  }
}
