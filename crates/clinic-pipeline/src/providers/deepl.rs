use std::time::Duration;

use async_trait::async_trait;
use clinic_core::{
  language::LanguageCode,
  provider::{ProviderResult, Translation, Translator},
};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::check_status;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepLConfig {
  /// `https://api-free.deepl.com/v2/translate` or the paid endpoint.
  pub endpoint: String,
  pub api_key:  String,
}

pub struct DeepLTranslator {
  client: Client,
  config: DeepLConfig,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
  text:        [&'a str; 1],
  target_lang: &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  source_lang: Option<&'static str>,
}

#[derive(Deserialize)]
struct TranslateResponse {
  translations: Vec<TranslatedText>,
}

#[derive(Deserialize)]
struct TranslatedText {
  text:                     String,
  #[serde(default)]
  detected_source_language: Option<String>,
}

/// Target language code. Chinese variants need the script.
fn target_code(lang: LanguageCode) -> &'static str {
  match lang {
    LanguageCode::Zh => "ZH-HANS",
    LanguageCode::ZhTw => "ZH-HANT",
    LanguageCode::En => "EN-US",
    other => source_code(other),
  }
}

fn source_code(lang: LanguageCode) -> &'static str {
  match lang {
    LanguageCode::Ko => "KO",
    LanguageCode::En => "EN",
    LanguageCode::Ja => "JA",
    LanguageCode::Zh | LanguageCode::ZhTw => "ZH",
    LanguageCode::Vi => "VI",
    LanguageCode::Th => "TH",
    LanguageCode::Ru => "RU",
    LanguageCode::Ar => "AR",
    LanguageCode::Id => "ID",
    LanguageCode::Mn => "MN",
  }
}

impl DeepLTranslator {
  pub fn new(config: DeepLConfig, timeout: Duration) -> Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, config })
  }

  async fn request(
    &self,
    text: &str,
    source: Option<LanguageCode>,
    target: LanguageCode,
  ) -> Result<Translation> {
    let body = TranslateRequest {
      text:        [text],
      target_lang: target_code(target),
      source_lang: source.map(source_code),
    };
    let response = self
      .client
      .post(&self.config.endpoint)
      .header("Authorization", format!("DeepL-Auth-Key {}", self.config.api_key))
      .json(&body)
      .send()
      .await?;
    let parsed: TranslateResponse = check_status(response).await?.json().await?;
    let first = parsed
      .translations
      .into_iter()
      .next()
      .ok_or(Error::MalformedResponse("no translations"))?;

    Ok(Translation {
      text:            first.text,
      detected_source: first
        .detected_source_language
        .and_then(|code| code.to_lowercase().parse().ok())
        .or(source),
    })
  }
}

#[async_trait]
impl Translator for DeepLTranslator {
  async fn translate(
    &self,
    text: &str,
    source: Option<LanguageCode>,
    target: LanguageCode,
  ) -> ProviderResult<Translation> {
    Ok(self.request(text, source, target).await?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn chinese_targets_carry_script() {
    assert_eq!(target_code(LanguageCode::ZhTw), "ZH-HANT");
    assert_eq!(target_code(LanguageCode::Zh), "ZH-HANS");
    assert_eq!(source_code(LanguageCode::ZhTw), "ZH");
    assert_eq!(target_code(LanguageCode::Ko), "KO");
  }

  #[test]
  fn request_body_shape() {
    let body = TranslateRequest { text: ["안녕"], target_lang: "EN-US", source_lang: None };
    assert_eq!(
      serde_json::to_value(&body).unwrap(),
      serde_json::json!({ "text": ["안녕"], "target_lang": "EN-US" })
    );
  }
}
