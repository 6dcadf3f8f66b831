use std::time::Duration;

use async_trait::async_trait;
use clinic_core::provider::{
  Embedder, Generation, Generator, Prompt, PromptRole, ProviderResult,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::check_status;
use crate::{Error, Result};

/// An OpenAI-compatible endpoint serving both embeddings and chat
/// completions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
  /// Base URL, e.g. `https://api.openai.com/v1`.
  pub endpoint:        String,
  pub api_key:         String,
  pub embedding_model: String,
}

pub struct OpenAiClient {
  client: Client,
  config: OpenAiConfig,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role:    &'static str,
  content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
  model:       &'a str,
  messages:    Vec<ChatMessage<'a>>,
  temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)]
  usage:   Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
  message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
  #[serde(default)]
  content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
  total_tokens: u32,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

fn chat_request<'a>(prompt: &'a Prompt, model: &'a str) -> ChatRequest<'a> {
  let mut messages = Vec::with_capacity(prompt.turns.len() + 1);
  messages.push(ChatMessage { role: "system", content: &prompt.system });
  messages.extend(prompt.turns.iter().map(|turn| ChatMessage {
    role:    match turn.role {
      PromptRole::User => "user",
      PromptRole::Assistant => "assistant",
    },
    content: &turn.content,
  }));
  ChatRequest { model, messages, temperature: 0.3 }
}

fn generation(response: ChatResponse) -> Result<Generation> {
  let text = response
    .choices
    .into_iter()
    .next()
    .and_then(|c| c.message.content)
    .ok_or(Error::MalformedResponse("no completion choices"))?;
  Ok(Generation {
    text:        text.trim().to_owned(),
    tokens_used: response.usage.map(|u| u.total_tokens).unwrap_or(0),
  })
}

impl OpenAiClient {
  pub fn new(config: OpenAiConfig, timeout: Duration) -> Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{path}", self.config.endpoint.trim_end_matches('/'))
  }

  async fn chat(&self, prompt: &Prompt, model: &str) -> Result<Generation> {
    let response = self
      .client
      .post(self.url("chat/completions"))
      .bearer_auth(&self.config.api_key)
      .json(&chat_request(prompt, model))
      .send()
      .await?;
    generation(check_status(response).await?.json().await?)
  }

  async fn embedding(&self, text: &str) -> Result<Vec<f32>> {
    let response = self
      .client
      .post(self.url("embeddings"))
      .bearer_auth(&self.config.api_key)
      .json(&EmbeddingRequest { model: &self.config.embedding_model, input: text })
      .send()
      .await?;
    let parsed: EmbeddingResponse = check_status(response).await?.json().await?;
    parsed
      .data
      .into_iter()
      .next()
      .map(|d| d.embedding)
      .ok_or(Error::MalformedResponse("no embedding returned"))
  }
}

#[async_trait]
impl Embedder for OpenAiClient {
  async fn embed(&self, text: &str) -> ProviderResult<Vec<f32>> { Ok(self.embedding(text).await?) }
}

#[async_trait]
impl Generator for OpenAiClient {
  async fn generate(&self, prompt: &Prompt, model: &str) -> ProviderResult<Generation> {
    Ok(self.chat(prompt, model).await?)
  }
}

#[cfg(test)]
mod tests {
  use clinic_core::provider::PromptTurn;
  use serde_json::json;

  use super::*;

  #[test]
  fn system_prompt_leads_the_messages() {
    let prompt = Prompt {
      system: "be kind".into(),
      turns:  vec![
        PromptTurn { role: PromptRole::User, content: "hi".into() },
        PromptTurn { role: PromptRole::Assistant, content: "hello".into() },
      ],
    };
    let body = serde_json::to_value(chat_request(&prompt, "gpt-4o-mini")).unwrap();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["messages"][0], json!({ "role": "system", "content": "be kind" }));
    assert_eq!(body["messages"][2]["role"], "assistant");
  }

  #[test]
  fn completion_text_and_usage_are_read() {
    let response: ChatResponse = serde_json::from_value(json!({
      "choices": [{ "message": { "role": "assistant", "content": " 200만원입니다. " } }],
      "usage": { "prompt_tokens": 90, "completion_tokens": 10, "total_tokens": 100 }
    }))
    .unwrap();
    let g = generation(response).unwrap();
    assert_eq!(g.text, "200만원입니다.");
    assert_eq!(g.tokens_used, 100);

    let empty: ChatResponse = serde_json::from_value(json!({ "choices": [] })).unwrap();
    assert!(matches!(generation(empty), Err(Error::MalformedResponse(_))));
  }
}
