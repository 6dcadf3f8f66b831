//! Prompt assembly for answer generation.

use std::fmt::Write as _;

use clinic_core::{
  language::LanguageCode,
  message::{Message, SenderType},
  provider::{Prompt, PromptRole, PromptTurn},
  tenant::Tenant,
};
use uuid::Uuid;

use super::retrieval::RetrievedChunk;

const GENERIC_PROMPT: &str = "You are a friendly and accurate customer-service assistant for a \
                              medical clinic. Answer only from the reference documents. If they \
                              do not contain the answer, say that you are not sure and that \
                              staff will confirm. Never give a diagnosis or guarantee a \
                              treatment outcome.";

pub struct PromptInput<'a> {
  pub tenant:           &'a Tenant,
  pub working_language: LanguageCode,
  pub chunks:           &'a [RetrievedChunk],
  /// Most recent first, as returned by the store.
  pub history:          &'a [Message],
  /// The triggering message, already persisted; left out of the history.
  pub current_id:       Option<Uuid>,
  pub query:            &'a str,
  pub profile_hints:    &'a [String],
}

pub fn build(input: PromptInput<'_>) -> Prompt {
  let mut system = input
    .tenant
    .ai
    .system_prompt
    .as_deref()
    .map(str::trim)
    .filter(|p| !p.is_empty())
    .unwrap_or(GENERIC_PROMPT)
    .to_owned();

  let _ = write!(system, "\n\nClinic: {}", input.tenant.name);
  if let Some(specialty) = &input.tenant.specialty {
    let _ = write!(system, " ({specialty})");
  }
  let _ = write!(
    system,
    "\nAnswer in {}.",
    input.working_language.english_name()
  );

  system.push_str("\n\n## Reference documents\n");
  if input.chunks.is_empty() {
    system.push_str("(none found)\n");
  }
  for (i, chunk) in input.chunks.iter().enumerate() {
    let _ = writeln!(
      system,
      "[{}] {} (similarity {:.2})\n{}",
      i + 1,
      chunk.hit.document_name,
      chunk.similarity,
      chunk.hit.content.trim()
    );
  }

  if !input.profile_hints.is_empty() {
    system.push_str("\n## Customer\n");
    for hint in input.profile_hints {
      let _ = writeln!(system, "- {hint}");
    }
  }

  let mut turns: Vec<PromptTurn> = input
    .history
    .iter()
    .rev()
    .filter(|m| Some(m.message_id) != input.current_id)
    .filter_map(|m| history_turn(m, input.working_language))
    .collect();
  turns.push(PromptTurn { role: PromptRole::User, content: input.query.to_owned() });

  Prompt { system, turns }
}

fn history_turn(message: &Message, working: LanguageCode) -> Option<PromptTurn> {
  let role = match message.sender_type {
    SenderType::Customer => PromptRole::User,
    SenderType::Agent | SenderType::Ai => PromptRole::Assistant,
    SenderType::InternalNote | SenderType::System => return None,
  };
  let content = match (&message.translated_content, message.translated_language) {
    (Some(text), Some(lang)) if lang == working => text.clone(),
    _ => message.content.clone(),
  };
  (!content.trim().is_empty()).then_some(PromptTurn { role, content })
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use clinic_core::{
    knowledge::ChunkHit,
    message::{ContentType, Direction, MessageStatus},
    tenant::AiConfig,
  };

  use super::*;

  fn tenant(system_prompt: Option<&str>) -> Tenant {
    Tenant {
      tenant_id:        Uuid::new_v4(),
      name:             "Bright Eye Clinic".into(),
      specialty:        Some("ophthalmology".into()),
      default_language: LanguageCode::Ko,
      ai:               AiConfig {
        system_prompt: system_prompt.map(str::to_owned),
        ..AiConfig::default()
      },
      created_at:       Utc::now(),
    }
  }

  fn message(sender: SenderType, content: &str) -> Message {
    Message {
      message_id:          Uuid::new_v4(),
      conversation_id:     Uuid::nil(),
      direction:           Direction::Inbound,
      sender_type:         sender,
      content:             content.into(),
      content_type:        ContentType::Text,
      media_url:           None,
      original_language:   None,
      translated_content:  None,
      translated_language: None,
      ai_confidence:       None,
      ai_model:            None,
      status:              MessageStatus::Delivered,
      external_id:         None,
      created_at:          Utc::now(),
    }
  }

  #[test]
  fn history_is_chronological_without_notes_or_current() {
    let current = message(SenderType::Customer, "지금 질문");
    let mut translated = message(SenderType::Customer, "How much?");
    translated.translated_content = Some("얼마예요?".into());
    translated.translated_language = Some(LanguageCode::Ko);
    // Newest first.
    let history = vec![
      current.clone(),
      message(SenderType::InternalNote, "VIP"),
      message(SenderType::Ai, "200만원입니다."),
      translated,
    ];
    let t = tenant(None);
    let prompt = build(PromptInput {
      tenant:           &t,
      working_language: LanguageCode::Ko,
      chunks:           &[],
      history:          &history,
      current_id:       Some(current.message_id),
      query:            "지금 질문",
      profile_hints:    &[],
    });

    let contents: Vec<&str> = prompt.turns.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, ["얼마예요?", "200만원입니다.", "지금 질문"]);
    assert_eq!(prompt.turns[1].role, PromptRole::Assistant);
    assert!(prompt.system.starts_with(GENERIC_PROMPT));
    assert!(prompt.system.contains("(none found)"));
  }

  #[test]
  fn tenant_prompt_documents_and_hints_are_included() {
    let t = tenant(Some("You answer for Bright Eye."));
    let chunk = RetrievedChunk {
      hit:        ChunkHit {
        chunk_id:             Uuid::new_v4(),
        document_id:          Uuid::new_v4(),
        document_name:        "LASIK pricing".into(),
        document_description: None,
        content:              "LASIK costs 2,000,000 KRW.".into(),
        score:                0.91,
      },
      similarity: 0.91,
      fused:      0.01,
    };
    let prompt = build(PromptInput {
      tenant:           &t,
      working_language: LanguageCode::Ko,
      chunks:           std::slice::from_ref(&chunk),
      history:          &[],
      current_id:       None,
      query:            "라식 비용?",
      profile_hints:    &["country: JP".to_string()],
    });
    assert!(prompt.system.starts_with("You answer for Bright Eye."));
    assert!(prompt.system.contains("[1] LASIK pricing (similarity 0.91)"));
    assert!(prompt.system.contains("- country: JP"));
    assert!(prompt.system.contains("Answer in Korean."));
    assert_eq!(prompt.turns.len(), 1);
  }
}
