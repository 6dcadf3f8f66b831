//! Change events emitted by the pipeline for realtime consumers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{conversation::ConversationStatus, message::Message};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
  MessageCreated {
    tenant_id: Uuid,
    message:   Message,
  },
  ConversationStatusChanged {
    tenant_id:       Uuid,
    conversation_id: Uuid,
    status:          ConversationStatus,
  },
}

/// Receives pipeline events. Implementations must not block.
pub trait EventSink: Send + Sync {
  fn emit(&self, event: PipelineEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvents;

impl EventSink for NoopEvents {
  fn emit(&self, _event: PipelineEvent) {}
}
