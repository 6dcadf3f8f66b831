//! Duplicate-processing guard for inbound events.
//!
//! A short-lived lock keyed by `(conversation, external message id)` admits
//! one runner per logical event. Each acquisition carries its own token and
//! release is compare-and-delete, so a runner whose lock already expired
//! cannot release a later runner's lock. When the lock backend is down the
//! guard lets processing through.
//!
//! [`already_answered`] is a second, independent check run right before an
//! AI send.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use clinic_core::{message::SenderType, provider::LockStore, store::MessageRepository};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{Error, Result};

/// Comfortably above worst-case translation plus generation latency.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
pub enum Acquisition {
  Acquired(LockHandle),
  /// Another runner holds the lock; abort without retrying.
  Held,
  /// The lock backend failed; proceed unguarded.
  Unavailable,
}

#[derive(Debug)]
#[must_use = "a held lock should be released"]
pub struct LockHandle {
  key:   String,
  token: String,
}

impl LockHandle {
  pub fn key(&self) -> &str { &self.key }
}

pub struct IdempotencyGuard {
  locks: Arc<dyn LockStore>,
  ttl:   Duration,
}

impl IdempotencyGuard {
  pub fn new(locks: Arc<dyn LockStore>, ttl: Duration) -> Self { Self { locks, ttl } }

  pub fn key(conversation_id: Uuid, external_id: &str) -> String {
    format!("inbound:{conversation_id}:{external_id}")
  }

  pub async fn acquire(&self, conversation_id: Uuid, external_id: &str) -> Acquisition {
    let key = Self::key(conversation_id, external_id);
    let token = Uuid::new_v4().to_string();
    match self.locks.set_if_not_exists(&key, &token, self.ttl).await {
      Ok(true) => {
        debug!(%key, "acquired inbound lock");
        Acquisition::Acquired(LockHandle { key, token })
      }
      Ok(false) => {
        debug!(%key, "inbound lock already held");
        Acquisition::Held
      }
      Err(e) => {
        error!(
          %key,
          error = %e,
          "lock backend unavailable, processing WITHOUT duplicate protection"
        );
        Acquisition::Unavailable
      }
    }
  }

  pub async fn release(&self, handle: LockHandle) {
    match self.locks.compare_and_delete(&handle.key, &handle.token).await {
      Ok(true) => debug!(key = %handle.key, "released inbound lock"),
      Ok(false) => warn!(key = %handle.key, "inbound lock expired or was taken over before release"),
      Err(e) => warn!(key = %handle.key, error = %e, "failed to release inbound lock"),
    }
  }
}

/// Whether an AI-authored message was created in the conversation after
/// `since`.
pub async fn already_answered<S: MessageRepository>(
  store: &S,
  conversation_id: Uuid,
  since: DateTime<Utc>,
) -> Result<bool> {
  let later = store
    .messages_after(conversation_id, Some(since))
    .await
    .map_err(Error::store)?;
  Ok(later.iter().any(|m| m.sender_type == SenderType::Ai))
}
