//! Escalation creation and the notification side channel.

use std::sync::Arc;

use clinic_core::{
  conversation::{Conversation, ConversationStatus},
  customer::Customer,
  escalation::{Escalation, NewEscalation, NotificationJob},
  provider::Notifier,
  store::{ConversationRepository, EscalationRepository, MessageRepository},
  tenant::Tenant,
};
use tokio::{
  sync::mpsc::{self, error::TrySendError},
  task::JoinHandle,
};
use tracing::{error, info, warn};

use crate::persistence::MessageService;

/// Start the background worker that delivers notification jobs. It stops
/// once every sender is dropped.
pub fn spawn_notification_worker(
  notifier: Arc<dyn Notifier>,
  capacity: usize,
) -> (mpsc::Sender<NotificationJob>, JoinHandle<()>) {
  let (tx, mut rx) = mpsc::channel::<NotificationJob>(capacity.max(1));
  let handle = tokio::spawn(async move {
    while let Some(job) = rx.recv().await {
      match notifier.notify(&job).await {
        Ok(()) => info!(escalation_id = %job.escalation_id, "escalation notification sent"),
        Err(e) => error!(
          escalation_id = %job.escalation_id,
          error = %e,
          "escalation notification failed"
        ),
      }
    }
  });
  (tx, handle)
}

#[derive(Debug, Clone)]
pub struct EscalationResult {
  /// `None` when the insert itself failed; the conversation is still marked.
  pub escalation:   Option<Escalation>,
  /// False when the triggering message had already been escalated.
  pub created:      bool,
  pub conversation: Conversation,
}

pub struct EscalationService<S> {
  store:         Arc<S>,
  messages:      MessageService<S>,
  notifications: Option<mpsc::Sender<NotificationJob>>,
}

impl<S> EscalationService<S>
where
  S: EscalationRepository + ConversationRepository + MessageRepository,
{
  pub fn new(
    store: Arc<S>,
    messages: MessageService<S>,
    notifications: Option<mpsc::Sender<NotificationJob>>,
  ) -> Self {
    Self { store, messages, notifications }
  }

  /// Record the escalation, mark the conversation `escalated` and queue a
  /// notification for a newly created escalation.
  ///
  /// Store failures are logged and never stop the hand-over: a failed insert
  /// still marks the conversation, and a failed status change returns the
  /// conversation as it was.
  pub async fn create_escalation(
    &self,
    tenant: &Tenant,
    customer: &Customer,
    conversation: &Conversation,
    input: NewEscalation,
  ) -> EscalationResult {
    let (escalation, created) = match self.store.insert_escalation(input.clone()).await {
      Ok(inserted) => {
        let created = inserted.is_created();
        (Some(inserted.into_inner()), created)
      }
      Err(e) => {
        error!(
          conversation_id = %conversation.conversation_id,
          message_id = ?input.message_id,
          error = %e,
          "failed to record escalation, marking conversation anyway"
        );
        (None, false)
      }
    };

    let conversation = match self
      .messages
      .set_conversation_status(conversation, ConversationStatus::Escalated)
      .await
    {
      Ok(updated) => updated,
      Err(e) => {
        error!(
          conversation_id = %conversation.conversation_id,
          error = %e,
          "failed to mark conversation as escalated"
        );
        conversation.clone()
      }
    };

    if let (Some(escalation), true) = (&escalation, created) {
      info!(
        escalation_id = %escalation.escalation_id,
        conversation_id = %conversation.conversation_id,
        priority = %escalation.priority,
        reason = %escalation.reason,
        "conversation escalated"
      );
      self.enqueue(NotificationJob {
        escalation_id:   escalation.escalation_id,
        conversation_id: conversation.conversation_id,
        tenant_id:       tenant.tenant_id,
        tenant_name:     tenant.name.clone(),
        customer_id:     customer.customer_id,
        customer_name:   customer.display_name.clone(),
        priority:        escalation.priority,
        reason:          escalation.reason.clone(),
        ai_confidence:   escalation.ai_confidence,
      });
    }

    EscalationResult { escalation, created, conversation }
  }

  fn enqueue(&self, job: NotificationJob) {
    let Some(tx) = &self.notifications else {
      return;
    };
    match tx.try_send(job) {
      Ok(()) => {}
      Err(TrySendError::Full(job)) => {
        warn!(escalation_id = %job.escalation_id, "notification queue full, dropping job")
      }
      Err(TrySendError::Closed(job)) => {
        warn!(escalation_id = %job.escalation_id, "notification worker stopped, dropping job")
      }
    }
  }
}
