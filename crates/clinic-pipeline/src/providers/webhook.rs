use std::time::Duration;

use async_trait::async_trait;
use clinic_core::{
  escalation::{EscalationPriority, NotificationJob},
  provider::{Notifier, ProviderResult},
};
use reqwest::Client;
use serde_json::{Value, json};

use super::check_status;
use crate::Result;

/// Posts escalation notices to an incoming-webhook URL (Slack-compatible
/// `text` plus the structured job).
pub struct WebhookNotifier {
  client: Client,
  url:    String,
}

fn priority_marker(priority: EscalationPriority) -> &'static str {
  match priority {
    EscalationPriority::Urgent => "[URGENT]",
    EscalationPriority::High => "[HIGH]",
    EscalationPriority::Normal => "[NORMAL]",
    EscalationPriority::Low => "[LOW]",
  }
}

fn body(job: &NotificationJob) -> Value {
  let customer = job.customer_name.as_deref().unwrap_or("unknown customer");
  let confidence = job
    .ai_confidence
    .map(|c| format!(" (AI confidence {:.0}%)", c * 100.0))
    .unwrap_or_default();
  json!({
    "text": format!(
      "{} {}: {} needs a human. {}{}",
      priority_marker(job.priority),
      job.tenant_name,
      customer,
      job.reason,
      confidence,
    ),
    "escalation": job,
  })
}

impl WebhookNotifier {
  pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, url: url.into() })
  }

  async fn post(&self, job: &NotificationJob) -> Result<()> {
    let response = self.client.post(&self.url).json(&body(job)).send().await?;
    check_status(response).await?;
    Ok(())
  }
}

#[async_trait]
impl Notifier for WebhookNotifier {
  async fn notify(&self, job: &NotificationJob) -> ProviderResult<()> { Ok(self.post(job).await?) }
}
