//! Connected messaging channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The external messaging provider behind a [`ChannelAccount`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelType {
  Line,
  Kakao,
  Facebook,
  Instagram,
  Whatsapp,
  Wechat,
  Widget,
}

impl ChannelType {
  /// Whether the provider expects the webhook response itself to carry the
  /// reply (or a placeholder for it).
  pub fn requires_sync_reply(self) -> bool { matches!(self, Self::Kakao) }

  /// Channels served by the Meta Graph API.
  pub fn is_meta(self) -> bool {
    matches!(self, Self::Facebook | Self::Instagram | Self::Whatsapp)
  }
}

/// Secrets for one connected account. Which fields are used depends on the
/// channel type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelCredentials {
  /// Bearer token for outbound sends (LINE, Meta, WeChat).
  pub access_token: Option<String>,
  /// Signing secret for inbound webhooks (LINE channel secret, Meta app
  /// secret, WeChat/widget HMAC key).
  pub secret:       Option<String>,
  /// Shared API key compared verbatim (Kakao skill server).
  pub api_key:      Option<String>,
  /// Token used by subscription handshakes (Meta `hub.verify_token`,
  /// WeChat URL verification).
  pub verify_token: Option<String>,
  /// Provider-side id used in outbound URLs (WhatsApp phone-number id).
  pub sender_id:    Option<String>,
}

/// One connected external channel credential set, owned by one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAccount {
  pub channel_account_id:  Uuid,
  pub tenant_id:           Uuid,
  pub channel_type:        ChannelType,
  /// The provider's own identifier for the account (LINE bot user id, Kakao
  /// bot id, Meta page id, WeChat original id, widget id).
  pub external_account_id: String,
  #[serde(skip_serializing)]
  pub credentials:         ChannelCredentials,
  pub active:              bool,
  pub created_at:          DateTime<Utc>,
}

/// Input to [`crate::store::TenantRepository::add_channel_account`].
#[derive(Debug, Clone)]
pub struct NewChannelAccount {
  pub tenant_id:           Uuid,
  pub channel_type:        ChannelType,
  pub external_account_id: String,
  pub credentials:         ChannelCredentials,
}
