//! Customer and conversation resolution for inbound messages.

use std::sync::Arc;

use clinic_core::{
  conversation::Conversation,
  customer::{Customer, CustomerChannel, CustomerIdentity, MergeReport},
  store::{ConversationRepository, CustomerRepository, Inserted},
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{Error, Result};

pub struct Resolver<S> {
  store: Arc<S>,
}

impl<S> Resolver<S>
where
  S: CustomerRepository + ConversationRepository,
{
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// The customer owning this channel identity, created on first sight.
  /// Profile fields that are still unknown are filled from the identity.
  pub async fn find_or_create_customer(
    &self,
    identity: CustomerIdentity,
  ) -> Result<(Customer, CustomerChannel)> {
    let found = self
      .store
      .find_by_channel_identity(identity.channel_account_id, identity.channel_user_id.clone())
      .await
      .map_err(Error::store)?;

    let (customer, channel) = match found {
      Some(pair) => pair,
      None => match self.store.create_with_channel(identity.clone()).await.map_err(Error::store)? {
        Inserted::Created(pair) => {
          info!(
            customer_id = %pair.0.customer_id,
            tenant_id = %identity.tenant_id,
            "created customer"
          );
          return Ok(pair);
        }
        Inserted::Existing(pair) => {
          debug!(customer_id = %pair.0.customer_id, "customer created concurrently");
          pair
        }
      },
    };

    let name = identity.name.or(identity.channel_username);
    let missing_name = customer.display_name.is_none() && name.is_some();
    let missing_lang = customer.language.is_none() && identity.language.is_some();
    if !(missing_name || missing_lang) {
      return Ok((customer, channel));
    }
    let customer = self
      .store
      .fill_customer_profile(customer.customer_id, name, identity.language)
      .await
      .map_err(Error::store)?;
    Ok((customer, channel))
  }

  /// The customer's open conversation with the tenant, created when none
  /// exists.
  pub async fn get_or_create_conversation(
    &self,
    customer_id: Uuid,
    tenant_id: Uuid,
  ) -> Result<Conversation> {
    if let Some(open) = self
      .store
      .find_open_conversation(customer_id, tenant_id)
      .await
      .map_err(Error::store)?
    {
      return Ok(open);
    }
    let inserted = self
      .store
      .create_conversation(customer_id, tenant_id)
      .await
      .map_err(Error::store)?;
    if inserted.is_created() {
      info!(
        conversation_id = %inserted.get().conversation_id,
        %customer_id,
        "opened conversation"
      );
    }
    Ok(inserted.into_inner())
  }

  pub async fn find_duplicates(&self, customer_id: Uuid) -> Result<Vec<Customer>> {
    self.store.find_duplicates(customer_id).await.map_err(Error::store)
  }

  pub async fn merge_customers(&self, primary_id: Uuid, secondary_id: Uuid) -> Result<MergeReport> {
    self
      .store
      .merge_customers(primary_id, secondary_id)
      .await
      .map_err(Error::store)
  }
}
