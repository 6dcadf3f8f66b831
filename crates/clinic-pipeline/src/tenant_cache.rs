//! Short-lived tenant cache.
//!
//! Tenant AI settings are data, loaded per request. Caching only saves the
//! lookup for a bounded time; an edit is visible after at most one TTL.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
  time::{Duration, Instant},
};

use clinic_core::{store::TenantRepository, tenant::Tenant};
use uuid::Uuid;

use crate::{Error, Result};

pub struct TenantCache<S> {
  store:   Arc<S>,
  ttl:     Duration,
  entries: Mutex<HashMap<Uuid, (Instant, Tenant)>>,
}

impl<S: TenantRepository> TenantCache<S> {
  pub fn new(store: Arc<S>, ttl: Duration) -> Self {
    Self { store, ttl, entries: Mutex::new(HashMap::new()) }
  }

  pub async fn get(&self, tenant_id: Uuid) -> Result<Tenant> {
    if let Some(tenant) = self.cached(tenant_id) {
      return Ok(tenant);
    }
    let tenant = self
      .store
      .get_tenant(tenant_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::NotFound { entity: "tenant", id: tenant_id })?;
    if !self.ttl.is_zero() {
      if let Ok(mut entries) = self.entries.lock() {
        entries.insert(tenant_id, (Instant::now(), tenant.clone()));
      }
    }
    Ok(tenant)
  }

  pub fn invalidate(&self, tenant_id: Uuid) {
    if let Ok(mut entries) = self.entries.lock() {
      entries.remove(&tenant_id);
    }
  }

  fn cached(&self, tenant_id: Uuid) -> Option<Tenant> {
    let mut entries = self.entries.lock().ok()?;
    match entries.get(&tenant_id) {
      Some((at, tenant)) if at.elapsed() < self.ttl => Some(tenant.clone()),
      Some(_) => {
        entries.remove(&tenant_id);
        None
      }
      None => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use clinic_core::{language::LanguageCode, tenant::{AiConfig, NewTenant}};
  use clinic_store_sqlite::SqliteStore;

  use super::*;

  #[tokio::test]
  async fn caches_until_invalidated_and_reports_missing() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let tenant = store
      .add_tenant(NewTenant {
        name:             "Seoul Smile".into(),
        specialty:        None,
        default_language: LanguageCode::Ko,
        ai:               AiConfig::default(),
      })
      .await
      .unwrap();

    let cache = TenantCache::new(store, Duration::from_secs(60));
    assert_eq!(cache.get(tenant.tenant_id).await.unwrap().name, "Seoul Smile");
    assert!(cache.cached(tenant.tenant_id).is_some());
    cache.invalidate(tenant.tenant_id);
    assert!(cache.cached(tenant.tenant_id).is_none());

    assert!(matches!(
      cache.get(Uuid::new_v4()).await,
      Err(Error::NotFound { entity: "tenant", .. })
    ));
  }
}
