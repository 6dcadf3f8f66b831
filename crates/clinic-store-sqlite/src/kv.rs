//! Lock store and cache store backed by the same SQLite database.
//!
//! Expiry is kept as unix milliseconds. Expired rows are treated as absent
//! and overwritten lazily.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clinic_core::provider::{CacheStore, LockStore, ProviderResult};
use rusqlite::OptionalExtension as _;

use crate::SqliteStore;

fn now_millis() -> i64 { Utc::now().timestamp_millis() }

fn expiry(ttl: Duration) -> i64 {
  now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

#[async_trait]
impl LockStore for SqliteStore {
  async fn set_if_not_exists(
    &self,
    key: &str,
    token: &str,
    ttl: Duration,
  ) -> ProviderResult<bool> {
    let key = key.to_owned();
    let token = token.to_owned();
    let now = now_millis();
    let expires_at = expiry(ttl);

    let changed = self
      .conn
      .call(move |conn| {
        // A live row blocks the upsert; an expired one is taken over.
        let n = conn.execute(
          "INSERT INTO locks (key, token, expires_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(key) DO UPDATE
             SET token = excluded.token, expires_at = excluded.expires_at
             WHERE locks.expires_at <= ?4",
          rusqlite::params![key, token, expires_at, now],
        )?;
        Ok(n)
      })
      .await?;

    Ok(changed == 1)
  }

  async fn compare_and_delete(&self, key: &str, token: &str) -> ProviderResult<bool> {
    let key = key.to_owned();
    let token = token.to_owned();

    let deleted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "DELETE FROM locks WHERE key = ?1 AND token = ?2",
          rusqlite::params![key, token],
        )?;
        Ok(n)
      })
      .await?;

    Ok(deleted == 1)
  }
}

#[async_trait]
impl CacheStore for SqliteStore {
  async fn get(&self, key: &str) -> ProviderResult<Option<String>> {
    let key = key.to_owned();
    let now = now_millis();

    let value = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT value FROM kv_cache WHERE key = ?1 AND expires_at > ?2",
              rusqlite::params![key, now],
              |r| r.get::<_, String>(0),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(value)
  }

  async fn set(&self, key: &str, value: &str, ttl: Duration) -> ProviderResult<()> {
    let key = key.to_owned();
    let value = value.to_owned();
    let expires_at = expiry(ttl);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO kv_cache (key, value, expires_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![key, value, expires_at],
        )?;
        Ok(())
      })
      .await?;

    Ok(())
  }
}
