//! SQLite backend for the clinic messaging platform.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Besides the entity repositories, the
//! same database hosts the short-TTL lock table and the translation cache.

mod encode;
mod kv;
mod rank;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
