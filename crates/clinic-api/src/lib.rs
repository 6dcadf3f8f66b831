//! Admin JSON API for the clinic platform.
//!
//! Exposes an axum [`Router`] backed by any [`clinic_core::store::Store`].
//! Auth and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", clinic_api::api_router(store.clone()))
//! ```

pub mod conversations;
pub mod customers;
pub mod error;
pub mod escalations;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use clinic_core::store::Store;

pub use error::ApiError;

/// Build the admin router for `store`.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: Store + 'static,
{
  Router::new()
    // Customers
    .route("/customers/{id}/duplicates", get(customers::duplicates::<S>))
    .route("/customers/{id}/merge", post(customers::merge::<S>))
    // Conversations
    .route("/conversations/{id}/messages", get(conversations::messages::<S>))
    // Escalations
    .route("/escalations", get(escalations::list::<S>))
    .with_state(store)
}
