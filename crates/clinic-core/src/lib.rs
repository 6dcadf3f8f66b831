//! Core types and trait definitions for the clinic messaging platform.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement the repository traits in [`store`]; external
//! providers (translation, generation, locks, channel sends) implement the
//! collaborator traits in [`provider`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod channel;
pub mod conversation;
pub mod customer;
pub mod error;
pub mod escalation;
pub mod event;
pub mod inbound;
pub mod knowledge;
pub mod language;
pub mod message;
pub mod provider;
pub mod store;
pub mod tenant;

pub use error::{Error, Result};
