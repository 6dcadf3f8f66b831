//! The inbound CS pipeline: translation, customer and conversation
//! resolution, retrieval-augmented answers, escalation, message persistence
//! and the duplicate-processing guard.
//!
//! Everything is generic over a [`clinic_core::store::Store`] backend and
//! takes its external collaborators as trait objects, so tests run against
//! the in-memory SQLite store with fakes.

pub mod error;
pub mod escalation;
pub mod events;
pub mod fallback;
pub mod guard;
pub mod inbound;
pub mod persistence;
pub mod providers;
pub mod rag;
pub mod resolver;
pub mod tenant_cache;
pub mod translation;

pub use error::{Error, Result};
pub use inbound::{Collaborators, InboundProcessor, PipelineConfig, ProcessOutcome};
