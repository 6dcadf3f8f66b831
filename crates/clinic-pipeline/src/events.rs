//! In-process realtime event bus.

use clinic_core::event::{EventSink, PipelineEvent};
use tokio::sync::broadcast;
use tracing::trace;

/// Fans pipeline events out to any number of subscribers. Events emitted
/// while nobody listens are dropped; slow subscribers lag rather than block.
#[derive(Clone)]
pub struct EventBus {
  tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity.max(1));
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> { self.tx.subscribe() }
}

impl EventSink for EventBus {
  fn emit(&self, event: PipelineEvent) {
    if self.tx.send(event).is_err() {
      trace!("no event subscribers");
    }
  }
}
