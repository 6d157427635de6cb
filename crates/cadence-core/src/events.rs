//! Fire-and-forget event publication
//!
//! Downstream consumers (notification fan-out, audit trails) subscribe to a
//! broadcast channel; the engine publishes and moves on. A publish can never
//! fail an analysis: sinks log delivery problems and swallow them.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::{Frequency, PatternType};

/// Events emitted by the engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    MerchantCreated {
        merchant_id: i64,
        normalized_name: String,
        category: String,
    },
    TransactionRecorded {
        transaction_id: i64,
        merchant_id: Option<i64>,
    },
    PatternDetected {
        pattern_id: i64,
        merchant_id: i64,
        pattern_type: PatternType,
        frequency: Frequency,
        confidence: f64,
    },
}

/// Sink for fire-and-forget event publication
pub trait EventSink: Send + Sync {
    fn publish(&self, event: Event);
}

/// Sink that drops every event (default when nobody subscribes)
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: Event) {}
}

/// Sink backed by a tokio broadcast channel
///
/// Lagging or absent receivers are not errors; `broadcast::Sender::send`
/// only fails when no receiver exists, which is a normal state here.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Event>,
}

impl BroadcastSink {
    /// Create a sink and its first receiver handle
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<Event>) {
        let (tx, rx) = broadcast::channel(capacity);
        (Self { tx }, rx)
    }

    /// Subscribe a new receiver
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: Event) {
        if let Err(e) = self.tx.send(event) {
            debug!(error = %e, "No subscribers for event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscriber() {
        let (sink, mut rx) = BroadcastSink::new(16);

        sink.publish(Event::TransactionRecorded {
            transaction_id: 42,
            merchant_id: Some(7),
        });

        match rx.recv().await.unwrap() {
            Event::TransactionRecorded { transaction_id, .. } => assert_eq!(transaction_id, 42),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let (sink, rx) = BroadcastSink::new(16);
        drop(rx);

        sink.publish(Event::MerchantCreated {
            merchant_id: 1,
            normalized_name: "Netflix".to_string(),
            category: "Entertainment".to_string(),
        });
    }
}
