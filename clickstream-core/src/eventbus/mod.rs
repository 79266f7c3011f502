//! src/eventbus/mod.rs
//!
//! In-process event bus with guaranteed delivery to multiple subscribers via
//! bounded MPSC queues. This is the subscribe/notify hook presentation code
//! uses to observe funnel, cart and engagement events without being part of
//! the tracking core.

pub mod forwarder;

use std::sync::Arc;

use clickstream_common::models::events::AnalyticsEvent;
use tokio::sync::{mpsc, watch, Mutex};

/// Each subscriber gets its own `mpsc::Sender<AnalyticsEvent>`.
///
/// - If a subscriber's buffer fills, `publish` awaits until there is space
///   (backpressure).
/// - If a subscriber has dropped its `Receiver`, sending fails and the event
///   is simply not delivered there.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<AnalyticsEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

const DEFAULT_BUFFER_SIZE: usize = 1024;

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Returns a receiver on which events will be delivered.
    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<AnalyticsEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    /// Publish an event to all subscribers.
    pub async fn publish(&self, event: AnalyticsEvent) {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        for s in senders {
            let _ = s.send(event.clone()).await;
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::time::{sleep, timeout, Duration};

    fn search_event(term: &str) -> AnalyticsEvent {
        AnalyticsEvent::Search {
            term: term.to_string(),
            results: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();

        let mut rx1 = bus.subscribe(Some(5)).await;
        let mut rx2 = bus.subscribe(Some(5)).await;

        bus.publish(search_event("murphy bed")).await;

        let evt1 = rx1.recv().await.expect("rx1 should get event");
        let evt2 = rx2.recv().await.expect("rx2 should get event");

        assert_eq!(evt1.event_type(), "search");
        assert_eq!(evt2.event_type(), "search");
    }

    #[tokio::test]
    async fn test_backpressure_blocking() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(Some(1)).await; // queue size = 1

        bus.publish(search_event("first")).await;

        // Reader drains the two messages after a short delay.
        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let first = rx.recv().await.expect("expected first message");
            let second = rx.recv().await.expect("expected second message");
            (first, second)
        });

        // This publish waits until there's space.
        let second_publish = bus.publish(search_event("second"));
        let result = timeout(Duration::from_millis(500), second_publish).await;
        assert!(result.is_ok(), "publish should eventually unblock");

        let (evt1, evt2) = handle.await.unwrap();
        match (evt1, evt2) {
            (
                AnalyticsEvent::Search { term: t1, .. },
                AnalyticsEvent::Search { term: t2, .. },
            ) => {
                assert_eq!(t1, "first");
                assert_eq!(t2, "second");
            }
            other => panic!("wrong events: {:?}", other),
        }
    }
}
