//! src/eventbus/forwarder.rs
//!
//! Spawns a task that subscribes to the EventBus and forwards every event to
//! the external sink. Delivery is best-effort: the sink swallows its own
//! failures and the forwarder never retries. Drains the queue on shutdown.

use std::sync::Arc;

use clickstream_common::traits::EventSink;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::eventbus::EventBus;

/// Subscribes to the bus and pushes each event to `sink` until shutdown.
/// Returns a `JoinHandle<()>` so the caller can await the final drain.
pub async fn spawn_sink_forwarder(
    event_bus: &EventBus,
    sink: Arc<dyn EventSink>,
    buffer_size: usize,
) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe(Some(buffer_size)).await;
    let mut shutdown_rx = event_bus.shutdown_rx.clone();

    tokio::spawn(async move {
        debug!("sink forwarder started with buffer_size={}", buffer_size);

        loop {
            tokio::select! {
                biased;
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => sink.emit(&event).await,
                        None => {
                            info!("sink forwarder channel closed => break from loop.");
                            break;
                        }
                    }
                },
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("sink forwarder shutting down => break from loop.");
                        break;
                    }
                }
            }
        }

        // Drain whatever is still queued, then exit.
        while let Ok(event) = rx.try_recv() {
            sink.emit(&event).await;
        }
        debug!("sink forwarder exited.");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use clickstream_common::models::events::AnalyticsEvent;
    use std::sync::Mutex;
    use tokio::time::{timeout, Duration};

    struct CollectingSink {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventSink for CollectingSink {
        async fn emit(&self, event: &AnalyticsEvent) {
            self.seen.lock().unwrap().push(event.event_type().to_string());
        }
    }

    #[tokio::test]
    async fn forwards_then_drains_on_shutdown() {
        let bus = EventBus::new();
        let sink = Arc::new(CollectingSink {
            seen: Mutex::new(vec![]),
        });
        let handle = spawn_sink_forwarder(&bus, sink.clone(), 16).await;

        for term in ["a", "b", "c"] {
            bus.publish(AnalyticsEvent::Search {
                term: term.to_string(),
                results: None,
                timestamp: Utc::now(),
            })
            .await;
        }

        bus.shutdown();
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("forwarder should exit")
            .unwrap();

        assert_eq!(sink.seen.lock().unwrap().len(), 3);
    }
}
