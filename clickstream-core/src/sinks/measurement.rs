//! HTTP sink for the Google Analytics 4 Measurement Protocol.
//!
//! Fire and forget: a failed POST is logged and dropped, never retried, and
//! never surfaces to the tracking call that produced the event. `ready()`
//! lets startup code await the first confirmed delivery instead of polling.

use async_trait::async_trait;
use clickstream_common::models::events::AnalyticsEvent;
use clickstream_common::traits::EventSink;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

const COLLECT_ENDPOINT: &str = "https://www.google-analytics.com/mp/collect";

#[derive(Serialize)]
struct CollectBody<'a> {
    client_id: &'a str,
    events: Vec<CollectEvent>,
}

#[derive(Serialize)]
struct CollectEvent {
    name: &'static str,
    params: Map<String, Value>,
}

pub struct MeasurementSink {
    client: reqwest::Client,
    endpoint: String,
    measurement_id: String,
    api_secret: String,
    client_id: String,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
}

impl MeasurementSink {
    pub fn new(measurement_id: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self::with_endpoint(COLLECT_ENDPOINT, measurement_id, api_secret)
    }

    /// Endpoint override, mainly for pointing tests at a local server.
    pub fn with_endpoint(
        endpoint: impl Into<String>,
        measurement_id: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            measurement_id: measurement_id.into(),
            api_secret: api_secret.into(),
            client_id: Uuid::new_v4().to_string(),
            ready_tx,
            ready_rx,
        }
    }

    /// Resolves once at least one event has been accepted by the collector.
    pub async fn ready(&self) {
        let mut rx = self.ready_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl EventSink for MeasurementSink {
    async fn emit(&self, event: &AnalyticsEvent) {
        let body = CollectBody {
            client_id: &self.client_id,
            events: vec![CollectEvent {
                name: event.event_type(),
                params: event.params(),
            }],
        };
        let result = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("measurement_id", self.measurement_id.as_str()),
                ("api_secret", self.api_secret.as_str()),
            ])
            .json(&body)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                debug!("delivered {}", event.event_type());
                let _ = self.ready_tx.send(true);
            }
            Ok(response) => {
                warn!(
                    "collector rejected {}: {}",
                    event.event_type(),
                    response.status()
                );
            }
            Err(e) => {
                warn!("delivery of {} failed: {}", event.event_type(), e);
            }
        }
    }
}
