//! Sink that drops everything. Used when no collector is configured and in
//! tests that only care about the bus side.

use async_trait::async_trait;
use clickstream_common::models::events::AnalyticsEvent;
use clickstream_common::traits::EventSink;
use tracing::trace;

pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, event: &AnalyticsEvent) {
        trace!("dropping {} (no sink configured)", event.event_type());
    }
}
