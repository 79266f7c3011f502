use async_trait::async_trait;

use crate::models::events::AnalyticsEvent;

/// One-way, fire-and-forget push to an external analytics collector.
///
/// `emit` is infallible from the caller's side: implementations swallow
/// delivery failures (logging them at most). No acknowledgement, no retry —
/// a failure to deliver must never block or alter the primary user flow.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &AnalyticsEvent);
}
