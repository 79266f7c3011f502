//! Interaction sampling and engagement metrics.
//!
//! Samples land in a bounded in-memory ring buffer that is trimmed from the
//! oldest end when it overflows. Scroll depth is monotonic per page and each
//! configured milestone fires exactly once, in ascending order; crossing the
//! early milestones also pulls the funnel forward.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clickstream_common::models::events::AnalyticsEvent;
use clickstream_common::models::funnel::FunnelStage;
use clickstream_common::models::interaction::{
    EngagementMetrics, FormAction, InteractionKind, InteractionRecord,
};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::InteractionConfig;
use crate::consent::ConsentGate;
use crate::eventbus::EventBus;
use crate::services::funnel_service::FunnelTracker;
use crate::session::SessionStore;

pub struct InteractionAggregator {
    gate: Arc<ConsentGate>,
    bus: EventBus,
    funnel: Arc<FunnelTracker>,
    store: Arc<SessionStore>,
    config: InteractionConfig,
    state: Mutex<InteractionState>,
}

struct InteractionState {
    scroll_depth: u8,
    click_count: u64,
    session_start: DateTime<Utc>,
    page_start: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    records: VecDeque<InteractionRecord>,
    milestones_fired: Vec<u8>,
}

impl InteractionState {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            scroll_depth: 0,
            click_count: 0,
            session_start: now,
            page_start: now,
            last_activity: now,
            records: VecDeque::new(),
            milestones_fired: Vec::new(),
        }
    }
}

impl InteractionAggregator {
    pub fn new(
        gate: Arc<ConsentGate>,
        bus: EventBus,
        funnel: Arc<FunnelTracker>,
        store: Arc<SessionStore>,
        config: InteractionConfig,
    ) -> Self {
        Self {
            gate,
            bus,
            funnel,
            store,
            config,
            state: Mutex::new(InteractionState::new()),
        }
    }

    /// New page within the same visit: scroll depth and milestone state are
    /// per page, the ring buffer and click count are per visit.
    pub async fn reset_page(&self) {
        let mut state = self.state.lock().await;
        state.scroll_depth = 0;
        state.milestones_fired.clear();
        state.page_start = Utc::now();
    }

    /// Records a scroll-depth sample. Depth only ever grows; each milestone
    /// at or below the new depth that has not fired yet fires once, in
    /// ascending order.
    pub async fn record_scroll(&self, percent: u8) {
        if !self.gate.has_analytics_consent().await {
            return;
        }
        let percent = percent.min(100);
        let newly_crossed = {
            let mut state = self.state.lock().await;
            if percent <= state.scroll_depth {
                return;
            }
            state.scroll_depth = percent;
            state.last_activity = Utc::now();

            let mut crossed: Vec<u8> = self
                .config
                .scroll_milestones
                .iter()
                .copied()
                .filter(|m| *m <= percent && !state.milestones_fired.contains(m))
                .collect();
            crossed.sort_unstable();
            state.milestones_fired.extend(&crossed);
            crossed
        };

        for milestone in newly_crossed {
            self.bus
                .publish(AnalyticsEvent::ScrollMilestone {
                    percent: milestone,
                    max_depth: percent,
                    timestamp: Utc::now(),
                })
                .await;
            match milestone {
                25 => {
                    self.funnel
                        .advance_to(FunnelStage::Interest, "scroll_engagement", 0.0, Map::new())
                        .await;
                }
                50 => {
                    self.funnel
                        .advance_to(FunnelStage::Consideration, "deep_engagement", 0.0, Map::new())
                        .await;
                }
                _ => {}
            }
        }
    }

    pub async fn record_click(&self, target: &str, metadata: Map<String, Value>) {
        if !self.gate.has_analytics_consent().await {
            return;
        }
        {
            let mut state = self.state.lock().await;
            state.click_count += 1;
        }
        self.record_interaction(
            InteractionRecord::new(InteractionKind::Click, target, 1.0).with_metadata(metadata),
        )
        .await;
    }

    /// Appends a sample to the ring buffer and publishes it. When the
    /// buffer exceeds its cap it is trimmed down to the configured size,
    /// oldest first.
    pub async fn record_interaction(&self, record: InteractionRecord) {
        if !self.gate.has_analytics_consent().await {
            return;
        }
        {
            let mut state = self.state.lock().await;
            state.last_activity = record.timestamp;
            state.records.push_back(record.clone());
            if state.records.len() > self.config.buffer_cap {
                let excess = state.records.len() - self.config.trim_to;
                state.records.drain(..excess);
            }
        }
        self.bus.publish(AnalyticsEvent::Interaction(record)).await;
    }

    pub async fn record_form_event(
        &self,
        form_id: &str,
        field: Option<&str>,
        action: FormAction,
    ) {
        let mut metadata = Map::new();
        metadata.insert("form_id".to_string(), json!(form_id));
        metadata.insert("action".to_string(), json!(action.as_str()));
        if let Some(field) = field {
            metadata.insert("field".to_string(), json!(field));
        }
        self.record_interaction(
            InteractionRecord::new(InteractionKind::Form, form_id, 0.0).with_metadata(metadata),
        )
        .await;
    }

    /// Publishes the search and moves the term to the front of the
    /// persisted recent-search list.
    pub async fn record_search(&self, term: &str, results: Option<u32>) {
        if !self.gate.has_analytics_consent().await {
            return;
        }
        self.bus
            .publish(AnalyticsEvent::Search {
                term: term.to_string(),
                results,
                timestamp: Utc::now(),
            })
            .await;
        if let Err(e) = self.store.record_search(term).await {
            warn!("failed to persist recent search: {}", e);
        }
        self.record_interaction(InteractionRecord::new(
            InteractionKind::Search,
            term,
            results.unwrap_or(0) as f64,
        ))
        .await;
    }

    /// Derived snapshot; nothing here is stored.
    pub async fn engagement_metrics(&self) -> EngagementMetrics {
        let state = self.state.lock().await;
        let now = Utc::now();
        let session_duration_ms = (now - state.session_start).num_milliseconds();
        let minutes = (session_duration_ms as f64 / 60_000.0).max(1.0 / 60.0);
        EngagementMetrics {
            time_on_page_ms: (now - state.page_start).num_milliseconds(),
            scroll_depth: state.scroll_depth,
            click_count: state.click_count,
            interaction_rate: state.records.len() as f64 / minutes,
            bounce_rate: if state.records.len() <= 1 { 100 } else { 0 },
            session_duration_ms,
        }
    }

    pub async fn history(&self) -> Vec<InteractionRecord> {
        let state = self.state.lock().await;
        state.records.iter().cloned().collect()
    }

    /// Time since the last recorded sample, for idle detection by the host.
    pub async fn idle_time(&self) -> chrono::Duration {
        let state = self.state.lock().await;
        Utc::now() - state.last_activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsentConfig;
    use crate::storage::MemoryStore;
    use clickstream_common::models::consent::ConsentPreferences;
    use tokio::sync::mpsc;

    async fn aggregator(
        granted: bool,
        config: InteractionConfig,
    ) -> (InteractionAggregator, mpsc::Receiver<AnalyticsEvent>) {
        let kv = Arc::new(MemoryStore::new());
        let gate = Arc::new(ConsentGate::new(kv.clone(), ConsentConfig::default()));
        if granted {
            gate.update(ConsentPreferences::allow_all()).await.unwrap();
        }
        let bus = EventBus::new();
        let rx = bus.subscribe(Some(64)).await;
        let funnel = Arc::new(FunnelTracker::new(gate.clone(), bus.clone()));
        let store = Arc::new(SessionStore::new(kv, 50, 5));
        (
            InteractionAggregator::new(gate, bus, funnel, store, config),
            rx,
        )
    }

    #[tokio::test]
    async fn milestones_fire_once_in_ascending_order() {
        let (agg, mut rx) = aggregator(true, InteractionConfig::default()).await;

        // One big jump crosses three milestones at once.
        agg.record_scroll(80).await;
        // Repeats and regressions change nothing.
        agg.record_scroll(80).await;
        agg.record_scroll(40).await;
        agg.record_scroll(95).await;

        let mut milestones = vec![];
        while let Ok(event) = rx.try_recv() {
            if let AnalyticsEvent::ScrollMilestone { percent, .. } = event {
                milestones.push(percent);
            }
        }
        assert_eq!(milestones, vec![25, 50, 75, 90]);
    }

    #[tokio::test]
    async fn scroll_advances_funnel_through_engagement() {
        let (agg, mut rx) = aggregator(true, InteractionConfig::default()).await;
        agg.record_scroll(60).await;

        let mut steps = vec![];
        while let Ok(event) = rx.try_recv() {
            if let AnalyticsEvent::FunnelStep { stage, action, .. } = event {
                steps.push((stage, action));
            }
        }
        assert_eq!(
            steps,
            vec![
                (FunnelStage::Interest, "scroll_engagement".to_string()),
                (FunnelStage::Consideration, "deep_engagement".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn page_reset_refires_milestones() {
        let (agg, mut rx) = aggregator(true, InteractionConfig::default()).await;
        agg.record_scroll(30).await;
        agg.reset_page().await;
        agg.record_scroll(30).await;

        let count = {
            let mut n = 0;
            while let Ok(event) = rx.try_recv() {
                if matches!(event, AnalyticsEvent::ScrollMilestone { percent: 25, .. }) {
                    n += 1;
                }
            }
            n
        };
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn ring_buffer_trims_to_configured_size() {
        let config = InteractionConfig {
            buffer_cap: 10,
            trim_to: 5,
            ..InteractionConfig::default()
        };
        let (agg, _rx) = aggregator(true, config).await;

        for i in 0..11 {
            agg.record_interaction(InteractionRecord::new(
                InteractionKind::Custom,
                format!("t{i}"),
                0.0,
            ))
            .await;
        }
        let history = agg.history().await;
        assert_eq!(history.len(), 5);
        // Newest survive.
        assert_eq!(history.last().unwrap().target, "t10");
        assert_eq!(history.first().unwrap().target, "t6");
    }

    #[tokio::test]
    async fn no_consent_records_nothing() {
        let (agg, mut rx) = aggregator(false, InteractionConfig::default()).await;
        agg.record_scroll(90).await;
        agg.record_click("cta", Map::new()).await;
        agg.record_search("wardrobe", Some(3)).await;

        assert!(agg.history().await.is_empty());
        assert!(rx.try_recv().is_err());
        let metrics = agg.engagement_metrics().await;
        assert_eq!(metrics.click_count, 0);
        assert_eq!(metrics.bounce_rate, 100);
    }

    #[tokio::test]
    async fn search_lands_in_recent_list() {
        let kv = Arc::new(MemoryStore::new());
        let gate = Arc::new(ConsentGate::new(kv.clone(), ConsentConfig::default()));
        gate.update(ConsentPreferences::allow_all()).await.unwrap();
        let bus = EventBus::new();
        let funnel = Arc::new(FunnelTracker::new(gate.clone(), bus.clone()));
        let store = Arc::new(SessionStore::new(kv, 50, 5));
        let agg = InteractionAggregator::new(
            gate,
            bus,
            funnel,
            store.clone(),
            InteractionConfig::default(),
        );

        agg.record_search("sliding doors", Some(8)).await;
        assert_eq!(store.recent_searches().await, vec!["sliding doors"]);
    }

    #[tokio::test]
    async fn bounce_clears_after_second_sample() {
        let (agg, _rx) = aggregator(true, InteractionConfig::default()).await;
        agg.record_click("nav", Map::new()).await;
        assert_eq!(agg.engagement_metrics().await.bounce_rate, 100);
        agg.record_click("cta", Map::new()).await;
        let metrics = agg.engagement_metrics().await;
        assert_eq!(metrics.bounce_rate, 0);
        assert_eq!(metrics.click_count, 2);
    }
}
