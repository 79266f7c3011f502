//! Top-level engine facade.
//!
//! Owns and wires the bus, the consent gate, the funnel, the cart watcher
//! and the interaction aggregator, plus the two background tasks (sink
//! forwarder and session heartbeat). Hosts construct one `AnalyticsTracker`
//! per visit and call everything through it; shutdown drains the sink
//! before returning.

use std::sync::Arc;

use chrono::Utc;
use clickstream_common::error::Error;
use clickstream_common::models::consent::ConsentPreferences;
use clickstream_common::models::events::{AnalyticsEvent, PageContext};
use clickstream_common::traits::{EventSink, KeyValueStore};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::TrackerConfig;
use crate::consent::ConsentGate;
use crate::eventbus::{forwarder::spawn_sink_forwarder, EventBus};
use crate::services::cart_watcher::CartWatcher;
use crate::services::funnel_service::FunnelTracker;
use crate::services::interaction_service::InteractionAggregator;
use crate::session::SessionStore;
use crate::tasks::heartbeat::spawn_session_heartbeat;

const SINK_BUFFER_SIZE: usize = 512;

pub struct AnalyticsTracker {
    bus: EventBus,
    gate: Arc<ConsentGate>,
    store: Arc<SessionStore>,
    funnel: Arc<FunnelTracker>,
    cart: CartWatcher,
    interactions: InteractionAggregator,
    forwarder: Mutex<Option<JoinHandle<()>>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl AnalyticsTracker {
    /// Wires the whole engine against the given storage and sink, resumes
    /// any persisted cart session and starts the background tasks.
    pub async fn new(
        config: TrackerConfig,
        storage: Arc<dyn KeyValueStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let bus = EventBus::new();
        let gate = Arc::new(ConsentGate::new(storage.clone(), config.consent.clone()));
        let store = Arc::new(SessionStore::new(
            storage,
            config.abandonment.history_cap,
            config.session.recent_search_cap,
        ));
        let funnel = Arc::new(FunnelTracker::new(gate.clone(), bus.clone()));
        let cart = CartWatcher::new(
            gate.clone(),
            bus.clone(),
            store.clone(),
            funnel.clone(),
            config.abandonment.clone(),
            &config.session,
        );
        cart.restore().await;
        let interactions = InteractionAggregator::new(
            gate.clone(),
            bus.clone(),
            funnel.clone(),
            store.clone(),
            config.interaction.clone(),
        );

        let forwarder = spawn_sink_forwarder(&bus, sink, SINK_BUFFER_SIZE).await;
        let heartbeat = spawn_session_heartbeat(
            cart.clone(),
            funnel.clone(),
            config.session.clone(),
            bus.shutdown_rx.clone(),
        );

        info!("analytics tracker started, session {}", funnel.session_id());
        Self {
            bus,
            gate,
            store,
            funnel,
            cart,
            interactions,
            forwarder: Mutex::new(Some(forwarder)),
            heartbeat: Mutex::new(Some(heartbeat)),
        }
    }

    /// Publishes a page view for the context the host supplies and resets
    /// the per-page interaction state.
    pub async fn track_page_view(&self, context: PageContext) {
        if !self.gate.has_analytics_consent().await {
            return;
        }
        self.interactions.reset_page().await;
        self.bus
            .publish(AnalyticsEvent::PageView {
                path: context.path.clone(),
                title: context.title.clone(),
                referrer: context.referrer.clone(),
                device_type: context.device_type().to_string(),
                traffic_source: context.traffic_source().to_string(),
                timestamp: Utc::now(),
            })
            .await;
        self.cart.touch().await;
    }

    /// Stores new preferences. Revoking analytics consent also deletes the
    /// data gathered so far: the persisted session, the recent searches and
    /// every live timer.
    pub async fn update_consent(&self, preferences: ConsentPreferences) -> Result<(), Error> {
        let analytics = preferences.analytics;
        self.gate.update(preferences).await?;
        if !analytics {
            self.purge_tracked_data().await;
        }
        Ok(())
    }

    pub async fn revoke_consent(&self) -> Result<(), Error> {
        self.gate.revoke_all().await?;
        self.purge_tracked_data().await;
        Ok(())
    }

    /// Explicit end of visit: publishes the session-end marker and treats a
    /// non-empty cart as abandoned by navigation.
    pub async fn end_session(&self, last_page: Option<String>) {
        if self.gate.has_analytics_consent().await {
            self.bus
                .publish(AnalyticsEvent::SessionEnd {
                    session_id: self.funnel.session_id(),
                    duration_ms: self.funnel.session_duration_ms(),
                    timestamp: Utc::now(),
                })
                .await;
        }
        self.cart.page_unload(last_page).await;
    }

    /// Presentation-layer hook: a live receiver of every published event.
    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<AnalyticsEvent> {
        self.bus.subscribe(buffer_size).await
    }

    pub fn consent(&self) -> &ConsentGate {
        &self.gate
    }

    pub fn funnel(&self) -> &FunnelTracker {
        &self.funnel
    }

    pub fn cart(&self) -> &CartWatcher {
        &self.cart
    }

    pub fn interactions(&self) -> &InteractionAggregator {
        &self.interactions
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    /// Stops the timers and the background tasks, then awaits the sink
    /// forwarder so queued events are drained before returning.
    pub async fn shutdown(&self) {
        self.cart.shutdown();
        self.bus.shutdown();
        if let Some(handle) = self.heartbeat.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.forwarder.lock().await.take() {
            let _ = handle.await;
        }
        info!("analytics tracker stopped");
    }

    async fn purge_tracked_data(&self) {
        self.cart.shutdown();
        if let Err(e) = self.store.clear().await {
            warn!("failed to clear session on consent revocation: {}", e);
        }
        if let Err(e) = self.store.clear_recent_searches().await {
            warn!("failed to clear searches on consent revocation: {}", e);
        }
        info!("tracked data purged after consent revocation");
    }
}
