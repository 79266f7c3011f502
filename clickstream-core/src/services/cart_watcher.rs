//! Cart session lifecycle and abandonment detection.
//!
//! Exactly one session is live at a time, created lazily on the first cart
//! mutation and persisted after every mutation. Each activity re-arms a
//! single per-session inactivity timer whose duration depends on the
//! checkout stage; when it fires the session is marked abandoned, exactly
//! once, and an abandonment record is emitted and appended to the persisted
//! history.

use std::sync::Arc;

use chrono::Utc;
use clickstream_common::models::events::AnalyticsEvent;
use clickstream_common::models::funnel::FunnelStage;
use clickstream_common::models::session::{
    AbandonReason, AbandonmentRecord, AbandonmentSummary, CartEventKind, CartLineItem,
    CartSession, CheckoutStage,
};
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AbandonmentConfig, SessionConfig};
use crate::consent::ConsentGate;
use crate::eventbus::EventBus;
use crate::services::funnel_service::FunnelTracker;
use crate::session::SessionStore;

/// Cheaply cloneable handle; all state lives behind the inner `Arc` so
/// timer tasks can hold their own handle.
#[derive(Clone)]
pub struct CartWatcher {
    inner: Arc<CartWatcherInner>,
}

struct CartWatcherInner {
    gate: Arc<ConsentGate>,
    bus: EventBus,
    store: Arc<SessionStore>,
    funnel: Arc<FunnelTracker>,
    config: AbandonmentConfig,
    event_log_cap: usize,
    session: Mutex<Option<CartSession>>,
    // At most one live timer per session; arming aborts the previous one.
    timers: DashMap<Uuid, JoinHandle<()>>,
}

impl CartWatcher {
    pub fn new(
        gate: Arc<ConsentGate>,
        bus: EventBus,
        store: Arc<SessionStore>,
        funnel: Arc<FunnelTracker>,
        config: AbandonmentConfig,
        session_config: &SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CartWatcherInner {
                gate,
                bus,
                store,
                funnel,
                config,
                event_log_cap: session_config.event_log_cap,
                session: Mutex::new(None),
                timers: DashMap::new(),
            }),
        }
    }

    /// Resumes the persisted session, if one exists and was not already
    /// abandoned. Re-arms the inactivity timer for its stage.
    pub async fn restore(&self) {
        if !self.inner.gate.has_analytics_consent().await {
            return;
        }
        let Some(session) = self.inner.store.load().await else {
            return;
        };
        if session.is_abandoned {
            debug!("persisted session {} was abandoned, not resuming", session.session_id);
            return;
        }
        info!("resuming cart session {}", session.session_id);
        let (id, stage) = (session.session_id, session.stage);
        *self.inner.session.lock().await = Some(session);
        self.arm_timer(id, stage);
    }

    /// Starts a fresh session explicitly. Cart mutations also create one
    /// lazily, so most callers never need this.
    pub async fn start_session(&self, user_id: Option<String>) -> Option<Uuid> {
        if !self.inner.gate.has_analytics_consent().await {
            return None;
        }
        let mut guard = self.inner.session.lock().await;
        let session = self.create_session(&mut guard, user_id).await;
        Some(session)
    }

    /// Adds an item, merging quantities when the id is already in the cart.
    pub async fn add_item(&self, item: CartLineItem) {
        if !self.inner.gate.has_analytics_consent().await {
            return;
        }
        let mut guard = self.inner.session.lock().await;
        if guard.is_none() {
            self.create_session(&mut guard, None).await;
        }
        let Some(session) = guard.as_mut() else {
            return;
        };

        match session.items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => existing.quantity += item.quantity,
            None => session.items.push(item.clone()),
        }
        session.value = session.cart_value();
        session.touch();
        session.push_event(
            CartEventKind::AddItem,
            json!({ "item_id": item.id, "name": item.name, "price": item.price, "quantity": item.quantity }),
            self.inner.event_log_cap,
        );
        let (id, stage, value, count) = snapshot(session);
        self.persist(session).await;
        drop(guard);

        self.publish_cart_event(CartEventKind::AddItem, id, value, count, Map::new())
            .await;
        self.inner
            .funnel
            .advance_to(
                FunnelStage::Consideration,
                "add_to_cart",
                value,
                Map::new(),
            )
            .await;
        self.arm_timer(id, stage);
    }

    /// Removes a line item entirely. Emptying the cart this way counts as
    /// an abandonment.
    pub async fn remove_item(&self, item_id: &str) {
        if !self.inner.gate.has_analytics_consent().await {
            return;
        }
        let mut guard = self.inner.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return;
        };
        let before = session.items.len();
        session.items.retain(|i| i.id != item_id);
        if session.items.len() == before {
            return;
        }
        session.value = session.cart_value();
        session.touch();
        session.push_event(
            CartEventKind::RemoveItem,
            json!({ "item_id": item_id }),
            self.inner.event_log_cap,
        );
        let (id, stage, value, count) = snapshot(session);
        let emptied = session.items.is_empty();
        self.persist(session).await;
        drop(guard);

        self.publish_cart_event(CartEventKind::RemoveItem, id, value, count, Map::new())
            .await;
        if emptied {
            self.mark_abandoned(AbandonReason::CartEmptied, None).await;
        } else {
            self.arm_timer(id, stage);
        }
    }

    /// Replaces the whole item list, e.g. after a quantity edit in the cart
    /// UI. Publishes a value-change event carrying old and new totals.
    pub async fn update_items(&self, items: Vec<CartLineItem>) {
        if !self.inner.gate.has_analytics_consent().await {
            return;
        }
        let mut guard = self.inner.session.lock().await;
        if guard.is_none() {
            self.create_session(&mut guard, None).await;
        }
        let Some(session) = guard.as_mut() else {
            return;
        };

        let old_value = session.value;
        session.items = items;
        session.value = session.cart_value();
        session.touch();
        session.push_event(
            CartEventKind::ValueChange,
            json!({ "old_value": old_value, "new_value": session.value }),
            self.inner.event_log_cap,
        );
        let (id, stage, value, count) = snapshot(session);
        self.persist(session).await;
        drop(guard);

        let mut data = Map::new();
        data.insert("old_value".to_string(), json!(old_value));
        self.publish_cart_event(CartEventKind::ValueChange, id, value, count, data)
            .await;
        self.arm_timer(id, stage);
    }

    /// Moves the session into a later checkout stage, re-arming the timer
    /// with that stage's (shorter) timeout and pulling the funnel along.
    pub async fn progress_stage(&self, stage: CheckoutStage) {
        if !self.inner.gate.has_analytics_consent().await {
            return;
        }
        let mut guard = self.inner.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return;
        };
        session.stage = stage;
        session.touch();
        session.push_event(
            CartEventKind::StageProgression,
            json!({ "stage": stage.as_str() }),
            self.inner.event_log_cap,
        );
        let (id, _, value, count) = snapshot(session);
        self.persist(session).await;
        drop(guard);

        let mut data = Map::new();
        data.insert("stage".to_string(), json!(stage.as_str()));
        self.publish_cart_event(CartEventKind::StageProgression, id, value, count, data)
            .await;
        let action = format!("checkout_{}", stage.as_str());
        self.inner
            .funnel
            .advance_to(stage.funnel_stage(), &action, value, Map::new())
            .await;
        self.arm_timer(id, stage);
    }

    /// Any user activity: refreshes `last_activity` and re-arms the timer.
    pub async fn touch(&self) {
        if !self.inner.gate.has_analytics_consent().await {
            return;
        }
        let mut guard = self.inner.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return;
        };
        session.touch();
        let (id, stage, ..) = snapshot(session);
        self.persist(session).await;
        drop(guard);
        self.arm_timer(id, stage);
    }

    /// Periodic save from the heartbeat task. Unlike `touch` this does NOT
    /// re-arm the timer: a heartbeat is not user activity, and letting it
    /// reset the countdown would make timeouts unreachable.
    pub async fn heartbeat(&self) {
        let mut guard = self.inner.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return;
        };
        session.touch();
        self.persist(session).await;
    }

    pub async fn page_hidden(&self) {
        self.log_visibility(CartEventKind::PageHidden, false).await;
    }

    pub async fn page_visible(&self) {
        self.log_visibility(CartEventKind::PageVisible, true).await;
    }

    /// The host is about to navigate away. A live cart with items counts as
    /// an abandonment.
    pub async fn page_unload(&self, page: Option<String>) {
        let has_items = {
            let guard = self.inner.session.lock().await;
            guard
                .as_ref()
                .map(|s| !s.is_abandoned && !s.items.is_empty())
                .unwrap_or(false)
        };
        if has_items {
            self.mark_abandoned_on(AbandonReason::PageUnload, None, page)
                .await;
        }
    }

    /// Order placed. The timer is disarmed before anything else so it can
    /// never fire on a completed checkout.
    pub async fn complete_checkout(&self, order_id: Option<String>) {
        if !self.inner.gate.has_analytics_consent().await {
            return;
        }
        let mut guard = self.inner.session.lock().await;
        let Some(mut session) = guard.take() else {
            return;
        };
        self.disarm_timer(session.session_id);

        session.push_event(
            CartEventKind::CheckoutComplete,
            json!({ "order_id": &order_id }),
            self.inner.event_log_cap,
        );
        let (id, _, value, count) = snapshot(&session);
        if let Err(e) = self.inner.store.clear().await {
            warn!("failed to clear completed session: {}", e);
        }
        drop(guard);

        let mut data = Map::new();
        if let Some(order_id) = order_id {
            data.insert("order_id".to_string(), json!(order_id));
        }
        self.publish_cart_event(CartEventKind::CheckoutComplete, id, value, count, data)
            .await;
        self.inner
            .funnel
            .advance_to(
                FunnelStage::Purchase,
                "checkout_complete",
                value,
                Map::new(),
            )
            .await;
        info!("checkout complete for session {}, value {:.2}", id, value);
    }

    /// Marks the live session abandoned. Idempotent: a session already
    /// abandoned, or no session at all, is a no-op.
    pub async fn mark_abandoned(&self, reason: AbandonReason, expected_session: Option<Uuid>) {
        self.mark_abandoned_on(reason, expected_session, None).await;
    }

    async fn mark_abandoned_on(
        &self,
        reason: AbandonReason,
        expected_session: Option<Uuid>,
        page_exited_from: Option<String>,
    ) {
        if !self.inner.gate.has_analytics_consent().await {
            return;
        }
        let record = {
            let mut guard = self.inner.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return;
            };
            if session.is_abandoned {
                return;
            }
            // A stale timer for a superseded session must not fire.
            if let Some(expected) = expected_session {
                if session.session_id != expected {
                    return;
                }
            }
            session.is_abandoned = true;
            session.push_event(
                CartEventKind::Abandonment,
                json!({ "reason": reason.as_str() }),
                self.inner.event_log_cap,
            );
            let record = AbandonmentRecord {
                session_id: session.session_id,
                user_id: session.user_id.clone(),
                abandoned_at: Utc::now(),
                stage: session.stage,
                reason,
                cart_value: session.value,
                item_count: session.item_count(),
                items: session.items.clone(),
                time_in_cart_ms: (Utc::now() - session.started_at).num_milliseconds(),
                page_exited_from,
                previous_actions: session.events.iter().map(|e| e.kind).collect(),
                recovery_opportunity: session.value > self.inner.config.recovery_value_threshold,
            };
            self.persist(session).await;
            record
        };

        if let Err(e) = self.inner.store.append_abandonment(&record).await {
            warn!("failed to append abandonment record: {}", e);
        }
        info!(
            "cart session {} abandoned at {} ({}), value {:.2}",
            record.session_id,
            record.stage.as_str(),
            record.reason.as_str(),
            record.cart_value
        );
        self.inner
            .funnel
            .note_abandonment(record.stage.funnel_stage(), record.reason.as_str())
            .await;
        let session_id = record.session_id;
        self.inner
            .bus
            .publish(AnalyticsEvent::CartAbandonment(record))
            .await;
        // Last: when the inactivity timer itself brought us here, aborting
        // its handle cancels the current task at its next await point.
        self.disarm_timer(session_id);
    }

    /// Records a recovery attempt (email link click, reminder dismissal and
    /// so on). A successful one revives the session and re-arms its timer.
    pub async fn record_recovery_attempt(&self, method: &str, success: bool) {
        if !self.inner.gate.has_analytics_consent().await {
            return;
        }
        let mut guard = self.inner.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return;
        };
        session.recovery_attempts += 1;
        if success {
            session.is_abandoned = false;
            session.touch();
        }
        session.push_event(
            CartEventKind::RecoveryAttempt,
            json!({ "method": method, "success": success }),
            self.inner.event_log_cap,
        );
        let (id, stage, value, _) = snapshot(session);
        let attempt = session.recovery_attempts;
        self.persist(session).await;
        drop(guard);

        self.inner
            .bus
            .publish(AnalyticsEvent::CartRecovery {
                session_id: id,
                method: method.to_string(),
                success,
                attempt_number: attempt,
                cart_value: value,
                timestamp: Utc::now(),
            })
            .await;
        if success {
            self.arm_timer(id, stage);
        }
    }

    /// Aggregate view over the persisted abandonment history.
    pub async fn summary(&self) -> AbandonmentSummary {
        let history = self.inner.store.abandonment_history().await;
        AbandonmentSummary::from_records(&history)
    }

    pub async fn current_session(&self) -> Option<CartSession> {
        self.inner.session.lock().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| !s.is_abandoned)
            .unwrap_or(false)
    }

    /// Aborts every live timer. Call on engine shutdown.
    pub fn shutdown(&self) {
        for entry in self.inner.timers.iter() {
            entry.value().abort();
        }
        self.inner.timers.clear();
    }

    async fn create_session(
        &self,
        guard: &mut Option<CartSession>,
        user_id: Option<String>,
    ) -> Uuid {
        let mut session = CartSession::new(user_id);
        session.push_event(CartEventKind::SessionStart, Value::Null, self.inner.event_log_cap);
        let id = session.session_id;
        self.persist(&session).await;
        *guard = Some(session);
        debug!("cart session {} started", id);
        self.publish_cart_event(CartEventKind::SessionStart, id, 0.0, 0, Map::new())
            .await;
        self.arm_timer(id, CheckoutStage::CartPage);
        id
    }

    async fn log_visibility(&self, kind: CartEventKind, rearm: bool) {
        if !self.inner.gate.has_analytics_consent().await {
            return;
        }
        let mut guard = self.inner.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return;
        };
        session.push_event(kind, Value::Null, self.inner.event_log_cap);
        let (id, stage, value, count) = snapshot(session);
        self.persist(session).await;
        drop(guard);

        self.publish_cart_event(kind, id, value, count, Map::new()).await;
        if rearm {
            self.arm_timer(id, stage);
        }
    }

    async fn persist(&self, session: &CartSession) {
        if let Err(e) = self.inner.store.save(session).await {
            warn!("failed to persist cart session: {}", e);
        }
    }

    async fn publish_cart_event(
        &self,
        kind: CartEventKind,
        session_id: Uuid,
        cart_value: f64,
        item_count: usize,
        data: Map<String, Value>,
    ) {
        self.inner
            .bus
            .publish(AnalyticsEvent::Cart {
                kind,
                session_id,
                cart_value,
                item_count,
                data,
                timestamp: Utc::now(),
            })
            .await;
    }

    /// Replaces the session's inactivity timer with a fresh one for the
    /// current stage's timeout.
    fn arm_timer(&self, session_id: Uuid, stage: CheckoutStage) {
        let timeout = self.inner.config.timeout_for(stage);
        let watcher = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            watcher
                .mark_abandoned(AbandonReason::Timeout, Some(session_id))
                .await;
        });
        if let Some(previous) = self.inner.timers.insert(session_id, handle) {
            previous.abort();
        }
    }

    fn disarm_timer(&self, session_id: Uuid) {
        if let Some((_, handle)) = self.inner.timers.remove(&session_id) {
            handle.abort();
        }
    }
}

fn snapshot(session: &CartSession) -> (Uuid, CheckoutStage, f64, usize) {
    (
        session.session_id,
        session.stage,
        session.value,
        session.item_count(),
    )
}
