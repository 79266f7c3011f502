//! Funnel state machine.
//!
//! One `FunnelTracker` per visit, starting at `Awareness`. The current stage
//! is strictly monotonic: a call that targets the current or an earlier
//! stage is a complete no-op and publishes nothing. Goal conversions carry
//! their configured value and also pull the funnel forward to `Purchase`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clickstream_common::models::events::AnalyticsEvent;
use clickstream_common::models::funnel::{ConversionGoal, FunnelStage};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::consent::ConsentGate;
use crate::eventbus::EventBus;

/// One successful stage transition, kept for presentation-layer inspection.
#[derive(Debug, Clone)]
pub struct FunnelStep {
    pub stage: FunnelStage,
    pub action: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

pub struct FunnelTracker {
    gate: Arc<ConsentGate>,
    bus: EventBus,
    session_id: Uuid,
    started_at: DateTime<Utc>,
    current: RwLock<FunnelStage>,
    steps: RwLock<Vec<FunnelStep>>,
}

impl FunnelTracker {
    pub fn new(gate: Arc<ConsentGate>, bus: EventBus) -> Self {
        Self {
            gate,
            bus,
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            current: RwLock::new(FunnelStage::first()),
            steps: RwLock::new(Vec::new()),
        }
    }

    /// Successful transitions so far, oldest first.
    pub async fn history(&self) -> Vec<FunnelStep> {
        self.steps.read().await.clone()
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub async fn current_stage(&self) -> FunnelStage {
        *self.current.read().await
    }

    pub async fn completion(&self) -> u8 {
        self.current.read().await.completion_percent()
    }

    pub fn session_duration_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }

    /// Moves the funnel to `stage` and publishes a step event. Returns
    /// `false` without publishing when consent is missing or `stage` is not
    /// strictly later than the current one.
    pub async fn advance_to(
        &self,
        stage: FunnelStage,
        action: &str,
        value: f64,
        metadata: Map<String, Value>,
    ) -> bool {
        if !self.gate.has_analytics_consent().await {
            return false;
        }
        {
            let mut current = self.current.write().await;
            if stage.index() <= current.index() {
                return false;
            }
            *current = stage;
        }
        self.steps.write().await.push(FunnelStep {
            stage,
            action: action.to_string(),
            value,
            timestamp: Utc::now(),
        });
        debug!("funnel advanced to {} via {}", stage.as_str(), action);
        self.bus
            .publish(AnalyticsEvent::FunnelStep {
                stage,
                action: action.to_string(),
                value,
                metadata,
                session_id: self.session_id,
                timestamp: Utc::now(),
            })
            .await;
        true
    }

    /// Publishes a conversion for `goal` and pulls the funnel to `Purchase`.
    pub async fn track_goal(&self, goal: ConversionGoal, metadata: Map<String, Value>) {
        if !self.gate.has_analytics_consent().await {
            return;
        }
        let value = goal.default_value();
        let completion = self.completion().await;
        self.bus
            .publish(AnalyticsEvent::Conversion {
                goal,
                value,
                conversion_type: goal.conversion_type().to_string(),
                funnel_completion: completion,
                time_to_conversion_ms: self.session_duration_ms(),
                metadata,
                timestamp: Utc::now(),
            })
            .await;
        let action = format!("goal_{}", goal.as_str());
        self.advance_to(FunnelStage::Purchase, &action, value, Map::new())
            .await;
    }

    /// Publishes a funnel-abandonment marker. The current stage is left
    /// untouched so a later recovery can still advance past it.
    pub async fn note_abandonment(&self, stage: FunnelStage, reason: &str) {
        if !self.gate.has_analytics_consent().await {
            return;
        }
        self.bus
            .publish(AnalyticsEvent::FunnelAbandonment {
                stage,
                reason: reason.to_string(),
                elapsed_ms: self.session_duration_ms(),
                timestamp: Utc::now(),
            })
            .await;
    }
}
