//! src/models/events.rs
//!
//! The closed set of events the engine can emit. Every tracked action maps
//! to exactly one variant carrying only the fields relevant to it; the sink
//! receives the pair (`event_type()`, `params()`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::funnel::{ConversionGoal, FunnelStage};
use super::interaction::InteractionRecord;
use super::session::{AbandonmentRecord, CartEventKind};

/// Snapshot of the page the host passes into tracking calls, instead of the
/// engine reading `window`/`document` style globals itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    pub path: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub viewport_width: Option<u32>,
}

impl PageContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn device_type(&self) -> &'static str {
        match self.viewport_width {
            Some(w) if w <= 768 => "mobile",
            Some(w) if w <= 1024 => "tablet",
            Some(_) => "desktop",
            None => "unknown",
        }
    }

    pub fn traffic_source(&self) -> &'static str {
        match self.referrer.as_deref() {
            None | Some("") => "direct",
            Some(r) if r.contains("google.") => "google",
            Some(r) if r.contains("facebook.") => "facebook",
            Some(_) => "referral",
        }
    }
}

/// Everything the engine can publish to the bus or push to the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    PageView {
        path: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        referrer: Option<String>,
        device_type: String,
        traffic_source: String,
        timestamp: DateTime<Utc>,
    },
    FunnelStep {
        stage: FunnelStage,
        action: String,
        value: f64,
        #[serde(default)]
        metadata: Map<String, Value>,
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    FunnelAbandonment {
        stage: FunnelStage,
        reason: String,
        elapsed_ms: i64,
        timestamp: DateTime<Utc>,
    },
    Conversion {
        goal: ConversionGoal,
        value: f64,
        conversion_type: String,
        funnel_completion: u8,
        time_to_conversion_ms: i64,
        #[serde(default)]
        metadata: Map<String, Value>,
        timestamp: DateTime<Utc>,
    },
    Cart {
        kind: CartEventKind,
        session_id: Uuid,
        cart_value: f64,
        item_count: usize,
        #[serde(default)]
        data: Map<String, Value>,
        timestamp: DateTime<Utc>,
    },
    CartAbandonment(AbandonmentRecord),
    CartRecovery {
        session_id: Uuid,
        method: String,
        success: bool,
        attempt_number: u32,
        cart_value: f64,
        timestamp: DateTime<Utc>,
    },
    Interaction(InteractionRecord),
    ScrollMilestone {
        percent: u8,
        max_depth: u8,
        timestamp: DateTime<Utc>,
    },
    Search {
        term: String,
        #[serde(default)]
        results: Option<u32>,
        timestamp: DateTime<Utc>,
    },
    SessionEnd {
        session_id: Uuid,
        duration_ms: i64,
        timestamp: DateTime<Utc>,
    },
}

impl AnalyticsEvent {
    /// Wire name of the event, GA-style snake_case.
    pub fn event_type(&self) -> &'static str {
        match self {
            AnalyticsEvent::PageView { .. } => "page_view",
            AnalyticsEvent::FunnelStep { .. } => "funnel_step",
            AnalyticsEvent::FunnelAbandonment { .. } => "funnel_abandonment",
            AnalyticsEvent::Conversion { .. } => "conversion",
            AnalyticsEvent::Cart { kind, .. } => match kind {
                CartEventKind::SessionStart => "cart_session_start",
                CartEventKind::AddItem => "add_to_cart",
                CartEventKind::RemoveItem => "remove_from_cart",
                CartEventKind::ValueChange => "cart_value_change",
                CartEventKind::StageProgression => "checkout_progress",
                CartEventKind::CheckoutComplete => "purchase",
                CartEventKind::Abandonment => "cart_abandonment",
                CartEventKind::RecoveryAttempt => "cart_recovery_attempt",
                CartEventKind::PageHidden => "page_hidden",
                CartEventKind::PageVisible => "page_visible",
            },
            AnalyticsEvent::CartAbandonment(_) => "cart_abandonment",
            AnalyticsEvent::CartRecovery { .. } => "cart_recovery_attempt",
            AnalyticsEvent::Interaction(_) => "user_interaction",
            AnalyticsEvent::ScrollMilestone { .. } => "scroll_milestone",
            AnalyticsEvent::Search { .. } => "search",
            AnalyticsEvent::SessionEnd { .. } => "session_end",
        }
    }

    /// Flat parameter map for the sink, i.e. everything but the tag.
    pub fn params(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => {
                map.remove("type");
                map
            }
            _ => Map::new(),
        }
    }
}
