//! Cart session entity and abandonment records.
//!
//! Exactly one session is live per client at a time. It is created lazily on
//! the first cart mutation, persisted after every mutation so a reload can
//! resume it, and cleared on checkout completion or explicit end.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::funnel::FunnelStage;

/// One line in the cart. Supplied by the catalog/cart module; the analytics
/// layer treats it as opaque and never validates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLineItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub price: f64,
    pub quantity: u32,
    #[serde(default)]
    pub brand: Option<String>,
}

impl CartLineItem {
    pub fn line_total(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

/// Checkout sub-stages, ordered from cart to payment. The abandonment
/// timeout shrinks the closer the user is to paying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStage {
    CartPage,
    ShippingInfo,
    PaymentInfo,
    ReviewOrder,
    PaymentProcessing,
}

impl CheckoutStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStage::CartPage => "cart_page",
            CheckoutStage::ShippingInfo => "shipping_info",
            CheckoutStage::PaymentInfo => "payment_info",
            CheckoutStage::ReviewOrder => "review_order",
            CheckoutStage::PaymentProcessing => "payment_processing",
        }
    }

    /// Where this checkout stage sits in the marketing funnel.
    pub fn funnel_stage(&self) -> FunnelStage {
        match self {
            CheckoutStage::CartPage => FunnelStage::Consideration,
            CheckoutStage::ShippingInfo => FunnelStage::Intent,
            CheckoutStage::PaymentInfo => FunnelStage::Evaluation,
            CheckoutStage::ReviewOrder => FunnelStage::Evaluation,
            CheckoutStage::PaymentProcessing => FunnelStage::Purchase,
        }
    }
}

/// What happened to the session, for the bounded in-session event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartEventKind {
    SessionStart,
    AddItem,
    RemoveItem,
    ValueChange,
    StageProgression,
    CheckoutComplete,
    Abandonment,
    RecoveryAttempt,
    PageHidden,
    PageVisible,
}

impl CartEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartEventKind::SessionStart => "session_start",
            CartEventKind::AddItem => "add_item",
            CartEventKind::RemoveItem => "remove_item",
            CartEventKind::ValueChange => "value_change",
            CartEventKind::StageProgression => "stage_progression",
            CartEventKind::CheckoutComplete => "checkout_complete",
            CartEventKind::Abandonment => "abandonment",
            CartEventKind::RecoveryAttempt => "recovery_attempt",
            CartEventKind::PageHidden => "page_hidden",
            CartEventKind::PageVisible => "page_visible",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartEventRecord {
    pub kind: CartEventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

/// The one mutable session record per visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartSession {
    pub session_id: Uuid,
    #[serde(default)]
    pub user_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<CartLineItem>,
    #[serde(default)]
    pub value: f64,
    pub stage: CheckoutStage,
    #[serde(default)]
    pub events: Vec<CartEventRecord>,
    #[serde(default)]
    pub recovery_attempts: u32,
    #[serde(default)]
    pub is_abandoned: bool,
}

impl CartSession {
    pub fn new(user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            started_at: now,
            last_activity: now,
            items: Vec::new(),
            value: 0.0,
            stage: CheckoutStage::CartPage,
            events: Vec::new(),
            recovery_attempts: 0,
            is_abandoned: false,
        }
    }

    /// Number of distinct line items (not the summed quantity).
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn cart_value(&self) -> f64 {
        self.items.iter().map(CartLineItem::line_total).sum()
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Appends to the event log, keeping only the newest `cap` entries.
    pub fn push_event(&mut self, kind: CartEventKind, data: Value, cap: usize) {
        self.events.push(CartEventRecord {
            kind,
            timestamp: Utc::now(),
            data,
        });
        if self.events.len() > cap {
            let overflow = self.events.len() - cap;
            self.events.drain(..overflow);
        }
    }
}

/// Why the session was marked abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonReason {
    Timeout,
    CartEmptied,
    PageUnload,
    Manual,
}

impl AbandonReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbandonReason::Timeout => "timeout",
            AbandonReason::CartEmptied => "cart_emptied",
            AbandonReason::PageUnload => "page_unload",
            AbandonReason::Manual => "manual",
        }
    }
}

/// Emitted exactly once per abandonment cycle; also appended to the
/// persisted abandonment history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbandonmentRecord {
    pub session_id: Uuid,
    #[serde(default)]
    pub user_id: Option<String>,
    pub abandoned_at: DateTime<Utc>,
    pub stage: CheckoutStage,
    pub reason: AbandonReason,
    pub cart_value: f64,
    pub item_count: usize,
    pub items: Vec<CartLineItem>,
    pub time_in_cart_ms: i64,
    #[serde(default)]
    pub page_exited_from: Option<String>,
    #[serde(default)]
    pub previous_actions: Vec<CartEventKind>,
    pub recovery_opportunity: bool,
}

/// Aggregate view over the persisted abandonment history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AbandonmentSummary {
    pub total_abandonments: usize,
    pub average_cart_value: f64,
    pub most_common_stage: Option<CheckoutStage>,
    pub average_time_in_cart_secs: i64,
    pub recovery_opportunities: usize,
    pub stage_breakdown: HashMap<String, usize>,
}

impl AbandonmentSummary {
    pub fn from_records(records: &[AbandonmentRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }
        let total = records.len();
        let value_sum: f64 = records.iter().map(|r| r.cart_value).sum();
        let time_sum: i64 = records.iter().map(|r| r.time_in_cart_ms).sum();

        let mut breakdown: HashMap<String, usize> = HashMap::new();
        for r in records {
            *breakdown.entry(r.stage.as_str().to_string()).or_insert(0) += 1;
        }
        let most_common = records
            .iter()
            .map(|r| r.stage)
            .max_by_key(|stage| breakdown.get(stage.as_str()).copied().unwrap_or(0));

        Self {
            total_abandonments: total,
            average_cart_value: (value_sum / total as f64 * 100.0).round() / 100.0,
            most_common_stage: most_common,
            average_time_in_cart_secs: time_sum / total as i64 / 1000,
            recovery_opportunities: records.iter().filter(|r| r.recovery_opportunity).count(),
            stage_breakdown: breakdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: &str, price: f64, quantity: u32) -> CartLineItem {
        CartLineItem {
            id: id.to_string(),
            name: id.to_uppercase(),
            category: "closet".to_string(),
            price,
            quantity,
            brand: None,
        }
    }

    #[test]
    fn cart_value_sums_line_totals() {
        let mut session = CartSession::new(None);
        session.items.push(item("sku1", 100.0, 1));
        session.items.push(item("sku2", 50.0, 2));
        assert_eq!(session.cart_value(), 200.0);
        assert_eq!(session.item_count(), 2);
    }

    #[test]
    fn event_log_keeps_newest() {
        let mut session = CartSession::new(None);
        for i in 0..10 {
            session.push_event(CartEventKind::AddItem, json!({ "i": i }), 4);
        }
        assert_eq!(session.events.len(), 4);
        assert_eq!(session.events.last().unwrap().data["i"], 9);
        assert_eq!(session.events.first().unwrap().data["i"], 6);
    }

    #[test]
    fn summary_breaks_down_stages() {
        let base = CartSession::new(None);
        let record = |stage: CheckoutStage, value: f64| AbandonmentRecord {
            session_id: base.session_id,
            user_id: None,
            abandoned_at: Utc::now(),
            stage,
            reason: AbandonReason::Timeout,
            cart_value: value,
            item_count: 1,
            items: vec![],
            time_in_cart_ms: 60_000,
            page_exited_from: None,
            previous_actions: vec![],
            recovery_opportunity: value > 50.0,
        };
        let records = vec![
            record(CheckoutStage::CartPage, 120.0),
            record(CheckoutStage::CartPage, 30.0),
            record(CheckoutStage::PaymentInfo, 90.0),
        ];
        let summary = AbandonmentSummary::from_records(&records);
        assert_eq!(summary.total_abandonments, 3);
        assert_eq!(summary.most_common_stage, Some(CheckoutStage::CartPage));
        assert_eq!(summary.recovery_opportunities, 2);
        assert_eq!(summary.average_cart_value, 80.0);
        assert_eq!(summary.average_time_in_cart_secs, 60);
    }
}
