//! Engine configuration.
//!
//! Every business constant (timeout table, recovery threshold, buffer caps,
//! retention window) lives here as a serde default, so deployments can
//! override any of them from a JSON config blob without code changes.

use std::time::Duration;

use clickstream_common::models::session::CheckoutStage;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub consent: ConsentConfig,
    #[serde(default)]
    pub abandonment: AbandonmentConfig,
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsentConfig {
    /// How long a stored consent record is honored, in days.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_retention_days() -> i64 {
    365
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

impl ConsentConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }
}

/// Stage timeout table, shortest at the stage closest to payment.
#[derive(Debug, Clone, Deserialize)]
pub struct AbandonmentConfig {
    #[serde(default = "default_cart_page_secs")]
    pub cart_page_secs: u64,
    #[serde(default = "default_shipping_info_secs")]
    pub shipping_info_secs: u64,
    #[serde(default = "default_payment_info_secs")]
    pub payment_info_secs: u64,
    #[serde(default = "default_review_order_secs")]
    pub review_order_secs: u64,
    #[serde(default = "default_payment_processing_secs")]
    pub payment_processing_secs: u64,
    /// Minimum cart value (currency units) that makes an abandoned cart
    /// worth a recovery attempt.
    #[serde(default = "default_recovery_value_threshold")]
    pub recovery_value_threshold: f64,
    /// Newest-N cap on the persisted abandonment history.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_cart_page_secs() -> u64 {
    30 * 60
}
fn default_shipping_info_secs() -> u64 {
    15 * 60
}
fn default_payment_info_secs() -> u64 {
    10 * 60
}
fn default_review_order_secs() -> u64 {
    5 * 60
}
fn default_payment_processing_secs() -> u64 {
    2 * 60
}
fn default_recovery_value_threshold() -> f64 {
    50.0
}
fn default_history_cap() -> usize {
    50
}

impl Default for AbandonmentConfig {
    fn default() -> Self {
        Self {
            cart_page_secs: default_cart_page_secs(),
            shipping_info_secs: default_shipping_info_secs(),
            payment_info_secs: default_payment_info_secs(),
            review_order_secs: default_review_order_secs(),
            payment_processing_secs: default_payment_processing_secs(),
            recovery_value_threshold: default_recovery_value_threshold(),
            history_cap: default_history_cap(),
        }
    }
}

impl AbandonmentConfig {
    pub fn timeout_for(&self, stage: CheckoutStage) -> Duration {
        let secs = match stage {
            CheckoutStage::CartPage => self.cart_page_secs,
            CheckoutStage::ShippingInfo => self.shipping_info_secs,
            CheckoutStage::PaymentInfo => self.payment_info_secs,
            CheckoutStage::ReviewOrder => self.review_order_secs,
            CheckoutStage::PaymentProcessing => self.payment_processing_secs,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractionConfig {
    /// Ring buffer cap; when exceeded the buffer is trimmed to `trim_to`.
    #[serde(default = "default_buffer_cap")]
    pub buffer_cap: usize,
    #[serde(default = "default_trim_to")]
    pub trim_to: usize,
    /// Scroll-depth thresholds that each fire exactly once, ascending.
    #[serde(default = "default_scroll_milestones")]
    pub scroll_milestones: Vec<u8>,
}

fn default_buffer_cap() -> usize {
    1000
}
fn default_trim_to() -> usize {
    500
}
fn default_scroll_milestones() -> Vec<u8> {
    vec![25, 50, 75, 90, 100]
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            buffer_cap: default_buffer_cap(),
            trim_to: default_trim_to(),
            scroll_milestones: default_scroll_milestones(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Newest-N cap on the in-session event log.
    #[serde(default = "default_event_log_cap")]
    pub event_log_cap: usize,
    /// Interval of the activity heartbeat task.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_recent_search_cap")]
    pub recent_search_cap: usize,
    /// Time-on-page after which the funnel counts the visit as engaged /
    /// deeply engaged.
    #[serde(default = "default_engaged_after_secs")]
    pub engaged_after_secs: u64,
    #[serde(default = "default_deep_engaged_after_secs")]
    pub deep_engaged_after_secs: u64,
}

fn default_event_log_cap() -> usize {
    100
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_recent_search_cap() -> usize {
    5
}
fn default_engaged_after_secs() -> u64 {
    30
}
fn default_deep_engaged_after_secs() -> u64 {
    120
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_log_cap: default_event_log_cap(),
            heartbeat_secs: default_heartbeat_secs(),
            recent_search_cap: default_recent_search_cap(),
            engaged_after_secs: default_engaged_after_secs(),
            deep_engaged_after_secs: default_deep_engaged_after_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_the_documented_constants() {
        let cfg = TrackerConfig::default();
        assert_eq!(
            cfg.abandonment.timeout_for(CheckoutStage::CartPage),
            Duration::from_secs(1800)
        );
        assert_eq!(
            cfg.abandonment.timeout_for(CheckoutStage::PaymentProcessing),
            Duration::from_secs(120)
        );
        assert_eq!(cfg.abandonment.recovery_value_threshold, 50.0);
        assert_eq!(cfg.interaction.scroll_milestones, vec![25, 50, 75, 90, 100]);
        assert_eq!(cfg.consent.retention_days, 365);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: TrackerConfig =
            serde_json::from_str(r#"{ "abandonment": { "cart_page_secs": 60 } }"#).unwrap();
        assert_eq!(
            cfg.abandonment.timeout_for(CheckoutStage::CartPage),
            Duration::from_secs(60)
        );
        assert_eq!(
            cfg.abandonment.timeout_for(CheckoutStage::ShippingInfo),
            Duration::from_secs(900)
        );
        assert_eq!(cfg.session.recent_search_cap, 5);
    }
}
