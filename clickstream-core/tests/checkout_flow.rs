//! End-to-end engine tests through the `AnalyticsTracker` facade: a full
//! checkout journey, a timed-out abandonment, consent gating at the sink,
//! and session resumption from file-backed storage.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clickstream_common::models::consent::ConsentPreferences;
use clickstream_common::models::events::{AnalyticsEvent, PageContext};
use clickstream_common::models::funnel::FunnelStage;
use clickstream_common::models::session::{AbandonReason, CartLineItem, CheckoutStage};
use clickstream_common::traits::EventSink;
use clickstream_core::sinks::NullSink;
use clickstream_core::storage::{JsonFileStore, MemoryStore};
use clickstream_core::{AnalyticsTracker, TrackerConfig};

struct CollectingSink {
    seen: Mutex<Vec<AnalyticsEvent>>,
}

impl CollectingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(vec![]),
        })
    }

    fn event_types(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type().to_string())
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn emit(&self, event: &AnalyticsEvent) {
        self.seen.lock().unwrap().push(event.clone());
    }
}

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

async fn consented_tracker(sink: Arc<dyn EventSink>) -> AnalyticsTracker {
    let tracker =
        AnalyticsTracker::new(TrackerConfig::default(), Arc::new(MemoryStore::new()), sink).await;
    tracker
        .update_consent(ConsentPreferences::allow_all())
        .await
        .unwrap();
    tracker
}

#[tokio::test]
async fn full_checkout_journey() {
    let sink = CollectingSink::new();
    let tracker = consented_tracker(sink.clone()).await;

    tracker
        .track_page_view(PageContext::new("/wardrobes"))
        .await;
    tracker.cart().add_item(item("sku1", 100.0, 1)).await;
    tracker.cart().add_item(item("sku2", 50.0, 2)).await;

    let session = tracker.cart().current_session().await.unwrap();
    assert_eq!(session.value, 200.0);
    assert_eq!(session.item_count(), 2);

    tracker
        .cart()
        .progress_stage(CheckoutStage::ShippingInfo)
        .await;
    tracker
        .cart()
        .progress_stage(CheckoutStage::PaymentInfo)
        .await;
    tracker
        .cart()
        .progress_stage(CheckoutStage::PaymentProcessing)
        .await;
    tracker
        .cart()
        .complete_checkout(Some("order-42".to_string()))
        .await;

    assert_eq!(tracker.funnel().current_stage().await, FunnelStage::Purchase);
    assert!(tracker.cart().current_session().await.is_none());

    tracker.shutdown().await;
    let types = sink.event_types();
    assert!(types.contains(&"page_view".to_string()));
    assert!(types.contains(&"add_to_cart".to_string()));
    assert!(types.contains(&"checkout_progress".to_string()));
    assert!(types.contains(&"purchase".to_string()));
    assert!(!types.contains(&"cart_abandonment".to_string()));
}

#[tokio::test(start_paused = true)]
async fn shipping_stage_times_out_into_abandonment() {
    let sink = CollectingSink::new();
    let tracker = consented_tracker(sink.clone()).await;

    tracker.cart().add_item(item("sku1", 100.0, 1)).await;
    tracker.cart().add_item(item("sku2", 50.0, 2)).await;
    tracker
        .cart()
        .progress_stage(CheckoutStage::ShippingInfo)
        .await;

    // Past the 15-minute shipping timeout, then one tick for the fired
    // timer task to finish.
    tokio::time::sleep(Duration::from_secs(15 * 60 + 1)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let session = tracker.cart().current_session().await.unwrap();
    assert!(session.is_abandoned);

    let summary = tracker.cart().summary().await;
    assert_eq!(summary.total_abandonments, 1);
    assert_eq!(summary.most_common_stage, Some(CheckoutStage::ShippingInfo));
    assert_eq!(summary.average_cart_value, 200.0);
    assert_eq!(summary.recovery_opportunities, 1);

    tracker.shutdown().await;
    let seen = sink.seen.lock().unwrap();
    let record = seen
        .iter()
        .find_map(|e| match e {
            AnalyticsEvent::CartAbandonment(r) => Some(r.clone()),
            _ => None,
        })
        .expect("abandonment should reach the sink");
    assert_eq!(record.reason, AbandonReason::Timeout);
    assert_eq!(record.cart_value, 200.0);
    assert_eq!(record.item_count, 2);
    assert!(record.recovery_opportunity);
}

#[tokio::test]
async fn nothing_reaches_the_sink_without_consent() {
    let sink = CollectingSink::new();
    let tracker = AnalyticsTracker::new(
        TrackerConfig::default(),
        Arc::new(MemoryStore::new()),
        sink.clone(),
    )
    .await;

    tracker.track_page_view(PageContext::new("/")).await;
    tracker.cart().add_item(item("sku1", 100.0, 1)).await;
    tracker
        .cart()
        .progress_stage(CheckoutStage::ShippingInfo)
        .await;
    tracker.interactions().record_scroll(100).await;
    tracker.interactions().record_search("shoe rack", None).await;
    tracker.end_session(Some("/".to_string())).await;

    tracker.shutdown().await;
    assert!(sink.event_types().is_empty());
}

#[tokio::test]
async fn session_resumes_from_file_storage() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(JsonFileStore::new(dir.path()).unwrap());

    let session_id = {
        let tracker = AnalyticsTracker::new(
            TrackerConfig::default(),
            storage.clone(),
            Arc::new(NullSink),
        )
        .await;
        tracker
            .update_consent(ConsentPreferences::allow_all())
            .await
            .unwrap();
        tracker.cart().add_item(item("sku1", 100.0, 1)).await;
        let id = tracker.cart().current_session().await.unwrap().session_id;
        tracker.shutdown().await;
        id
    };

    let tracker =
        AnalyticsTracker::new(TrackerConfig::default(), storage, Arc::new(NullSink)).await;
    let resumed = tracker
        .cart()
        .current_session()
        .await
        .expect("session should resume");
    assert_eq!(resumed.session_id, session_id);
    assert_eq!(resumed.value, 100.0);
    assert_eq!(resumed.item_count(), 1);
    tracker.shutdown().await;
}
