//! Single point of persistence for the session entity, the abandonment
//! history and the recent-search list.
//!
//! Reads are forgiving: a missing or malformed value is logged at warning
//! level and treated as absent, never propagated to tracking callers. Every
//! write is a whole-value overwrite through the `KeyValueStore` port.

use std::sync::Arc;

use clickstream_common::error::Error;
use clickstream_common::models::session::{AbandonmentRecord, CartSession};
use clickstream_common::traits::KeyValueStore;
use tracing::warn;

pub const CART_SESSION_KEY: &str = "cart_session";
pub const ABANDONMENTS_KEY: &str = "cart_abandonments";
pub const RECENT_SEARCHES_KEY: &str = "recent_searches";

pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    history_cap: usize,
    search_cap: usize,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>, history_cap: usize, search_cap: usize) -> Self {
        Self {
            store,
            history_cap,
            search_cap,
        }
    }

    /// Last persisted session, or `None` when absent or unreadable.
    pub async fn load(&self) -> Option<CartSession> {
        let raw = match self.store.get(CART_SESSION_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("cart session read failed: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("malformed cart session, discarding: {}", e);
                None
            }
        }
    }

    pub async fn save(&self, session: &CartSession) -> Result<(), Error> {
        let json = serde_json::to_string(session)?;
        self.store.set(CART_SESSION_KEY, &json).await
    }

    pub async fn clear(&self) -> Result<(), Error> {
        self.store.remove(CART_SESSION_KEY).await
    }

    /// Appends to the persisted abandonment history, evicting the oldest
    /// entries beyond the cap.
    pub async fn append_abandonment(&self, record: &AbandonmentRecord) -> Result<(), Error> {
        let mut history = self.abandonment_history().await;
        history.push(record.clone());
        if history.len() > self.history_cap {
            let overflow = history.len() - self.history_cap;
            history.drain(..overflow);
        }
        let json = serde_json::to_string(&history)?;
        self.store.set(ABANDONMENTS_KEY, &json).await
    }

    pub async fn abandonment_history(&self) -> Vec<AbandonmentRecord> {
        self.read_list(ABANDONMENTS_KEY).await
    }

    /// Moves `term` to the front of the recent-search list, deduplicated,
    /// keeping at most the configured number of terms.
    pub async fn record_search(&self, term: &str) -> Result<(), Error> {
        let mut terms: Vec<String> = self.read_list(RECENT_SEARCHES_KEY).await;
        terms.retain(|t| t != term);
        terms.insert(0, term.to_string());
        terms.truncate(self.search_cap);
        let json = serde_json::to_string(&terms)?;
        self.store.set(RECENT_SEARCHES_KEY, &json).await
    }

    pub async fn recent_searches(&self) -> Vec<String> {
        self.read_list(RECENT_SEARCHES_KEY).await
    }

    pub async fn clear_recent_searches(&self) -> Result<(), Error> {
        self.store.remove(RECENT_SEARCHES_KEY).await
    }

    async fn read_list<T: serde::de::DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("read of {} failed: {}", key, e);
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(list) => list,
            Err(e) => {
                warn!("malformed list under {}, discarding: {}", key, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::Utc;
    use clickstream_common::models::session::{
        AbandonReason, CartLineItem, CartSession, CheckoutStage,
    };

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()), 50, 5)
    }

    fn abandonment(session: &CartSession, value: f64) -> AbandonmentRecord {
        AbandonmentRecord {
            session_id: session.session_id,
            user_id: None,
            abandoned_at: Utc::now(),
            stage: CheckoutStage::CartPage,
            reason: AbandonReason::Timeout,
            cart_value: value,
            item_count: 1,
            items: vec![],
            time_in_cart_ms: 1000,
            page_exited_from: None,
            previous_actions: vec![],
            recovery_opportunity: value > 50.0,
        }
    }

    #[tokio::test]
    async fn session_round_trip() {
        let store = store();
        let mut session = CartSession::new(Some("user-7".to_string()));
        session.items.push(CartLineItem {
            id: "sku1".to_string(),
            name: "Walk-in shelving".to_string(),
            category: "closet".to_string(),
            price: 100.0,
            quantity: 1,
            brand: Some("PG".to_string()),
        });
        session.value = session.cart_value();
        session.stage = CheckoutStage::ShippingInfo;

        store.save(&session).await.unwrap();
        let loaded = store.load().await.expect("session should load");

        assert_eq!(loaded.session_id, session.session_id);
        assert_eq!(loaded.user_id.as_deref(), Some("user-7"));
        assert_eq!(loaded.items, session.items);
        assert_eq!(loaded.stage, CheckoutStage::ShippingInfo);
        assert_eq!(loaded.value, 100.0);
    }

    #[tokio::test]
    async fn malformed_session_is_none() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(CART_SESSION_KEY, "{{{").await.unwrap();
        let store = SessionStore::new(kv, 50, 5);
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn clear_removes_session() {
        let store = store();
        store.save(&CartSession::new(None)).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn abandonment_history_evicts_oldest() {
        let kv = Arc::new(MemoryStore::new());
        let store = SessionStore::new(kv, 3, 5);
        let session = CartSession::new(None);
        for i in 0..5 {
            store
                .append_abandonment(&abandonment(&session, i as f64))
                .await
                .unwrap();
        }
        let history = store.abandonment_history().await;
        assert_eq!(history.len(), 3);
        // Oldest two evicted.
        assert_eq!(history[0].cart_value, 2.0);
        assert_eq!(history[2].cart_value, 4.0);
    }

    #[tokio::test]
    async fn recent_searches_dedupe_and_cap() {
        let store = store();
        for term in ["doors", "shelves", "doors", "mirror", "bins", "racks", "led"] {
            store.record_search(term).await.unwrap();
        }
        let terms = store.recent_searches().await;
        assert_eq!(terms.len(), 5);
        assert_eq!(terms[0], "led");
        // "doors" was re-searched after "shelves", so it outlived it.
        assert!(terms.contains(&"doors".to_string()));
        assert!(!terms.contains(&"shelves".to_string()));
    }
}
