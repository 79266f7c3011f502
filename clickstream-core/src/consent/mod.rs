//! Consent gate.
//!
//! Every tracking entry point asks this gate before doing anything. A denied
//! category means the call is a complete no-op: no event, no persisted
//! mutation, no timer. Reads never fail upward — missing, malformed,
//! expired or version-mismatched records all just mean "denied".

use std::sync::Arc;

use chrono::Utc;
use clickstream_common::error::Error;
use clickstream_common::models::consent::{ConsentCategory, ConsentPreferences, ConsentRecord};
use clickstream_common::traits::KeyValueStore;
use tracing::{debug, warn};

use crate::config::ConsentConfig;

pub const CONSENT_KEY: &str = "consent";
pub const CONSENT_PREFERENCES_KEY: &str = "consent_preferences";

pub struct ConsentGate {
    store: Arc<dyn KeyValueStore>,
    config: ConsentConfig,
}

impl ConsentGate {
    pub fn new(store: Arc<dyn KeyValueStore>, config: ConsentConfig) -> Self {
        Self { store, config }
    }

    /// Current preferences, or necessary-only when no valid record exists.
    pub async fn preferences(&self) -> ConsentPreferences {
        match self.load_record().await {
            Some(record) => record.preferences.normalize(),
            None => ConsentPreferences::necessary_only(),
        }
    }

    pub async fn is_granted(&self, category: ConsentCategory) -> bool {
        self.preferences().await.granted(category)
    }

    pub async fn has_analytics_consent(&self) -> bool {
        self.is_granted(ConsentCategory::Analytics).await
    }

    /// Overwrites the persisted record with a fresh timestamp and the
    /// current version stamp. A single atomic overwrite per key.
    pub async fn update(&self, preferences: ConsentPreferences) -> Result<(), Error> {
        let record = ConsentRecord::new(preferences);
        let record_json = serde_json::to_string(&record)?;
        let prefs_json = serde_json::to_string(&record.preferences)?;
        self.store.set(CONSENT_KEY, &record_json).await?;
        self.store.set(CONSENT_PREFERENCES_KEY, &prefs_json).await?;
        debug!("consent preferences updated: {:?}", record.preferences);
        Ok(())
    }

    /// Drops back to necessary-only and removes the stored record.
    pub async fn revoke_all(&self) -> Result<(), Error> {
        self.store.remove(CONSENT_KEY).await?;
        self.store.remove(CONSENT_PREFERENCES_KEY).await?;
        Ok(())
    }

    async fn load_record(&self) -> Option<ConsentRecord> {
        let raw = match self.store.get(CONSENT_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("consent record read failed, treating as absent: {}", e);
                return None;
            }
        };
        let record: ConsentRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!("malformed consent record, treating as absent: {}", e);
                return None;
            }
        };
        if record.is_valid(Utc::now(), self.config.retention()) {
            Some(record)
        } else {
            None
        }
    }
}
