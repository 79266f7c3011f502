//! Consent records and preference flags.
//!
//! A persisted consent record is only honored while it carries the current
//! version stamp and is younger than the retention window. Anything else
//! (missing, malformed, expired, wrong version) counts as "no consent".

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Bump when the consent wording or category set changes; older stored
/// records become invalid and the user must be asked again.
pub const CONSENT_VERSION: &str = "1.0";

/// Category of tracking the user can grant or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentCategory {
    Necessary,
    Analytics,
    Marketing,
    Functional,
    Location,
}

impl ConsentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentCategory::Necessary => "necessary",
            ConsentCategory::Analytics => "analytics",
            ConsentCategory::Marketing => "marketing",
            ConsentCategory::Functional => "functional",
            ConsentCategory::Location => "location",
        }
    }
}

/// Per-category consent flags. `necessary` is always true and cannot be
/// switched off; `normalize` re-asserts that after deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentPreferences {
    #[serde(default = "default_true")]
    pub necessary: bool,
    #[serde(default)]
    pub analytics: bool,
    #[serde(default)]
    pub marketing: bool,
    #[serde(default)]
    pub functional: bool,
    #[serde(default)]
    pub location: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ConsentPreferences {
    fn default() -> Self {
        Self::necessary_only()
    }
}

impl ConsentPreferences {
    pub fn necessary_only() -> Self {
        Self {
            necessary: true,
            analytics: false,
            marketing: false,
            functional: false,
            location: false,
        }
    }

    pub fn allow_all() -> Self {
        Self {
            necessary: true,
            analytics: true,
            marketing: true,
            functional: true,
            location: true,
        }
    }

    pub fn granted(&self, category: ConsentCategory) -> bool {
        match category {
            ConsentCategory::Necessary => true,
            ConsentCategory::Analytics => self.analytics,
            ConsentCategory::Marketing => self.marketing,
            ConsentCategory::Functional => self.functional,
            ConsentCategory::Location => self.location,
        }
    }

    /// Forces the invariant `necessary == true`.
    pub fn normalize(mut self) -> Self {
        self.necessary = true;
        self
    }
}

/// Versioned, timestamped envelope around the stored preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub preferences: ConsentPreferences,
}

impl ConsentRecord {
    pub fn new(preferences: ConsentPreferences) -> Self {
        Self {
            version: CONSENT_VERSION.to_string(),
            timestamp: Utc::now(),
            preferences: preferences.normalize(),
        }
    }

    /// A record is honored only when it carries the expected version and is
    /// younger than `retention`.
    pub fn is_valid(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.version == CONSENT_VERSION && now - self.timestamp < retention
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn necessary_stays_on() {
        let prefs: ConsentPreferences =
            serde_json::from_str(r#"{"necessary": false, "analytics": true}"#).unwrap();
        assert!(prefs.normalize().necessary);
        assert!(prefs.granted(ConsentCategory::Necessary));
    }

    #[test]
    fn record_expires_after_retention() {
        let mut record = ConsentRecord::new(ConsentPreferences::allow_all());
        let retention = Duration::days(365);
        assert!(record.is_valid(Utc::now(), retention));

        record.timestamp = Utc::now() - Duration::days(366);
        assert!(!record.is_valid(Utc::now(), retention));
    }

    #[test]
    fn version_mismatch_invalidates() {
        let mut record = ConsentRecord::new(ConsentPreferences::allow_all());
        record.version = "0.9".to_string();
        assert!(!record.is_valid(Utc::now(), Duration::days(365)));
    }
}
