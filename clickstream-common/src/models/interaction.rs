//! Interaction samples and derived engagement metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of DOM-level signal that produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Click,
    Scroll,
    Form,
    Search,
    Download,
    Navigation,
    Activity,
    Custom,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Click => "click",
            InteractionKind::Scroll => "scroll",
            InteractionKind::Form => "form",
            InteractionKind::Search => "search",
            InteractionKind::Download => "download",
            InteractionKind::Navigation => "navigation",
            InteractionKind::Activity => "activity",
            InteractionKind::Custom => "custom",
        }
    }
}

/// Lifecycle of a form field interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormAction {
    Focus,
    Blur,
    Change,
    Submit,
    Error,
}

impl FormAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormAction::Focus => "focus",
            FormAction::Blur => "blur",
            FormAction::Change => "change",
            FormAction::Submit => "submit",
            FormAction::Error => "error",
        }
    }
}

/// One append-only sample in the bounded ring buffer. Never persisted
/// across reloads; used only for aggregate metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub kind: InteractionKind,
    pub target: String,
    pub value: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl InteractionRecord {
    pub fn new(kind: InteractionKind, target: impl Into<String>, value: f64) -> Self {
        Self {
            kind,
            target: target.into(),
            value,
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Derived snapshot; all fields are recomputed on demand, none are stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EngagementMetrics {
    pub time_on_page_ms: i64,
    pub scroll_depth: u8,
    pub click_count: u64,
    /// Samples per minute of session.
    pub interaction_rate: f64,
    /// 100 when one or zero samples were seen, else 0.
    pub bounce_rate: u8,
    pub session_duration_ms: i64,
}
