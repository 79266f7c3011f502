// File: clickstream-common/src/models/mod.rs
pub mod consent;
pub mod events;
pub mod funnel;
pub mod interaction;
pub mod session;

pub use consent::{ConsentCategory, ConsentPreferences, ConsentRecord, CONSENT_VERSION};
pub use events::{AnalyticsEvent, PageContext};
pub use funnel::{ConversionGoal, FunnelStage};
pub use interaction::{EngagementMetrics, FormAction, InteractionKind, InteractionRecord};
pub use session::{
    AbandonReason, AbandonmentRecord, AbandonmentSummary, CartEventKind, CartEventRecord,
    CartLineItem, CartSession, CheckoutStage,
};
