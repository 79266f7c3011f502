// File: clickstream-core/src/services/mod.rs

pub mod cart_watcher;
pub mod funnel_service;
pub mod interaction_service;
pub mod tracker;

pub use cart_watcher::CartWatcher;
pub use funnel_service::FunnelTracker;
pub use interaction_service::InteractionAggregator;
pub use tracker::AnalyticsTracker;
