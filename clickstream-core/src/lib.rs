// src/lib.rs

pub mod config;
pub mod consent;
pub mod eventbus;
pub mod services;
pub mod session;
pub mod sinks;
pub mod storage;
pub mod tasks;

pub use clickstream_common::Error;
pub use config::TrackerConfig;
pub use services::tracker::AnalyticsTracker;
