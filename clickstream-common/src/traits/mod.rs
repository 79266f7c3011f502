// File: clickstream-common/src/traits/mod.rs
pub mod sink_traits;
pub mod storage_traits;

pub use sink_traits::EventSink;
pub use storage_traits::KeyValueStore;
