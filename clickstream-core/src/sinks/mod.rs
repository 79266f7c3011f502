// File: clickstream-core/src/sinks/mod.rs

pub mod measurement;
pub mod null;

pub use measurement::MeasurementSink;
pub use null::NullSink;
