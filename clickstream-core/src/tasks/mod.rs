// File: clickstream-core/src/tasks/mod.rs

pub mod heartbeat;
