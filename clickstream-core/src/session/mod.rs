// File: clickstream-core/src/session/mod.rs

pub mod store;

pub use store::SessionStore;
