use async_trait::async_trait;

use crate::error::Error;

/// Durable key/value port the engine persists through. Values are JSON
/// strings; readers must treat missing or malformed values as absent.
///
/// There is no multi-writer concurrency to arbitrate: the store is only ever
/// touched from one logical client at a time, so `set` just has to be an
/// atomic overwrite.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;
    async fn set(&self, key: &str, value: &str) -> Result<(), Error>;
    async fn remove(&self, key: &str) -> Result<(), Error>;
}
