//! Short-lived correlation records shared between the exchange coordinator and the
//! device callback receiver.
//!
//! A record is a small hash keyed by the caller-supplied correlation id. It is armed
//! with a TTL on creation and is never recreated by later writes, so a late callback
//! can not resurrect an exchange that already finished or expired.

mod ledger;
mod memory;
mod record;
#[cfg(feature = "redis-store")]
mod redis_store;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
#[cfg(not(feature = "redis-store"))]
use tracing::warn;

pub use ledger::Correlations;
pub use memory::MemoryCorrelationStore;
pub use record::{CorrelationStatus, Field};
#[cfg(feature = "redis-store")]
pub use redis_store::RedisCorrelationStore;

/// Default lifetime of a correlation record.
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(40);

/// Shared store handle injected into the coordinator and receiver.
pub type SharedCorrelationStore = Arc<dyn CorrelationStore>;

/// Field-level key-value contract implemented by correlation backends.
///
/// Every operation is atomic for the fields it touches. Only [`create`] arms the
/// expiry; the remaining writes leave it untouched and never create a record.
///
/// [`create`]: CorrelationStore::create
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Replaces whatever is stored under `id` with `fields` and arms the expiry.
    async fn create(&self, id: &str, fields: Vec<(Field, String)>, ttl: Duration) -> Result<()>;

    /// Writes a single field. Returns `Ok(false)` when the record does not exist.
    async fn set_field(&self, id: &str, field: Field, value: String) -> Result<bool>;

    async fn get_field(&self, id: &str, field: Field) -> Result<Option<String>>;

    /// Applies `updates` only if `guard` currently equals `expected`.
    async fn compare_and_set(
        &self,
        id: &str,
        guard: Field,
        expected: &str,
        updates: Vec<(Field, String)>,
    ) -> Result<bool>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// Backend selection for the correlation store.
#[derive(Debug, Clone, Default)]
pub struct CorrelationStoreConfig {
    pub redis_url: Option<String>,
    pub namespace: Option<String>,
}

/// Returns an in-memory store wrapped in an [`Arc`].
pub fn shared_memory_store() -> SharedCorrelationStore {
    Arc::new(MemoryCorrelationStore::new())
}

/// Builds the configured store, falling back to memory when no Redis URL is set.
pub async fn store_from_config(config: &CorrelationStoreConfig) -> Result<SharedCorrelationStore> {
    match config.redis_url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => {
            let namespace = config.namespace.as_deref().unwrap_or("ptb");
            build_redis_store(url, namespace).await
        }
        None => Ok(shared_memory_store()),
    }
}

#[cfg(feature = "redis-store")]
async fn build_redis_store(url: &str, namespace: &str) -> Result<SharedCorrelationStore> {
    let store = RedisCorrelationStore::connect(url, namespace).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis-store"))]
async fn build_redis_store(_url: &str, _namespace: &str) -> Result<SharedCorrelationStore> {
    warn!("redis-store feature disabled; using in-memory correlation store");
    Ok(shared_memory_store())
}
