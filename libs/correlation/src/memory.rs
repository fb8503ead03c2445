use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::{CorrelationStore, Field};

#[derive(Debug, Clone)]
struct MemoryRecord {
    fields: HashMap<Field, String>,
    expires_at: Instant,
}

impl MemoryRecord {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Process-local store used in tests and single-instance deployments.
///
/// Expiry follows the tokio clock, so paused-time tests can step past the TTL.
/// Expired records are evicted on access, on every [`create`](CorrelationStore::create)
/// and by [`purge_expired`], so abandoned ids never outlive their TTL by more than
/// one later exchange.
///
/// [`purge_expired`]: MemoryCorrelationStore::purge_expired
#[derive(Default)]
pub struct MemoryCorrelationStore {
    records: DashMap<String, MemoryRecord>,
}

impl MemoryCorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.records.retain(|_, record| !record.is_expired(now));
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.purge_expired();
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.evict_if_expired(id);
        self.records.contains_key(id)
    }

    fn evict_if_expired(&self, id: &str) {
        let now = Instant::now();
        self.records.remove_if(id, |_, record| record.is_expired(now));
    }
}

#[async_trait]
impl CorrelationStore for MemoryCorrelationStore {
    async fn create(&self, id: &str, fields: Vec<(Field, String)>, ttl: Duration) -> Result<()> {
        self.purge_expired();
        let record = MemoryRecord {
            fields: fields.into_iter().collect(),
            expires_at: Instant::now() + ttl,
        };
        self.records.insert(id.to_string(), record);
        Ok(())
    }

    async fn set_field(&self, id: &str, field: Field, value: String) -> Result<bool> {
        self.evict_if_expired(id);
        match self.records.get_mut(id) {
            Some(mut record) => {
                record.fields.insert(field, value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_field(&self, id: &str, field: Field) -> Result<Option<String>> {
        self.evict_if_expired(id);
        Ok(self
            .records
            .get(id)
            .and_then(|record| record.fields.get(&field).cloned()))
    }

    async fn compare_and_set(
        &self,
        id: &str,
        guard: Field,
        expected: &str,
        updates: Vec<(Field, String)>,
    ) -> Result<bool> {
        self.evict_if_expired(id);
        let Some(mut record) = self.records.get_mut(id) else {
            return Ok(false);
        };
        if record.fields.get(&guard).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        record.fields.extend(updates);
        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.records.remove(id);
        Ok(())
    }
}
