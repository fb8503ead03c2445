use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::{AsyncCommands, Script, aio::ConnectionManager};
use tracing::instrument;

use crate::{CorrelationStore, Field};

static SET_IF_PRESENT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
if redis.call('EXISTS', KEYS[1]) == 1 then
  redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
  return 1
end
return 0
",
    )
});

static COMPARE_AND_SET: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
if redis.call('HGET', KEYS[1], ARGV[1]) == ARGV[2] then
  for i = 3, #ARGV, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
  end
  return 1
end
return 0
",
    )
});

/// Correlation records stored as Redis hashes with a key-level `EXPIRE`.
pub struct RedisCorrelationStore {
    namespace: String,
    connection: ConnectionManager,
}

impl RedisCorrelationStore {
    pub async fn connect(url: &str, namespace: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url).context("parse correlation redis url")?;
        let connection = ConnectionManager::new(client)
            .await
            .context("connect correlation redis")?;
        Ok(Self {
            namespace: namespace.into(),
            connection,
        })
    }

    fn key(&self, id: &str) -> String {
        format!("{}:correlation:{}", self.namespace, id)
    }
}

#[async_trait]
impl CorrelationStore for RedisCorrelationStore {
    #[instrument(name = "correlation.create", skip_all, fields(id = %id))]
    async fn create(&self, id: &str, fields: Vec<(Field, String)>, ttl: Duration) -> Result<()> {
        let key = self.key(id);
        let pairs: Vec<(&str, String)> = fields
            .into_iter()
            .map(|(field, value)| (field.as_str(), value))
            .collect();
        let ttl_secs = ttl.as_secs().max(1) as i64;
        let mut conn = self.connection.clone();
        redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .hset_multiple(&key, &pairs)
            .ignore()
            .expire(&key, ttl_secs)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .with_context(|| format!("create correlation record {id}"))?;
        Ok(())
    }

    #[instrument(name = "correlation.set_field", skip_all, fields(id = %id, field = %field))]
    async fn set_field(&self, id: &str, field: Field, value: String) -> Result<bool> {
        let mut conn = self.connection.clone();
        let applied: i64 = SET_IF_PRESENT
            .key(self.key(id))
            .arg(field.as_str())
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .with_context(|| format!("set {field} on correlation record {id}"))?;
        Ok(applied == 1)
    }

    async fn get_field(&self, id: &str, field: Field) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn
            .hget(self.key(id), field.as_str())
            .await
            .with_context(|| format!("read {field} from correlation record {id}"))?;
        Ok(value)
    }

    #[instrument(name = "correlation.compare_and_set", skip_all, fields(id = %id, guard = %guard))]
    async fn compare_and_set(
        &self,
        id: &str,
        guard: Field,
        expected: &str,
        updates: Vec<(Field, String)>,
    ) -> Result<bool> {
        let mut invocation = COMPARE_AND_SET.key(self.key(id));
        invocation.arg(guard.as_str()).arg(expected);
        for (field, value) in updates {
            invocation.arg(field.as_str()).arg(value);
        }
        let mut conn = self.connection.clone();
        let applied: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .with_context(|| format!("compare-and-set correlation record {id}"))?;
        Ok(applied == 1)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(self.key(id))
            .await
            .with_context(|| format!("delete correlation record {id}"))?;
        Ok(())
    }
}
