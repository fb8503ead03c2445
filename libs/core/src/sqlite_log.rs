use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use rusqlite::{Connection, params};
use tokio::task::spawn_blocking;

use crate::journal::{DeviceErrorEntry, ExchangeLog, ExchangeLogEntry};

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS exchange_log (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    uuid TEXT NOT NULL,
    input_response TEXT,
    output_response TEXT,
    final_response TEXT NOT NULL,
    status TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS exchange_log_uuid ON exchange_log (uuid);
CREATE TABLE IF NOT EXISTS device_error_log (
    name TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);
"#;

/// Exchange log persisted in a local SQLite database.
#[derive(Clone)]
pub struct SqliteExchangeLog {
    conn: Arc<StdMutex<Connection>>,
}

impl SqliteExchangeLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("open exchange log {}", path.display()))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("create exchange log tables")?;
        Ok(Self {
            conn: Arc::new(StdMutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, func: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow!("exchange log connection poisoned"))?;
            func(&guard)
        })
        .await
        .context("exchange log task panicked")?
    }

    /// Number of rows recorded for `uuid` in the exchange log.
    pub async fn count_for(&self, uuid: &str) -> Result<u64> {
        let uuid = uuid.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM exchange_log WHERE uuid = ?1",
                params![uuid],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}

#[async_trait]
impl ExchangeLog for SqliteExchangeLog {
    async fn record_exchange(&self, entry: ExchangeLogEntry) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO exchange_log
                 (id, kind, uuid, input_response, output_response, final_response, status, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.id,
                    entry.kind.as_str(),
                    entry.uuid,
                    entry.input_response,
                    entry.output_response,
                    entry.final_response,
                    entry.status.as_str(),
                    entry.recorded_at,
                ],
            )
            .context("insert exchange log entry")?;
            Ok(())
        })
        .await
    }

    async fn record_device_error(&self, entry: DeviceErrorEntry) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO device_error_log (name, title, message, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![entry.name, entry.title, entry.message, entry.recorded_at],
            )
            .context("insert device error entry")?;
            Ok(())
        })
        .await
    }
}
