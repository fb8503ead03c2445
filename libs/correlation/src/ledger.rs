use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use time::OffsetDateTime;

use crate::{CorrelationStatus, Field, SharedCorrelationStore};

/// Typed access layer over a [`CorrelationStore`](crate::CorrelationStore).
///
/// Payload fields hold serialized JSON; status and timestamps hold plain strings.
#[derive(Clone)]
pub struct Correlations {
    store: SharedCorrelationStore,
    ttl: Duration,
}

impl Correlations {
    pub fn new(store: SharedCorrelationStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Starts a fresh pending record for `id` and arms its TTL.
    pub async fn open(&self, id: &str, input: &Value) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        let created_at = format!("{:.6}", now.unix_timestamp_nanos() as f64 / 1e9);
        let fields = vec![
            (Field::Status, CorrelationStatus::Pending.as_str().to_string()),
            (Field::CreatedAt, created_at),
            (Field::InputResponse, serde_json::to_string(input)?),
        ];
        self.store.create(id, fields, self.ttl).await
    }

    pub async fn set_status(&self, id: &str, status: CorrelationStatus) -> Result<bool> {
        self.store
            .set_field(id, Field::Status, status.as_str().to_string())
            .await
    }

    /// Current status, or `None` when the record is missing or expired.
    pub async fn get_status(&self, id: &str) -> Result<Option<CorrelationStatus>> {
        let raw = self.store.get_field(id, Field::Status).await?;
        raw.map(|value| value.parse().map_err(anyhow::Error::msg))
            .transpose()
            .with_context(|| format!("correlation record {id} holds an invalid status"))
    }

    pub async fn set_response(&self, id: &str, response: &Value) -> Result<bool> {
        self.set_field(id, Field::Response, response).await
    }

    pub async fn get_response(&self, id: &str) -> Result<Option<Value>> {
        self.get_json(id, Field::Response).await
    }

    /// Stores `response` and marks the record answered, but only while it is
    /// still pending. Returns `false` for missing, expired or answered records.
    pub async fn answer(&self, id: &str, response: &Value) -> Result<bool> {
        let updates = vec![
            (Field::Response, serde_json::to_string(response)?),
            (Field::Status, CorrelationStatus::Answered.as_str().to_string()),
        ];
        self.store
            .compare_and_set(id, Field::Status, CorrelationStatus::Pending.as_str(), updates)
            .await
    }

    pub async fn set_field(&self, id: &str, field: Field, value: &Value) -> Result<bool> {
        let raw = serde_json::to_string(value)?;
        self.store.set_field(id, field, raw).await
    }

    pub async fn get_field(&self, id: &str, field: Field) -> Result<Option<String>> {
        self.store.get_field(id, field).await
    }

    pub async fn get_json(&self, id: &str, field: Field) -> Result<Option<Value>> {
        let raw = self.store.get_field(id, field).await?;
        raw.map(|value| serde_json::from_str(&value))
            .transpose()
            .with_context(|| format!("decode {field} of correlation record {id}"))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CorrelationStore, MemoryCorrelationStore};
    use serde_json::json;
    use std::sync::Arc;

    fn ledger() -> (Arc<MemoryCorrelationStore>, Correlations) {
        let store = Arc::new(MemoryCorrelationStore::new());
        let correlations = Correlations::new(store.clone(), Duration::from_secs(40));
        (store, correlations)
    }

    #[tokio::test]
    async fn open_marks_pending_with_input() {
        let (_, correlations) = ledger();
        let input = json!({"uuid": "u1", "user": "cashier-1", "amount": 25});
        correlations.open("u1", &input).await.unwrap();

        assert_eq!(
            correlations.get_status("u1").await.unwrap(),
            Some(CorrelationStatus::Pending)
        );
        assert_eq!(
            correlations.get_json("u1", Field::InputResponse).await.unwrap(),
            Some(input)
        );
        assert!(correlations.get_field("u1", Field::CreatedAt).await.unwrap().is_some());
        assert!(correlations.get_response("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn answer_applies_once() {
        let (_, correlations) = ledger();
        correlations.open("u1", &json!({})).await.unwrap();

        assert!(correlations.answer("u1", &json!({"result": "APPROVED"})).await.unwrap());
        assert!(!correlations.answer("u1", &json!({"result": "DECLINED"})).await.unwrap());
        assert_eq!(
            correlations.get_status("u1").await.unwrap(),
            Some(CorrelationStatus::Answered)
        );
        assert_eq!(
            correlations.get_response("u1").await.unwrap(),
            Some(json!({"result": "APPROVED"}))
        );
    }

    #[tokio::test]
    async fn answer_ignores_deleted_record() {
        let (store, correlations) = ledger();
        correlations.open("u1", &json!({})).await.unwrap();
        correlations.delete("u1").await.unwrap();

        assert!(!correlations.answer("u1", &json!({"late": true})).await.unwrap());
        assert!(!store.contains("u1"));
    }

    #[tokio::test]
    async fn status_and_response_round_trip() {
        let (_, correlations) = ledger();
        correlations.open("u1", &json!({})).await.unwrap();

        assert!(
            correlations
                .set_status("u1", CorrelationStatus::Answered)
                .await
                .unwrap()
        );
        assert!(
            correlations
                .set_response("u1", &json!({"result": "declined"}))
                .await
                .unwrap()
        );
        assert_eq!(
            correlations.get_status("u1").await.unwrap(),
            Some(CorrelationStatus::Answered)
        );
        assert_eq!(
            correlations.get_response("u1").await.unwrap(),
            Some(json!({"result": "declined"}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn status_and_response_writes_skip_missing_records() {
        let (store, correlations) = ledger();
        assert!(
            !correlations
                .set_status("ghost", CorrelationStatus::Pending)
                .await
                .unwrap()
        );
        assert!(!correlations.set_response("ghost", &json!({})).await.unwrap());
        assert!(!store.contains("ghost"));

        correlations.open("u2", &json!({})).await.unwrap();
        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(
            !correlations
                .set_status("u2", CorrelationStatus::Answered)
                .await
                .unwrap()
        );
        assert!(!correlations.set_response("u2", &json!({"late": true})).await.unwrap());
        assert!(correlations.get_status("u2").await.unwrap().is_none());
        assert!(!store.contains("u2"));
    }

    #[tokio::test]
    async fn invalid_status_is_reported() {
        let (store, correlations) = ledger();
        store
            .create("u1", vec![(Field::Status, "lost".into())], Duration::from_secs(5))
            .await
            .unwrap();
        assert!(correlations.get_status("u1").await.is_err());
    }
}
