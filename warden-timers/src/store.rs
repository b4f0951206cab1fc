use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::TimerError;
use crate::record::TimerRecord;

/// Durable table of pending timers.
///
/// The store is the sole source of truth for what must be rescheduled after
/// a restart: the scheduler's in-memory queue is rebuilt from [`load_all`]
/// at startup, and every firing, re-arm, or cancellation is persisted here.
///
/// [`load_all`]: TimerStore::load_all
#[async_trait]
pub trait TimerStore: Send + Sync {
    /// Persist a new record. Fails with [`TimerError::DuplicateToken`] if
    /// the token is already present.
    async fn insert(&self, record: &TimerRecord) -> Result<(), TimerError>;

    /// Remove a record. Removing an unknown token is a no-op, so a cancel
    /// racing a firing cannot error.
    async fn delete(&self, token: &str) -> Result<(), TimerError>;

    /// Move a record's next firing time. Returns `false` if the record no
    /// longer exists, which lets a re-arm racing a cancellation back off.
    async fn update_expiry(&self, token: &str, expires_at: i64) -> Result<bool, TimerError>;

    /// Look up a single record by token.
    async fn get(&self, token: &str) -> Result<Option<TimerRecord>, TimerError>;

    /// Every stored record ordered by expiry, overdue ones included; the
    /// clock may have been off while the process was down, so records with
    /// a past expiry are simply due immediately.
    async fn load_all(&self) -> Result<Vec<TimerRecord>, TimerError>;
}

/// In-process [`TimerStore`] backed by a map.
///
/// Loses its contents with the process; meant for tests and for deployments
/// that explicitly opt out of durable timers.
#[derive(Default)]
pub struct MemoryTimerStore {
    records: RwLock<HashMap<String, TimerRecord>>,
}

impl MemoryTimerStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty in-memory store wrapped in an `Arc`.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl TimerStore for MemoryTimerStore {
    async fn insert(&self, record: &TimerRecord) -> Result<(), TimerError> {
        let mut records = self.records.write().await;

        if records.contains_key(&record.token) {
            return Err(TimerError::DuplicateToken(record.token.clone()));
        }

        records.insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), TimerError> {
        self.records.write().await.remove(token);
        Ok(())
    }

    async fn update_expiry(&self, token: &str, expires_at: i64) -> Result<bool, TimerError> {
        let mut records = self.records.write().await;

        match records.get_mut(token) {
            Some(record) => {
                record.expires_at = expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, token: &str) -> Result<Option<TimerRecord>, TimerError> {
        Ok(self.records.read().await.get(token).cloned())
    }

    async fn load_all(&self) -> Result<Vec<TimerRecord>, TimerError> {
        let records = self.records.read().await;

        let mut all = records.values().cloned().collect::<Vec<_>>();
        all.sort_by(|a, b| {
            a.expires_at
                .cmp(&b.expires_at)
                .then_with(|| a.token.cmp(&b.token))
        });

        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{TimerKind, TimerPayload};

    fn record(token: &str, expires_at: i64) -> TimerRecord {
        TimerRecord {
            token: token.to_owned(),
            duration_secs: 60,
            expires_at,
            owner: "MuteService".to_owned(),
            action: "Unmute".to_owned(),
            payload: TimerPayload::new(),
            kind: TimerKind::OneShot,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_tokens() {
        let store = MemoryTimerStore::new();
        store.insert(&record("t1", 100)).await.expect("first insert");

        let duplicate = store.insert(&record("t1", 200)).await;
        assert!(matches!(duplicate, Err(TimerError::DuplicateToken(token)) if token == "t1"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryTimerStore::new();
        store.insert(&record("t1", 100)).await.expect("insert");

        store.delete("t1").await.expect("first delete");
        store.delete("t1").await.expect("second delete");
        store.delete("never-existed").await.expect("unknown delete");

        assert!(store.get("t1").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn update_expiry_reports_missing_records() {
        let store = MemoryTimerStore::new();
        store.insert(&record("t1", 100)).await.expect("insert");

        assert!(store.update_expiry("t1", 160).await.expect("update"));
        let updated = store.get("t1").await.expect("get").expect("record");
        assert_eq!(updated.expires_at, 160);

        assert!(!store.update_expiry("gone", 160).await.expect("update missing"));
    }

    #[tokio::test]
    async fn load_all_returns_overdue_records_in_expiry_order() {
        let store = MemoryTimerStore::new();
        store.insert(&record("late", 500)).await.expect("insert");
        store.insert(&record("overdue", 10)).await.expect("insert");
        store.insert(&record("soon", 120)).await.expect("insert");

        let tokens = store
            .load_all()
            .await
            .expect("load")
            .into_iter()
            .map(|r| r.token)
            .collect::<Vec<_>>();

        assert_eq!(tokens, vec!["overdue", "soon", "late"]);
    }
}
