use async_trait::async_trait;
use sqlx::PgPool;

use warden_timers::{TimerError, TimerKind, TimerPayload, TimerRecord, TimerStore};

use crate::Database;

/// Postgres-backed [`TimerStore`] over the `event_timers` table.
///
/// Payloads are stored as JSON text, mirroring what the handlers receive;
/// the scheduler never looks inside them.
#[derive(Clone)]
pub struct PgTimerStore {
    pool: PgPool,
}

impl PgTimerStore {
    /// Create a store over the shared database handle.
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

/// One row of `event_timers`, as fetched.
#[derive(sqlx::FromRow)]
struct TimerRow {
    token: String,
    duration_secs: i64,
    expires_at: i64,
    owner: String,
    action: String,
    payload: String,
    kind: String,
}

impl TimerRow {
    fn into_record(self) -> Result<TimerRecord, TimerError> {
        let kind = TimerKind::parse(&self.kind).ok_or_else(|| {
            TimerError::Store(anyhow::anyhow!(
                "unknown timer kind `{}` for token `{}`",
                self.kind,
                self.token
            ))
        })?;

        let payload: TimerPayload = serde_json::from_str(&self.payload)
            .map_err(|source| TimerError::Store(source.into()))?;

        Ok(TimerRecord {
            token: self.token,
            duration_secs: self.duration_secs,
            expires_at: self.expires_at,
            owner: self.owner,
            action: self.action,
            payload,
            kind,
        })
    }
}

fn is_unique_violation(source: &sqlx::Error) -> bool {
    matches!(source, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl TimerStore for PgTimerStore {
    async fn insert(&self, record: &TimerRecord) -> Result<(), TimerError> {
        let payload = serde_json::to_string(&record.payload)
            .map_err(|source| TimerError::Store(source.into()))?;

        let result = sqlx::query(
            "INSERT INTO event_timers (token, duration_secs, expires_at, owner, action, payload, kind)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&record.token)
        .bind(record.duration_secs)
        .bind(record.expires_at)
        .bind(&record.owner)
        .bind(&record.action)
        .bind(&payload)
        .bind(record.kind.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(source) if is_unique_violation(&source) => {
                Err(TimerError::DuplicateToken(record.token.clone()))
            }
            Err(source) => Err(TimerError::Store(source.into())),
        }
    }

    async fn delete(&self, token: &str) -> Result<(), TimerError> {
        sqlx::query("DELETE FROM event_timers WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|source| TimerError::Store(source.into()))?;

        Ok(())
    }

    async fn update_expiry(&self, token: &str, expires_at: i64) -> Result<bool, TimerError> {
        let result = sqlx::query("UPDATE event_timers SET expires_at = $2 WHERE token = $1")
            .bind(token)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(|source| TimerError::Store(source.into()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, token: &str) -> Result<Option<TimerRecord>, TimerError> {
        let row = sqlx::query_as::<_, TimerRow>(
            "SELECT token, duration_secs, expires_at, owner, action, payload, kind
             FROM event_timers WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|source| TimerError::Store(source.into()))?;

        row.map(TimerRow::into_record).transpose()
    }

    async fn load_all(&self) -> Result<Vec<TimerRecord>, TimerError> {
        let rows = sqlx::query_as::<_, TimerRow>(
            "SELECT token, duration_secs, expires_at, owner, action, payload, kind
             FROM event_timers ORDER BY expires_at, token",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|source| TimerError::Store(source.into()))?;

        rows.into_iter().map(TimerRow::into_record).collect()
    }
}
