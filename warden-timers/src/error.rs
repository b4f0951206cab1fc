use thiserror::Error;

/// Errors surfaced by the timer service and its record stores.
#[derive(Debug, Error)]
pub enum TimerError {
    /// Caller supplied a non-positive duration. Rejected at creation;
    /// nothing is persisted.
    #[error("timer duration must be positive, got {0}s")]
    InvalidDuration(i64),

    /// A record with this token already exists. Unreachable with generated
    /// tokens; treated as a programming error, not a recoverable condition.
    #[error("timer token `{0}` already exists")]
    DuplicateToken(String),

    /// No handler is registered for the record's name pair at dispatch
    /// time. The record is dropped and logged, never retried.
    #[error("no handler registered for `{owner}.{action}`")]
    HandlerNotFound { owner: String, action: String },

    /// The handler itself reported failure. The record is dropped and
    /// logged; the scheduler performs no retry or backoff.
    #[error("handler `{owner}.{action}` failed")]
    HandlerExecution {
        owner: String,
        action: String,
        #[source]
        source: anyhow::Error,
    },

    /// The durable record store rejected a read or write. The live queue is
    /// left untouched, so store and queue stay consistent.
    #[error("timer store operation failed")]
    Store(#[source] anyhow::Error),

    /// The scheduler task is no longer running.
    #[error("timer scheduler is not running")]
    SchedulerStopped,
}
