use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::TimerError;
use crate::record::{TimerKind, TimerPayload, TimerRecord};
use crate::registry::CallbackRegistry;
use crate::scheduler::{Command, Scheduler};
use crate::store::TimerStore;

/// Handle to the process-wide timer service.
///
/// Cheap to clone because it only stores reference-counted shared state;
/// pass a clone into every component that schedules or cancels deferred
/// work. The scheduler task exits once every handle has been dropped.
#[derive(Clone)]
pub struct TimerService {
    store: Arc<dyn TimerStore>,
    clock: Arc<dyn Clock>,
    commands: mpsc::UnboundedSender<Command>,
}

impl TimerService {
    /// Start the scheduler over `store`, recovering every persisted timer.
    ///
    /// Loads the full record table exactly once, seeds the live queue with
    /// it (overdue records fire on the first wake, so delivery is
    /// at-least-once across restarts), and spawns the scheduler task.
    ///
    /// The registry is frozen here: register every handler before calling
    /// this.
    pub async fn start(
        store: Arc<dyn TimerStore>,
        registry: CallbackRegistry,
    ) -> Result<Self, TimerError> {
        Self::start_with_clock(store, registry, Arc::new(SystemClock)).await
    }

    /// [`start`](Self::start) with an explicit time source.
    pub async fn start_with_clock(
        store: Arc<dyn TimerStore>,
        registry: CallbackRegistry,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TimerError> {
        let records = store.load_all().await?;
        let (commands, receiver) = mpsc::unbounded_channel();

        info!(
            recovered = records.len(),
            handlers = registry.len(),
            "timer service starting"
        );

        let mut scheduler = Scheduler::new(
            Arc::clone(&store),
            Arc::new(registry),
            Arc::clone(&clock),
            receiver,
            commands.downgrade(),
        );
        scheduler.seed(records);
        tokio::spawn(scheduler.run());

        Ok(Self {
            store,
            clock,
            commands,
        })
    }

    /// Schedule a deferred callback and return its cancellation token.
    ///
    /// The record is persisted before the live queue learns about it; a
    /// store failure leaves no timer behind, in memory or on disk.
    pub async fn create_timer(
        &self,
        owner: &str,
        action: &str,
        payload: TimerPayload,
        duration_secs: i64,
        kind: TimerKind,
    ) -> Result<String, TimerError> {
        if duration_secs <= 0 {
            return Err(TimerError::InvalidDuration(duration_secs));
        }

        let record = TimerRecord {
            token: fresh_token(),
            duration_secs,
            expires_at: self.clock.now_unix().saturating_add(duration_secs),
            owner: owner.to_owned(),
            action: action.to_owned(),
            payload,
            kind,
        };

        self.store.insert(&record).await?;

        let token = record.token.clone();
        self.commands
            .send(Command::Arm(record))
            .map_err(|_| TimerError::SchedulerStopped)?;

        Ok(token)
    }

    /// Cancel a pending timer.
    ///
    /// Idempotent: unknown tokens are a no-op, so a cancel racing the
    /// timer's own firing cannot error. If the handler is already
    /// mid-dispatch the invocation completes, but any re-arm is suppressed
    /// because the record is gone from the store.
    pub async fn cancel_timer(&self, token: &str) -> Result<(), TimerError> {
        self.store.delete(token).await?;

        self.commands
            .send(Command::Cancel(token.to_owned()))
            .map_err(|_| TimerError::SchedulerStopped)?;

        Ok(())
    }

    /// Whether a timer with this token is still pending.
    pub async fn timer_exists(&self, token: &str) -> Result<bool, TimerError> {
        Ok(self.store.get(token).await?.is_some())
    }
}

/// Mint a fresh opaque timer token.
fn fresh_token() -> String {
    Uuid::new_v4().simple().to_string()
}
