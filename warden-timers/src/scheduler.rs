use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::error::TimerError;
use crate::record::{TimerKind, TimerRecord};
use crate::registry::CallbackRegistry;
use crate::store::TimerStore;

/// Sleep cap while the queue is empty; new work arrives over the command
/// channel well before this elapses.
const IDLE_SLEEP_SECS: u64 = 60;

/// Queue mutations submitted to the scheduler task.
///
/// The task is the only writer to the live queue; creation, cancellation,
/// and re-arms all go through this channel.
#[derive(Debug)]
pub(crate) enum Command {
    /// Insert a record into the live queue (fresh timer or re-arm).
    Arm(TimerRecord),
    /// Drop a token from the live queue.
    Cancel(String),
}

/// Min-heap entry; `seq` preserves arm order between equal expiry times.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    expires_at: i64,
    seq: u64,
    token: String,
}

/// The scheduler task.
///
/// Owns the time-ordered queue of pending records, sleeps until the next
/// due time or until a command changes the head of the queue, and
/// dispatches every expired record on wake. Each dispatch runs as an
/// independent unit of work; the loop never waits on a handler.
pub(crate) struct Scheduler {
    store: Arc<dyn TimerStore>,
    registry: Arc<CallbackRegistry>,
    clock: Arc<dyn Clock>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Held weakly so in-flight re-arms cannot keep a stopped service alive.
    rearms: mpsc::WeakUnboundedSender<Command>,
    queue: BinaryHeap<Reverse<QueueEntry>>,
    live: HashMap<String, TimerRecord>,
    in_flight: JoinSet<()>,
    next_seq: u64,
}

impl Scheduler {
    pub(crate) fn new(
        store: Arc<dyn TimerStore>,
        registry: Arc<CallbackRegistry>,
        clock: Arc<dyn Clock>,
        commands: mpsc::UnboundedReceiver<Command>,
        rearms: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            commands,
            rearms,
            queue: BinaryHeap::new(),
            live: HashMap::new(),
            in_flight: JoinSet::new(),
            next_seq: 0,
        }
    }

    /// Repopulate the live queue from persisted records, overdue ones
    /// included; those fire on the very first wake.
    pub(crate) fn seed(&mut self, records: Vec<TimerRecord>) {
        for record in records {
            self.arm(record);
        }
    }

    /// Run until every command sender is dropped, then drain in-flight
    /// handlers so their store writes land.
    pub(crate) async fn run(mut self) {
        loop {
            let now = self.clock.now_unix();
            self.fire_due(now);

            let sleep_for = match self.next_due() {
                Some(due) => Duration::from_secs(due.saturating_sub(now) as u64),
                None => Duration::from_secs(IDLE_SLEEP_SECS),
            };

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        self.apply(command);
                        while let Ok(command) = self.commands.try_recv() {
                            self.apply(command);
                        }
                    }
                    None => break,
                },
                Some(result) = self.in_flight.join_next() => {
                    if let Err(source) = result
                        && source.is_panic()
                    {
                        error!(?source, "timer handler panicked");
                    }
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }

        while let Some(result) = self.in_flight.join_next().await {
            if let Err(source) = result
                && source.is_panic()
            {
                error!(?source, "timer handler panicked");
            }
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Arm(record) => self.arm(record),
            Command::Cancel(token) => {
                self.live.remove(&token);
            }
        }
    }

    fn arm(&mut self, record: TimerRecord) {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.queue.push(Reverse(QueueEntry {
            expires_at: record.expires_at,
            seq,
            token: record.token.clone(),
        }));
        self.live.insert(record.token.clone(), record);
    }

    /// Earliest pending expiry, pruning heap entries whose record has been
    /// canceled or re-armed since they were pushed.
    fn next_due(&mut self) -> Option<i64> {
        while let Some(Reverse(head)) = self.queue.peek() {
            match self.live.get(&head.token) {
                Some(record) if record.expires_at == head.expires_at => {
                    return Some(head.expires_at);
                }
                _ => {
                    self.queue.pop();
                }
            }
        }

        None
    }

    /// Dispatch every record due at or before `now`. One record's failure
    /// never blocks the rest of the batch.
    fn fire_due(&mut self, now: i64) {
        while self.next_due().is_some_and(|due| due <= now) {
            let Some(Reverse(entry)) = self.queue.pop() else {
                break;
            };
            let Some(record) = self.live.remove(&entry.token) else {
                continue;
            };

            self.dispatch(record, now);
        }
    }

    /// Fire one record as an independent unit of work so a slow handler
    /// cannot starve the loop or the rest of the due batch.
    fn dispatch(&mut self, record: TimerRecord, now: i64) {
        let invocation = match self.registry.resolve(&record.owner, &record.action) {
            Some(handler) => handler(record.payload.clone()),
            None => {
                let failure = TimerError::HandlerNotFound {
                    owner: record.owner.clone(),
                    action: record.action.clone(),
                };
                warn!(?failure, token = record.token, "dropping timer record");
                self.discard(record.token);
                return;
            }
        };

        debug!(
            token = record.token,
            owner = record.owner,
            action = record.action,
            kind = record.kind.as_str(),
            "timer fired"
        );

        let next_expires = now.saturating_add(record.duration_secs);
        let store = Arc::clone(&self.store);
        let rearms = self.rearms.clone();

        self.in_flight.spawn(async move {
            match invocation.await {
                Ok(()) => settle(store, rearms, record, next_expires).await,
                Err(source) => {
                    let failure = TimerError::HandlerExecution {
                        owner: record.owner.clone(),
                        action: record.action.clone(),
                        source,
                    };
                    error!(?failure, token = record.token, "timer handler failed, dropping record");

                    if let Err(source) = store.delete(&record.token).await {
                        error!(?source, token = record.token, "failed to clear failed timer");
                    }
                }
            }
        });
    }

    /// Drop a record whose dispatch cannot proceed.
    fn discard(&mut self, token: String) {
        let store = Arc::clone(&self.store);

        self.in_flight.spawn(async move {
            if let Err(source) = store.delete(&token).await {
                error!(?source, token, "failed to delete dropped timer record");
            }
        });
    }
}

/// Post-invocation bookkeeping: clear a fired one-shot, or persist and
/// re-arm a recurring timer unless it was canceled mid-dispatch.
async fn settle(
    store: Arc<dyn TimerStore>,
    rearms: mpsc::WeakUnboundedSender<Command>,
    mut record: TimerRecord,
    next_expires: i64,
) {
    match record.kind {
        TimerKind::OneShot => {
            if let Err(source) = store.delete(&record.token).await {
                error!(?source, token = record.token, "failed to clear fired one-shot timer");
            }
        }
        TimerKind::Recurring => match store.update_expiry(&record.token, next_expires).await {
            Ok(true) => {
                record.expires_at = next_expires;
                if let Some(rearms) = rearms.upgrade() {
                    let _ = rearms.send(Command::Arm(record));
                }
            }
            Ok(false) => {
                debug!(token = record.token, "timer canceled mid-dispatch, not re-arming");
            }
            Err(source) => {
                // The stale row refires after a restart: at-least-once.
                error!(?source, token = record.token, "failed to persist re-arm");
            }
        },
    }
}
