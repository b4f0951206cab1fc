//! Persistent deferred-callback scheduling for the Warden moderation bot.
//!
//! Components register named handlers once at boot, then schedule one-shot
//! or recurring work by `(owner, action)` name with an opaque string
//! payload. Pending timers are persisted through a [`TimerStore`] and
//! re-armed across process restarts, with at-least-once delivery for
//! anything that matured while the process was down.

/// Time sources for the scheduler.
pub mod clock;
/// Error taxonomy for timer operations.
pub mod error;
/// The persisted timer data model.
pub mod record;
/// Process-wide callback registration and name-based resolution.
pub mod registry;
mod scheduler;
/// The timer handle API: create, cancel, recover.
pub mod service;
/// Record store contract and the in-memory store.
pub mod store;

pub use clock::{Clock, SystemClock, VirtualClock};
pub use error::TimerError;
pub use record::{TimerKind, TimerPayload, TimerRecord};
pub use registry::CallbackRegistry;
pub use service::TimerService;
pub use store::{MemoryTimerStore, TimerStore};
