use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" in unix seconds.
///
/// The scheduler never reads wall time directly, so tests can drive it on
/// tokio's paused clock instead.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_secs() as i64)
    }
}

/// A clock anchored to the tokio clock at construction time.
///
/// Reads `origin_unix` at the moment it is created and advances with
/// `tokio::time` from there. Under a paused runtime the tokio clock is
/// virtual, which makes scheduler timing fully deterministic in tests.
#[derive(Debug)]
pub struct VirtualClock {
    origin_unix: i64,
    started: tokio::time::Instant,
}

impl VirtualClock {
    /// Create a clock reading `origin_unix` right now.
    pub fn new(origin_unix: i64) -> Self {
        Self {
            origin_unix,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for VirtualClock {
    fn now_unix(&self) -> i64 {
        self.origin_unix + self.started.elapsed().as_secs() as i64
    }
}
