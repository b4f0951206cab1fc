use std::collections::HashMap;

/// Opaque string-keyed argument bag carried with a timer and handed back to
/// its handler at fire time. The scheduler never interprets its contents.
pub type TimerPayload = HashMap<String, String>;

/// Whether a timer fires once or keeps re-arming itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires exactly once, then the record is deleted.
    OneShot,
    /// Re-arms with the original duration after each successful firing,
    /// until explicitly canceled.
    Recurring,
}

impl TimerKind {
    /// Stable storage label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneShot => "one_shot",
            Self::Recurring => "recurring",
        }
    }

    /// Parse a storage label back into a kind.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "one_shot" => Some(Self::OneShot),
            "recurring" => Some(Self::Recurring),
            _ => None,
        }
    }
}

/// A pending timer, exactly as persisted in the record store.
#[derive(Clone, Debug, PartialEq)]
pub struct TimerRecord {
    /// Unique caller-visible handle, usable for cancellation and lookup.
    pub token: String,
    /// Originally requested delay/interval in seconds; re-used to re-arm
    /// `Recurring` timers.
    pub duration_secs: i64,
    /// Unix time (seconds) at which the timer next fires.
    pub expires_at: i64,
    /// Logical owner/module of the callback.
    pub owner: String,
    /// Specific action within the owner.
    pub action: String,
    /// Arguments delivered to the handler at fire time.
    pub payload: TimerPayload,
    pub kind: TimerKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_round_trip() {
        assert_eq!(TimerKind::parse(TimerKind::OneShot.as_str()), Some(TimerKind::OneShot));
        assert_eq!(TimerKind::parse(TimerKind::Recurring.as_str()), Some(TimerKind::Recurring));
    }

    #[test]
    fn unknown_kind_label_is_rejected() {
        assert_eq!(TimerKind::parse("interval"), None);
        assert_eq!(TimerKind::parse(""), None);
    }
}
