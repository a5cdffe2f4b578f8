//! The accumulated logical event for one (server, channel, timestamp) bucket.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::record::{DecodeError, decode_f64, decode_influx_u32, unquote};
use crate::user::UserTable;

/// Client-reported playback event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Init,
    Startup,
    Play,
    Timer,
    Rebuffer,
}

impl EventKind {
    pub const ALL: [Self; 5] = [
        Self::Init,
        Self::Startup,
        Self::Play,
        Self::Timer,
        Self::Rebuffer,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Startup => "startup",
            Self::Play => "play",
            Self::Timer => "timer",
            Self::Rebuffer => "rebuffer",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "startup" => Ok(Self::Startup),
            "play" => Ok(Self::Play),
            "timer" => Ok(Self::Timer),
            "rebuffer" => Ok(Self::Rebuffer),
            _ => Err(UnknownEventKind(s.to_string())),
        }
    }
}

/// Error type for unknown event kind strings.
#[derive(Debug, Clone)]
pub struct UnknownEventKind(String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event type: {}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

/// Outcome of a set-once field merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The field was unset and is now recorded.
    Inserted,
    /// The field was already set to an equal value.
    Unchanged,
    /// The field was already set to a different value; the event is now
    /// marked contradictory and keeps its first-recorded value.
    Conflicting,
}

/// Decode or dispatch failure for one field observation.
#[derive(Debug, Error)]
pub enum ObserveError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Kind(#[from] UnknownEventKind),
    #[error("unknown field key: {0}")]
    UnknownKey(String),
}

/// One logical event, merged from repeated field reports for the same
/// (server, channel, timestamp) bucket.
///
/// Fields fill in as observations arrive; once ingestion ends the event is
/// treated as immutable. `contradictory` is sticky: once a field sees two
/// unequal values the event stays bad and no recorded value ever changes.
#[derive(Debug, Clone, Default)]
pub struct TelemetryEvent {
    pub init_id: Option<u32>,
    pub expt_id: Option<u32>,
    pub user_id: Option<u32>,
    pub kind: Option<EventKind>,
    pub buffer: Option<f64>,
    pub cum_rebuf: Option<f64>,
    pub(crate) contradictory: bool,
}

fn set_once<T: PartialEq>(slot: &mut Option<T>, value: T) -> SetOutcome {
    match slot {
        None => {
            *slot = Some(value);
            SetOutcome::Inserted
        }
        Some(current) if *current == value => SetOutcome::Unchanged,
        Some(_) => SetOutcome::Conflicting,
    }
}

impl TelemetryEvent {
    #[must_use]
    pub const fn is_contradictory(&self) -> bool {
        self.contradictory
    }

    /// All six scalar fields set.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.init_id.is_some()
            && self.expt_id.is_some()
            && self.user_id.is_some()
            && self.kind.is_some()
            && self.buffer.is_some()
            && self.cum_rebuf.is_some()
    }

    /// Decodes `value` according to `key` and merges it set-once. Duplicate
    /// delivery is expected and must agree; a disagreement marks the whole
    /// event contradictory without aborting ingestion.
    pub fn observe(
        &mut self,
        key: &str,
        value: &str,
        users: &mut UserTable,
    ) -> Result<SetOutcome, ObserveError> {
        let outcome = match key {
            "init_id" => set_once(&mut self.init_id, decode_influx_u32(value)?),
            "expt_id" => set_once(&mut self.expt_id, decode_influx_u32(value)?),
            "user" => set_once(&mut self.user_id, users.intern(unquote(value)?)),
            "event" => set_once(&mut self.kind, unquote(value)?.parse()?),
            "buffer" => set_once(&mut self.buffer, decode_f64(value)?),
            "cum_rebuf" => set_once(&mut self.cum_rebuf, decode_f64(value)?),
            _ => return Err(ObserveError::UnknownKey(key.to_string())),
        };

        if outcome == SetOutcome::Conflicting && !self.contradictory {
            self.contradictory = true;
            tracing::warn!(
                key,
                value,
                init_id = self.init_id,
                expt_id = self.expt_id,
                user_id = self.user_id,
                "contradictory value reported for event field"
            );
        }

        Ok(outcome)
    }
}
