//! Broadcast channel enum as the single source of truth for channel names.

use std::fmt;
use std::str::FromStr;

/// Broadcast channels carried by the telemetry stream.
///
/// The set is closed: a record naming any other channel aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    Cbs,
    Nbc,
    Abc,
    Fox,
    Univision,
    Pbs,
}

impl Channel {
    /// Number of channels; sizes the per-channel accumulator grid.
    pub const COUNT: usize = 6;

    /// All channels, in grid index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Cbs,
        Self::Nbc,
        Self::Abc,
        Self::Fox,
        Self::Univision,
        Self::Pbs,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cbs => "cbs",
            Self::Nbc => "nbc",
            Self::Abc => "abc",
            Self::Fox => "fox",
            Self::Univision => "univision",
            Self::Pbs => "pbs",
        }
    }

    /// Index into the accumulator grid.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cbs" => Ok(Self::Cbs),
            "nbc" => Ok(Self::Nbc),
            "abc" => Ok(Self::Abc),
            "fox" => Ok(Self::Fox),
            "univision" => Ok(Self::Univision),
            "pbs" => Ok(Self::Pbs),
            _ => Err(UnknownChannel(s.to_string())),
        }
    }
}

/// Error type for unknown channel names.
#[derive(Debug, Clone)]
pub struct UnknownChannel(String);

impl fmt::Display for UnknownChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown channel: {}", self.0)
    }
}

impl std::error::Error for UnknownChannel {}
