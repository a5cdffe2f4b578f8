//! Session grouping: re-keys accumulated events into per-session timelines.
//!
//! Runs exactly once, after ingestion. Buckets are traversed in
//! (server, channel, timestamp) order and session keys are derived without
//! reordering, so every timeline is monotone by construction and no sort is
//! needed.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::channel::Channel;
use crate::event::TelemetryEvent;
use crate::ingest::Ingest;

/// Identity of one client viewing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionKey {
    pub init_id: u32,
    pub user_id: u32,
    pub expt_id: u32,
    pub server: u8,
    pub channel: Channel,
}

/// Timestamp-ordered timeline of one session, borrowing the accumulator's
/// events. Read-only once built.
pub type Timeline<'a> = Vec<(u64, &'a TelemetryEvent)>;

#[derive(Debug, Error)]
pub enum GroupError {
    /// A bucket never received all six field keys; the telemetry stream is
    /// internally inconsistent.
    #[error("incomplete event at server {server} channel {channel} timestamp {timestamp}")]
    IncompleteEvent {
        server: u8,
        channel: Channel,
        timestamp: u64,
    },
}

/// Result of the grouping pass.
#[derive(Debug, Default)]
pub struct Grouped<'a> {
    /// Per-session timelines, in deterministic key order.
    pub sessions: BTreeMap<SessionKey, Timeline<'a>>,
    /// Contradictory events skipped during the pass.
    pub skipped: u64,
}

/// Walks the whole grid and groups complete, non-contradictory events by
/// session identity.
pub fn collect_sessions(ingest: &Ingest) -> Result<Grouped<'_>, GroupError> {
    let mut grouped = Grouped::default();

    for (server, channels) in (0u8..).zip(ingest.grid().iter()) {
        tracing::debug!(server, "grouping server bucket");
        for (channel, bucket) in Channel::ALL.into_iter().zip(channels.iter()) {
            for (&timestamp, event) in bucket {
                if event.is_contradictory() {
                    grouped.skipped += 1;
                    tracing::warn!(
                        server,
                        %channel,
                        timestamp,
                        skipped = grouped.skipped,
                        "skipping event with contradictory values"
                    );
                    continue;
                }

                match (event.init_id, event.user_id, event.expt_id) {
                    (Some(init_id), Some(user_id), Some(expt_id)) if event.is_complete() => {
                        let key = SessionKey {
                            init_id,
                            user_id,
                            expt_id,
                            server,
                            channel,
                        };
                        grouped.sessions.entry(key).or_default().push((timestamp, event));
                    }
                    _ => {
                        return Err(GroupError::IncompleteEvent {
                            server,
                            channel,
                            timestamp,
                        });
                    }
                }
            }
        }
    }

    Ok(grouped)
}
