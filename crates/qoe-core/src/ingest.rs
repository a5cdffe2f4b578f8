//! Event accumulation: one sequential pass over the telemetry stream.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::channel::Channel;
use crate::event::TelemetryEvent;
use crate::record::{self, Measurement, RawRecord, RecordError, SERVER_COUNT, Tokenized};
use crate::user::UserTable;

/// Timestamp-ordered event bucket for one (server, channel) pair.
pub type Bucket = BTreeMap<u64, TelemetryEvent>;

/// The full server x channel grid of buckets.
pub type BucketGrid = [[Bucket; Channel::COUNT]; SERVER_COUNT];

/// What became of one ingested line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// A `client_buffer` field observation was merged into the grid.
    Observed,
    /// Blank, comment, administrative, or known-but-irrelevant measurement.
    Ignored,
    /// Wrong top-level shape; warned, counted, ingestion continues.
    Malformed,
}

/// Fatal ingestion failure, annotated with the offending line number.
#[derive(Debug, Error)]
#[error("line {line_no}: {source}")]
pub struct IngestError {
    pub line_no: u64,
    #[source]
    pub source: RecordError,
}

/// The ingest-phase context: every mutable table the one-pass accumulation
/// needs, with no ambient state. Ownership moves to the grouping phase as
/// shared borrows once ingestion ends.
#[derive(Debug)]
pub struct Ingest {
    users: UserTable,
    grid: BucketGrid,
    lines_read: u64,
    lines_malformed: u64,
}

impl Default for Ingest {
    fn default() -> Self {
        Self::new()
    }
}

impl Ingest {
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: UserTable::new(),
            grid: std::array::from_fn(|_| std::array::from_fn(|_| BTreeMap::new())),
            lines_read: 0,
            lines_malformed: 0,
        }
    }

    /// Ingests one raw line. Recoverable problems (wrong top-level shape)
    /// return [`LineStatus::Malformed`]; everything else in the fatal class
    /// of the error design aborts via `Err`.
    pub fn ingest_line(&mut self, line: &str) -> Result<LineStatus, IngestError> {
        self.lines_read += 1;
        let line_no = self.lines_read;
        self.ingest_inner(line)
            .map_err(|source| IngestError { line_no, source })
    }

    fn ingest_inner(&mut self, line: &str) -> Result<LineStatus, RecordError> {
        match record::tokenize(line)? {
            Tokenized::Ignored => Ok(LineStatus::Ignored),
            Tokenized::Malformed => {
                self.lines_malformed += 1;
                tracing::warn!(line, "ignoring line with wrong number of fields");
                Ok(LineStatus::Malformed)
            }
            Tokenized::Record(record) => self.observe_record(&record),
        }
    }

    fn observe_record(&mut self, record: &RawRecord<'_>) -> Result<LineStatus, RecordError> {
        match record.measurement.parse::<Measurement>()? {
            Measurement::Ignored => Ok(LineStatus::Ignored),
            Measurement::ClientBuffer => {
                let server = record::server_index(&record.tags)?;
                let channel = record::channel_tag(&record.tags)?;
                self.grid[usize::from(server)][channel.index()]
                    .entry(record.timestamp)
                    .or_default()
                    .observe(record.field_key, record.field_value, &mut self.users)?;
                Ok(LineStatus::Observed)
            }
        }
    }

    #[must_use]
    pub fn users(&self) -> &UserTable {
        &self.users
    }

    #[must_use]
    pub fn grid(&self) -> &BucketGrid {
        &self.grid
    }

    /// Lines seen so far, including ignored and malformed ones.
    #[must_use]
    pub const fn lines_read(&self) -> u64 {
        self.lines_read
    }

    #[must_use]
    pub const fn lines_malformed(&self) -> u64 {
        self.lines_malformed
    }
}
