//! Core domain logic for the QoE session analyzer.
//!
//! This crate contains the fundamental types and logic for:
//! - Record parsing: strict tokenizing and decoding of raw telemetry lines
//! - Event accumulation: merging repeated field reports into one logical
//!   event per (server, channel, timestamp) with contradiction detection
//! - Session grouping: re-keying finalized events into per-session timelines
//! - Validation: the session state machine producing verdicts and QoE metrics
//! - Aggregation: folding per-session verdicts into global totals

pub mod aggregate;
pub mod channel;
pub mod event;
pub mod experiment;
pub mod ingest;
pub mod record;
pub mod session;
pub mod user;
pub mod validate;

pub use aggregate::Totals;
pub use channel::{Channel, UnknownChannel};
pub use event::{EventKind, SetOutcome, TelemetryEvent, UnknownEventKind};
pub use experiment::{ExperimentError, ExperimentTable};
pub use ingest::{Ingest, IngestError, LineStatus};
pub use session::{GroupError, Grouped, SessionKey, collect_sessions};
pub use user::UserTable;
pub use validate::{SessionSummary, summarize, summarize_sessions, too_far_apart};
