//! The batch pipeline driver: ingest fully, group once, validate per
//! session, fold into totals, print the report.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use qoe_core::{ExperimentTable, Ingest, Totals, collect_sessions, summarize_sessions};

use crate::memory::MemoryWatchdog;

/// Runs the whole pipeline: telemetry from `input`, report to `output`.
pub fn run(
    experiments: &ExperimentTable,
    input: impl BufRead,
    output: impl Write,
    watchdog: MemoryWatchdog,
) -> Result<Totals> {
    let ingest = ingest_stream(input, watchdog)?;
    report(experiments, &ingest, output)
}

/// Phase one: a single sequential pass over the stream, mutating only the
/// accumulator.
fn ingest_stream(input: impl BufRead, watchdog: MemoryWatchdog) -> Result<Ingest> {
    let mut ingest = Ingest::new();
    watchdog.check(0)?;

    for line in input.lines() {
        let line = line.context("failed to read input line")?;
        ingest.ingest_line(&line)?;
        watchdog.check(ingest.lines_read())?;
    }

    tracing::info!(
        lines = ingest.lines_read(),
        malformed = ingest.lines_malformed(),
        users = ingest.users().len(),
        "ingest complete"
    );
    Ok(ingest)
}

/// Phases two and three: group, validate each session (in parallel over
/// disjoint read-only timelines), and print one line per session plus the
/// global totals.
fn report(experiments: &ExperimentTable, ingest: &Ingest, mut output: impl Write) -> Result<Totals> {
    let grouped = collect_sessions(ingest)?;
    tracing::info!(
        sessions = grouped.sessions.len(),
        skipped = grouped.skipped,
        "grouping complete"
    );

    let mut totals = Totals::default();
    for (key, summary) in summarize_sessions(&grouped.sessions) {
        let scheme = experiments.scheme(key.expt_id)?;
        let username = ingest.users().name(key.user_id)?;
        writeln!(
            output,
            "{} {} {} {} {} extent={:.3} {} events{}",
            summary.verdict(),
            summary.extent_label(),
            key.init_id,
            scheme,
            username,
            summary.time_extent,
            summary.event_count,
            summary.trail
        )?;
        totals.record(&summary);
    }

    writeln!(
        output,
        "discarded sessions: {}/{}",
        totals.invalid_sessions, totals.sessions
    )?;
    writeln!(output, "total time extent: {:.3} hours", totals.extent_hours())?;
    writeln!(
        output,
        "total time considered: {:.3} hours {:.1}%",
        totals.considered_hours(),
        totals.considered_percent()
    )?;

    Ok(totals)
}
