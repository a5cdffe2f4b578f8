//! Resident-memory watchdog.
//!
//! A coarse guard against unbounded growth rather than backpressure; the
//! input is a one-shot batch that cannot be throttled.

use std::fs;

use anyhow::{Context, Result, bail};

/// Reads this process's resident set size in KiB from procfs.
pub fn resident_memory_kib() -> Result<u64> {
    let status =
        fs::read_to_string("/proc/self/status").context("failed to read /proc/self/status")?;
    parse_vm_rss_kib(&status).context("VmRSS not present in /proc/self/status")
}

fn parse_vm_rss_kib(status: &str) -> Option<u64> {
    // Format: "VmRSS:      1234 kB"
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Periodic resident-memory guard over the ingest loop.
#[derive(Debug, Clone, Copy)]
pub struct MemoryWatchdog {
    ceiling_kib: u64,
    interval_lines: u64,
}

impl MemoryWatchdog {
    #[must_use]
    pub const fn new(ceiling_kib: u64, interval_lines: u64) -> Self {
        Self {
            ceiling_kib,
            interval_lines: if interval_lines == 0 { 1 } else { interval_lines },
        }
    }

    /// Checks the ceiling whenever `lines` lands on the configured
    /// interval; fails the run past the ceiling.
    pub fn check(self, lines: u64) -> Result<()> {
        if lines % self.interval_lines != 0 {
            return Ok(());
        }
        let rss_kib = resident_memory_kib()?;
        if rss_kib > self.ceiling_kib {
            bail!("memory usage is at {rss_kib} KiB");
        }
        tracing::info!(lines, rss_mib = rss_kib / 1024, "ingest progress");
        Ok(())
    }
}
