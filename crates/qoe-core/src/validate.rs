//! Session-timeline validation: the state machine that turns one ordered
//! timeline into a validity verdict plus QoE metrics.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use rayon::prelude::*;

use crate::event::{EventKind, TelemetryEvent};
use crate::session::{SessionKey, Timeline};

/// Largest tolerated silence between consecutive samples, in seconds. A
/// bigger gap truncates the walk.
pub const MAX_SAMPLE_GAP_SECONDS: f64 = 5.0;

/// Sessions stalled for more than this share of their play window are
/// rejected.
pub const MAX_STALL_RATIO: f64 = 0.75;

const NANOS_PER_SECOND: f64 = 1e9;

/// Per-session verdict and QoE metrics.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub valid: bool,
    /// False when the walk was cut short by a timing gap or a non-fatal
    /// tolerance breach.
    pub full_extent: bool,
    /// Wall-clock span of the whole timeline, seconds.
    pub time_extent: f64,
    /// Seconds from the timeline base to the last confirmed playback.
    pub total_since_startup: f64,
    /// `total_since_startup` minus the startup delay.
    pub total_since_first_play: f64,
    /// Total seconds spent in closed stall intervals.
    pub stall_since_first_play: f64,
    pub event_count: usize,
    /// Diagnostic trail accumulated during the walk.
    pub trail: String,
}

impl SessionSummary {
    fn new(event_count: usize) -> Self {
        Self {
            valid: false,
            full_extent: true,
            time_extent: 0.0,
            total_since_startup: 0.0,
            total_since_first_play: 0.0,
            stall_since_first_play: 0.0,
            event_count,
            trail: String::new(),
        }
    }

    #[must_use]
    pub const fn verdict(&self) -> &'static str {
        if self.valid { "good" } else { "bad" }
    }

    #[must_use]
    pub const fn extent_label(&self) -> &'static str {
        if self.full_extent { "full" } else { "trunc" }
    }
}

/// Magnitude-scaled drift check between an expected and a reported counter.
/// Below 30 the tolerance is an absolute 10; above it grows proportionally.
/// Symmetric in its arguments.
#[must_use]
pub fn too_far_apart(a: f64, b: f64) -> bool {
    let diff = (a - b).abs();
    let bigger = a.max(b);
    if bigger < 30.0 {
        diff > 10.0
    } else {
        diff / bigger > 10.0 / 30.0
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "nanosecond deltas within one session are far below 2^52"
)]
fn relative_seconds(timestamp: u64, base: u64) -> f64 {
    (timestamp - base) as f64 / NANOS_PER_SECOND
}

/// Walks one session's chronologically ordered events and produces its
/// verdict.
#[must_use]
pub fn summarize(events: &[(u64, &TelemetryEvent)]) -> SessionSummary {
    let mut summary = SessionSummary::new(events.len());

    let (Some(&(base_time, _)), Some(&(end_time, _))) = (events.first(), events.last()) else {
        summary.trail.push_str(" never played");
        return summary;
    };
    summary.time_extent = relative_seconds(end_time, base_time);

    // The walk begins just past the first init event. Relative times are
    // measured from the first element regardless.
    let mut index = match events
        .iter()
        .position(|(_, event)| event.kind == Some(EventKind::Init))
    {
        Some(init_index) => init_index + 1,
        None => {
            summary.trail.push_str(" [warning: no init event found]");
            0
        }
    };

    let mut last_sample = 0.0_f64;
    let mut play_started: Option<f64> = None;
    let mut stall_started: Option<f64> = None;
    let mut latest_play: Option<f64> = None;
    let mut startup_delay: Option<f64> = None;
    let mut expected_cum_rebuf = 0.0_f64;
    let mut total_time_stalled = 0.0_f64;

    while index < events.len() {
        let (timestamp, event) = events[index];
        index += 1;

        let relative_time = relative_seconds(timestamp, base_time);

        if relative_time - last_sample > MAX_SAMPLE_GAP_SECONDS {
            let _ = write!(
                summary.trail,
                " time_between_events={:.3}",
                relative_time - last_sample
            );
            summary.full_extent = false;
            break;
        }

        // Grouping only admits complete events.
        let (Some(kind), Some(cum_rebuf)) = (event.kind, event.cum_rebuf) else {
            break;
        };

        match kind {
            EventKind::Init => {
                summary.trail.push_str(" two init events in this session");
                return summary;
            }
            EventKind::Startup => {
                if startup_delay.is_some() {
                    summary.trail.push_str(" startup after already started");
                    return summary;
                }

                play_started = Some(relative_time);
                startup_delay = Some(cum_rebuf);
                latest_play = Some(relative_time);
                expected_cum_rebuf = relative_time;
                if too_far_apart(expected_cum_rebuf, cum_rebuf) {
                    let _ = write!(
                        summary.trail,
                        " startup cum_rebuf expectation mismatch {cum_rebuf:.3} vs. {expected_cum_rebuf:.3}"
                    );
                    return summary;
                }
                let _ = write!(
                    summary.trail,
                    " startup_delay={cum_rebuf:.3}@{relative_time:.3}"
                );
            }
            EventKind::Play => {
                if startup_delay.is_none() {
                    summary.trail.push_str(" play without startup");
                    return summary;
                }
                if play_started.is_some() {
                    summary.trail.push_str(" two play events with no stall");
                    return summary;
                }
                let Some(stall_start) = stall_started else {
                    summary.trail.push_str(" stall_started has no value");
                    return summary;
                };

                play_started = Some(relative_time);
                latest_play = Some(relative_time);
                let _ = write!(summary.trail, " stalled={:.3}", relative_time - stall_start);
                total_time_stalled += relative_time - stall_start;
                stall_started = None;
                expected_cum_rebuf += relative_time - last_sample;
            }
            EventKind::Timer => {
                if stall_started.is_some() {
                    expected_cum_rebuf += relative_time - last_sample;
                } else if play_started.is_some() {
                    latest_play = Some(relative_time);
                }

                // Drift on a heartbeat truncates the walk without
                // invalidating the session.
                if too_far_apart(expected_cum_rebuf, cum_rebuf) {
                    let _ = write!(
                        summary.trail,
                        " timer cum_rebuf expectation mismatch {cum_rebuf:.3} vs. {expected_cum_rebuf:.3}"
                    );
                    summary.full_extent = false;
                    break;
                }
            }
            EventKind::Rebuffer => {
                if startup_delay.is_none() {
                    summary.trail.push_str(" stall without startup");
                    return summary;
                }
                if stall_started.is_some() {
                    summary.trail.push_str(" two stall events with no play");
                    return summary;
                }
                let Some(play_start) = play_started else {
                    summary.trail.push_str(" play_started has no value");
                    return summary;
                };

                stall_started = Some(relative_time);
                let _ = write!(summary.trail, " played={:.3}", relative_time - play_start);
                latest_play = Some(relative_time);
                play_started = None;
            }
        }

        last_sample = relative_time;
    }

    let (Some(latest), Some(startup)) = (latest_play, startup_delay) else {
        summary.trail.push_str(" never played");
        return summary;
    };

    if let Some(play_start) = play_started {
        if latest > play_start {
            let _ = write!(summary.trail, " played={:.3}", latest - play_start);
        }
    }

    let duration_since_first_play = latest - startup;
    summary.total_since_startup = latest;
    summary.total_since_first_play = duration_since_first_play;
    summary.stall_since_first_play = total_time_stalled;

    if total_time_stalled / duration_since_first_play > MAX_STALL_RATIO {
        summary.trail.push_str(" >75% stalled");
        return summary;
    }

    let _ = write!(
        summary.trail,
        " total_since_startup={duration_since_first_play:.3} stalltime={total_time_stalled:.3} startup={startup:.3}"
    );
    summary.valid = true;
    summary
}

/// Validates every session in parallel. Timelines are disjoint and
/// read-only, so the fan-out shares nothing; results come back in key
/// order.
#[must_use]
pub fn summarize_sessions(
    sessions: &BTreeMap<SessionKey, Timeline<'_>>,
) -> Vec<(SessionKey, SessionSummary)> {
    let ordered: Vec<(&SessionKey, &Timeline<'_>)> = sessions.iter().collect();
    ordered
        .par_iter()
        .map(|(key, events)| (**key, summarize(events)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TelemetryEvent;

    const SECOND: u64 = 1_000_000_000;

    fn event(kind: EventKind, cum_rebuf: f64) -> TelemetryEvent {
        TelemetryEvent {
            init_id: Some(1),
            expt_id: Some(1),
            user_id: Some(0),
            kind: Some(kind),
            buffer: Some(5.0),
            cum_rebuf: Some(cum_rebuf),
            ..TelemetryEvent::default()
        }
    }

    fn timeline(spec: &[(u64, EventKind, f64)]) -> Vec<TelemetryEvent> {
        spec.iter().map(|&(_, kind, cum)| event(kind, cum)).collect()
    }

    fn summarize_spec(spec: &[(u64, EventKind, f64)]) -> SessionSummary {
        let events = timeline(spec);
        let paired: Vec<(u64, &TelemetryEvent)> = spec
            .iter()
            .zip(events.iter())
            .map(|(&(ts, _, _), event)| (ts, event))
            .collect();
        summarize(&paired)
    }

    #[test]
    fn tolerance_is_symmetric() {
        for (a, b) in [(5.0, 20.0), (20.0, 25.0), (10.0, 50.0), (0.0, 0.0), (100.0, 90.0)] {
            assert_eq!(too_far_apart(a, b), too_far_apart(b, a), "asymmetric for {a} {b}");
        }
    }

    #[test]
    fn tolerance_has_absolute_floor_and_relative_regime() {
        // max below 30: absolute tolerance of 10
        assert!(too_far_apart(5.0, 20.0));
        assert!(!too_far_apart(20.0, 25.0));
        // max at or above 30: relative tolerance of 1/3
        assert!(too_far_apart(10.0, 50.0));
        assert!(!too_far_apart(90.0, 100.0));
    }

    #[test]
    fn clean_session_is_valid_with_expected_metrics() {
        // init, startup, timer during play, stall, recovery
        let summary = summarize_spec(&[
            (SECOND, EventKind::Init, 0.0),
            (2 * SECOND, EventKind::Startup, 0.0),
            (5 * SECOND, EventKind::Timer, 0.0),
            (7 * SECOND, EventKind::Rebuffer, 0.0),
            (9 * SECOND, EventKind::Play, 2.0),
        ]);

        assert!(summary.valid, "trail: {}", summary.trail);
        assert!(summary.full_extent);
        assert!((summary.time_extent - 8.0).abs() < 1e-9);
        assert!((summary.stall_since_first_play - 2.0).abs() < 1e-9);
        assert!((summary.total_since_startup - 8.0).abs() < 1e-9);
        assert!((summary.total_since_first_play - 8.0).abs() < 1e-9);
        assert!(summary.trail.contains("startup_delay=0.000@1.000"));
        assert!(summary.trail.contains("stalled=2.000"));
    }

    #[test]
    fn valid_summaries_keep_stall_below_total() {
        let summary = summarize_spec(&[
            (0, EventKind::Init, 0.0),
            (SECOND, EventKind::Startup, 0.0),
            (3 * SECOND, EventKind::Rebuffer, 0.0),
            (4 * SECOND, EventKind::Play, 1.0),
            (6 * SECOND, EventKind::Timer, 1.0),
        ]);
        assert!(summary.valid, "trail: {}", summary.trail);
        assert!(summary.stall_since_first_play >= 0.0);
        assert!(summary.stall_since_first_play <= summary.total_since_startup);
    }

    #[test]
    fn second_init_mid_session_is_invalid() {
        let summary = summarize_spec(&[
            (0, EventKind::Init, 0.0),
            (SECOND, EventKind::Startup, 0.0),
            (2 * SECOND, EventKind::Init, 0.0),
        ]);
        assert!(!summary.valid);
        assert!(summary.trail.contains("two init events in this session"));
    }

    #[test]
    fn second_startup_is_invalid() {
        let summary = summarize_spec(&[
            (0, EventKind::Init, 0.0),
            (SECOND, EventKind::Startup, 0.0),
            (2 * SECOND, EventKind::Startup, 0.0),
        ]);
        assert!(!summary.valid);
        assert!(summary.trail.contains("startup after already started"));
    }

    #[test]
    fn play_without_startup_is_invalid() {
        let summary = summarize_spec(&[
            (0, EventKind::Init, 0.0),
            (SECOND, EventKind::Play, 0.0),
        ]);
        assert!(!summary.valid);
        assert!(summary.trail.contains("play without startup"));
    }

    #[test]
    fn session_that_never_plays_is_invalid() {
        let summary = summarize_spec(&[
            (0, EventKind::Init, 0.0),
            (SECOND, EventKind::Timer, 0.0),
            (2 * SECOND, EventKind::Timer, 0.0),
        ]);
        assert!(!summary.valid);
        assert!(summary.trail.contains("never played"));
    }

    #[test]
    fn missing_init_warns_but_still_walks() {
        let summary = summarize_spec(&[
            (0, EventKind::Startup, 0.0),
            (2 * SECOND, EventKind::Timer, 0.0),
        ]);
        assert!(summary.trail.contains("no init event found"));
        assert!(summary.valid, "trail: {}", summary.trail);
    }

    #[test]
    fn sample_gap_truncates_but_keeps_partial_verdict() {
        let summary = summarize_spec(&[
            (0, EventKind::Init, 0.0),
            (SECOND, EventKind::Startup, 0.0),
            (3 * SECOND, EventKind::Timer, 0.0),
            (20 * SECOND, EventKind::Timer, 0.0),
        ]);
        assert!(!summary.full_extent);
        assert!(summary.trail.contains("time_between_events"));
        // the partial state still reaches the post-walk checks
        assert!(summary.valid, "trail: {}", summary.trail);
        assert!((summary.total_since_startup - 3.0).abs() < 1e-9);
    }

    #[test]
    fn timer_drift_truncates_without_invalidating() {
        let summary = summarize_spec(&[
            (0, EventKind::Init, 0.0),
            (SECOND, EventKind::Startup, 0.0),
            (3 * SECOND, EventKind::Timer, 50.0),
        ]);
        assert!(!summary.full_extent);
        assert!(summary.trail.contains("timer cum_rebuf expectation mismatch"));
        assert!(summary.valid, "trail: {}", summary.trail);
    }

    #[test]
    fn startup_drift_is_invalid() {
        let summary = summarize_spec(&[
            (0, EventKind::Init, 0.0),
            (SECOND, EventKind::Startup, 40.0),
        ]);
        assert!(!summary.valid);
        assert!(summary.trail.contains("startup cum_rebuf expectation mismatch"));
    }

    #[test]
    fn excess_stalling_is_invalid_but_carries_metrics() {
        // stalled 4s of a 5s play window: 80% > 75%
        let summary = summarize_spec(&[
            (0, EventKind::Init, 0.0),
            (SECOND, EventKind::Startup, 0.0),
            (2 * SECOND, EventKind::Rebuffer, 0.0),
            (6 * SECOND, EventKind::Play, 4.0),
        ]);
        assert!(!summary.valid, "trail: {}", summary.trail);
        assert!(summary.trail.contains(">75% stalled"));
        assert!((summary.stall_since_first_play - 4.0).abs() < 1e-9);
    }

    #[test]
    fn double_stall_and_double_play_are_invalid() {
        let double_stall = summarize_spec(&[
            (0, EventKind::Init, 0.0),
            (SECOND, EventKind::Startup, 0.0),
            (2 * SECOND, EventKind::Rebuffer, 0.0),
            (3 * SECOND, EventKind::Rebuffer, 0.0),
        ]);
        assert!(!double_stall.valid);
        assert!(double_stall.trail.contains("two stall events with no play"));

        let double_play = summarize_spec(&[
            (0, EventKind::Init, 0.0),
            (SECOND, EventKind::Startup, 0.0),
            (2 * SECOND, EventKind::Play, 0.0),
        ]);
        assert!(!double_play.valid);
        assert!(double_play.trail.contains("two play events with no stall"));
    }

    #[test]
    fn stall_without_startup_is_invalid() {
        let summary = summarize_spec(&[
            (0, EventKind::Init, 0.0),
            (SECOND, EventKind::Rebuffer, 0.0),
        ]);
        assert!(!summary.valid);
        assert!(summary.trail.contains("stall without startup"));
    }
}
