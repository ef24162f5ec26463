// src/timer.rs
//! Pull-based timers. Nothing here spawns a thread or registers a callback;
//! the presentation layer polls once a second and the values are derived
//! from the injected [`Clock`], so tests can step time deterministically.

use crate::clock::SharedClock;
use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestTimerState {
    Hidden,
    Running,
    /// Countdown reached zero and keeps counting past it.
    Overtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestTimerEvent {
    /// Countdown hit zero. Emitted once per run.
    Done,
}

#[derive(Debug, Clone, Copy)]
struct Run {
    started_at: DateTime<Utc>,
    seconds: u32,
    done_fired: bool,
}

/// Countdown between sets. At most one run is active; starting a new one
/// replaces the previous run outright.
pub struct RestTimer {
    clock: SharedClock,
    run: Option<Run>,
}

impl RestTimer {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock, run: None }
    }

    pub fn start(&mut self, seconds: u32) {
        debug!(seconds, "Starting rest timer");
        self.run = Some(Run {
            started_at: self.clock.now(),
            seconds,
            done_fired: false,
        });
    }

    /// Stops the countdown from any state. Stopping a stopped timer is a no-op.
    pub fn skip(&mut self) {
        if self.run.take().is_some() {
            debug!("Rest timer skipped");
        }
    }

    pub const fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Seconds left, negative once over time. `None` while hidden.
    pub fn remaining_seconds(&self) -> Option<i64> {
        self.run.map(|run| {
            let elapsed = (self.clock.now() - run.started_at).num_seconds().max(0);
            i64::from(run.seconds) - elapsed
        })
    }

    pub fn state(&self) -> RestTimerState {
        match self.remaining_seconds() {
            None => RestTimerState::Hidden,
            Some(r) if r > 0 => RestTimerState::Running,
            Some(_) => RestTimerState::Overtime,
        }
    }

    /// Advances the state machine. Returns [`RestTimerEvent::Done`] the first
    /// time the countdown is observed at or below zero.
    pub fn poll(&mut self) -> Option<RestTimerEvent> {
        let remaining = self.remaining_seconds()?;
        let run = self.run.as_mut()?;
        if remaining <= 0 && !run.done_fired {
            run.done_fired = true;
            debug!("Rest timer done");
            return Some(RestTimerEvent::Done);
        }
        None
    }

    pub fn display(&self) -> Option<String> {
        self.remaining_seconds().map(format_countdown)
    }
}

/// `m:ss`, with a leading `+` when the value is over time (negative).
pub fn format_countdown(seconds: i64) -> String {
    let abs = seconds.unsigned_abs();
    let prefix = if seconds < 0 { "+" } else { "" };
    format!("{prefix}{}:{:02}", abs / 60, abs % 60)
}

/// Wall-clock elapsed time of the active workout.
pub struct ElapsedTicker {
    clock: SharedClock,
    started_at: Option<DateTime<Utc>>,
}

impl ElapsedTicker {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            started_at: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(self.clock.now());
    }

    /// Idempotent.
    pub fn cancel(&mut self) {
        self.started_at = None;
    }

    pub const fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.started_at.map_or(0, |start| {
            u64::try_from((self.clock.now() - start).num_seconds()).unwrap_or(0)
        })
    }
}
