// src/session.rs
//! The in-progress workout: per-exercise set arrays, pre-fill from the last
//! session, personal-record checks and the rest timer.

use crate::catalog::Catalog;
use crate::clock::SharedClock;
use crate::history::{last_session, personal_record};
use crate::model::{time_id, ExerciseDefinition, HistoryEntry, LoggedExercise, RawNumber, SetRecord, WorkoutDefinition};
use crate::parse::{is_no_rest, parse_rep_ranges, parse_rest_seconds_or, parse_set_count, DEFAULT_REST_SECONDS};
use crate::timer::{ElapsedTicker, RestTimer};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, info};

/// Weight added to a pre-filled set whose previous reps topped the range.
pub const DEFAULT_OVERLOAD_INCREMENT: f64 = 2.5;

/// Tunables a session reads from the user's config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub overload_increment: f64,
    pub default_rest_seconds: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            overload_increment: DEFAULT_OVERLOAD_INCREMENT,
            default_rest_seconds: DEFAULT_REST_SECONDS,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Workout not found: {0}")]
    NotFound(String),
    #[error("No workout in progress")]
    NoActiveSession,
    #[error("Exercise '{0}' is not part of this workout")]
    UnknownExercise(String),
    #[error("Set {index} does not exist for exercise '{order}'")]
    SetOutOfRange { order: String, index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SetField {
    #[strum(serialize = "weight", serialize = "w")]
    Weight,
    #[strum(serialize = "reps", serialize = "r")]
    Reps,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExerciseSession {
    pub sets: Vec<SetRecord>,
}

impl ExerciseSession {
    pub fn is_complete(&self) -> bool {
        !self.sets.is_empty() && self.sets.iter().all(|s| s.done)
    }

    pub fn completed_sets(&self) -> impl Iterator<Item = &SetRecord> {
        self.sets.iter().filter(|s| s.done)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrEvent {
    pub exercise: String,
    pub weight: f64,
}

/// What happened when a set was ticked or unticked.
#[derive(Debug, Clone, PartialEq)]
pub struct ToggleOutcome {
    pub done: bool,
    pub personal_record: Option<PrEvent>,
    /// Rest period started as a side effect, in seconds.
    pub rest_started: Option<u32>,
    pub exercise_complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrDelta {
    pub exercise: String,
    pub weight: f64,
    pub previous: f64,
}

/// This session against the previous one of the same workout.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub previous_timestamp: DateTime<Utc>,
    pub volume_delta: f64,
    pub sets_delta: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutSummary {
    pub name: String,
    pub exercise_count: usize,
    pub total_sets: usize,
    pub total_volume: f64,
    pub duration_minutes: u32,
    pub personal_records: Vec<PrDelta>,
    pub comparison: Option<Comparison>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    /// Nothing was completed; nothing is written.
    Abandoned,
    Finished {
        entry: HistoryEntry,
        summary: WorkoutSummary,
    },
}

pub struct Session {
    workout: WorkoutDefinition,
    exercises: BTreeMap<String, ExerciseSession>,
    ticker: ElapsedTicker,
    rest_timer: RestTimer,
    clock: SharedClock,
    settings: SessionSettings,
}

impl Session {
    /// Starts `workout_id` and initializes every exercise from `history`.
    /// # Errors
    /// Returns `SessionError::NotFound` if the catalog has no such workout.
    pub fn start(
        catalog: &Catalog,
        workout_id: &str,
        history: &[HistoryEntry],
        clock: SharedClock,
        settings: SessionSettings,
    ) -> Result<Self, SessionError> {
        let workout = catalog
            .find(workout_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(workout_id.to_string()))?;
        info!("Starting workout '{}' ({})", workout.name, workout.id);

        let mut ticker = ElapsedTicker::new(clock.clone());
        ticker.start();
        let mut session = Self {
            workout,
            exercises: BTreeMap::new(),
            ticker,
            rest_timer: RestTimer::new(clock.clone()),
            clock,
            settings,
        };
        let orders: Vec<String> = session.workout.exercises.iter().map(|e| e.order.clone()).collect();
        for order in orders {
            session.ensure_exercise_initialized(&order, history)?;
        }
        Ok(session)
    }

    pub const fn workout(&self) -> &WorkoutDefinition {
        &self.workout
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.ticker.started_at()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.ticker.elapsed_seconds()
    }

    pub fn exercise(&self, order: &str) -> Option<&ExerciseSession> {
        self.exercises.get(order)
    }

    pub fn is_exercise_complete(&self, order: &str) -> bool {
        self.exercises.get(order).is_some_and(ExerciseSession::is_complete)
    }

    pub fn completed_set_count(&self) -> usize {
        self.exercises.values().map(|ex| ex.completed_sets().count()).sum()
    }

    pub fn has_completed_sets(&self) -> bool {
        self.completed_set_count() > 0
    }

    pub const fn rest_timer(&self) -> &RestTimer {
        &self.rest_timer
    }

    pub fn rest_timer_mut(&mut self) -> &mut RestTimer {
        &mut self.rest_timer
    }

    pub fn skip_rest(&mut self) {
        self.rest_timer.skip();
    }

    fn definition(&self, order: &str) -> Result<&ExerciseDefinition, SessionError> {
        self.workout
            .exercise(order)
            .ok_or_else(|| SessionError::UnknownExercise(order.to_string()))
    }

    /// Allocates the set array for `order` if it does not exist yet. Weights
    /// and reps are copied from the latest session of this workout, set by
    /// set; a set whose previous reps reached the top of its rep range gets
    /// its weight bumped by the overload increment.
    /// # Errors
    /// Returns `SessionError::UnknownExercise` if `order` is not in the workout.
    pub fn ensure_exercise_initialized(
        &mut self,
        order: &str,
        history: &[HistoryEntry],
    ) -> Result<&ExerciseSession, SessionError> {
        if !self.exercises.contains_key(order) {
            let def = self.definition(order)?;
            let count = parse_set_count(&def.sets_config);
            let ranges = parse_rep_ranges(&def.sets_config);
            let previous: &[SetRecord] = last_session(history, &self.workout.id)
                .and_then(|h| h.exercises.get(order))
                .map(|ex| ex.sets.as_slice())
                .unwrap_or_default();

            let sets = (0..count)
                .map(|i| {
                    let Some(prev) = previous.get(i) else {
                        return SetRecord::default();
                    };
                    let mut weight = prev.weight.clone();
                    let hit_top = ranges
                        .get(i)
                        .copied()
                        .flatten()
                        .is_some_and(|range| prev.reps.value() >= f64::from(range.max));
                    if hit_top && prev.weight.value() > 0.0 {
                        weight = RawNumber::new(format_weight(prev.weight.value() + self.settings.overload_increment));
                    }
                    SetRecord {
                        weight,
                        reps: prev.reps.clone(),
                        done: false,
                    }
                })
                .collect();
            debug!(order, count, "Initialized exercise");
            self.exercises.insert(order.to_string(), ExerciseSession { sets });
        }
        self.exercises
            .get(order)
            .ok_or_else(|| SessionError::UnknownExercise(order.to_string()))
    }

    fn set_mut(&mut self, order: &str, index: usize) -> Result<&mut SetRecord, SessionError> {
        self.exercises
            .get_mut(order)
            .ok_or_else(|| SessionError::UnknownExercise(order.to_string()))?
            .sets
            .get_mut(index)
            .ok_or_else(|| SessionError::SetOutOfRange {
                order: order.to_string(),
                index,
            })
    }

    /// Stores `value` verbatim. A non-empty weight typed into the first set
    /// is copied into every later set whose weight is still empty.
    /// # Errors
    /// `UnknownExercise` / `SetOutOfRange` for addresses outside the workout.
    pub fn update_set(&mut self, order: &str, index: usize, field: SetField, value: &str) -> Result<(), SessionError> {
        let set = self.set_mut(order, index)?;
        match field {
            SetField::Weight => set.weight = RawNumber::from(value),
            SetField::Reps => set.reps = RawNumber::from(value),
        }
        debug!(order, index, %field, value, "Updated set");

        if field == SetField::Weight && index == 0 && !value.trim().is_empty() {
            if let Some(ex) = self.exercises.get_mut(order) {
                for later in ex.sets.iter_mut().skip(1).filter(|s| s.weight.is_empty()) {
                    later.weight = RawNumber::from(value);
                }
            }
        }
        Ok(())
    }

    /// Flips a set's done flag. Completing a set checks it against the
    /// all-time best for the exercise name and starts the rest timer unless
    /// the exercise has no fixed rest.
    /// # Errors
    /// `UnknownExercise` / `SetOutOfRange` for addresses outside the workout.
    pub fn toggle_set_done(
        &mut self,
        order: &str,
        index: usize,
        history: &[HistoryEntry],
    ) -> Result<ToggleOutcome, SessionError> {
        let (name, rest) = {
            let def = self.definition(order)?;
            (def.name.clone(), def.rest.clone())
        };
        let set = self.set_mut(order, index)?;
        set.done = !set.done;
        let done = set.done;
        let weight = set.weight.value();

        let mut pr_event = None;
        let mut rest_started = None;
        if done {
            if weight > personal_record(history, &name) {
                info!("New personal record for '{}': {}", name, weight);
                pr_event = Some(PrEvent {
                    exercise: name,
                    weight,
                });
            }
            if !is_no_rest(&rest) {
                let seconds = parse_rest_seconds_or(&rest, self.settings.default_rest_seconds);
                self.rest_timer.start(seconds);
                rest_started = Some(seconds);
            }
        }

        Ok(ToggleOutcome {
            done,
            personal_record: pr_event,
            rest_started,
            exercise_complete: self.is_exercise_complete(order),
        })
    }

    /// Discards the session without writing anything.
    pub fn abandon(mut self) {
        info!("Abandoned workout '{}'", self.workout.id);
        self.stop_timers();
    }

    fn stop_timers(&mut self) {
        self.rest_timer.skip();
        self.ticker.cancel();
    }

    /// Turns the session into a history entry plus a summary. `history` must
    /// not yet contain this session; personal records and the comparison are
    /// measured against it.
    pub fn finish(mut self, history: &[HistoryEntry]) -> FinishOutcome {
        if !self.has_completed_sets() {
            info!("No completed sets, abandoning '{}'", self.workout.id);
            self.stop_timers();
            return FinishOutcome::Abandoned;
        }

        let now = self.clock.now();
        let duration_minutes = u32::try_from(self.elapsed_seconds() / 60).unwrap_or(u32::MAX);
        self.stop_timers();

        let mut logged: BTreeMap<String, LoggedExercise> = BTreeMap::new();
        for def in &self.workout.exercises {
            let Some(session) = self.exercises.get(&def.order) else {
                continue;
            };
            let sets: Vec<SetRecord> = session.completed_sets().cloned().collect();
            if !sets.is_empty() {
                logged.insert(
                    def.order.clone(),
                    LoggedExercise {
                        name: def.name.clone(),
                        sets,
                    },
                );
            }
        }

        let entry = HistoryEntry {
            id: time_id(now),
            workout_id: self.workout.id.clone(),
            workout_name: self.workout.name.clone(),
            timestamp: now,
            duration: Some(duration_minutes),
            exercises: logged,
            notes: None,
        };

        let personal_records: Vec<PrDelta> = entry
            .exercises
            .values()
            .filter_map(|ex| {
                let best = ex.best_weight();
                let previous = personal_record(history, &ex.name);
                (best > previous).then(|| PrDelta {
                    exercise: ex.name.clone(),
                    weight: best,
                    previous,
                })
            })
            .collect();

        let total_sets = entry.total_sets();
        let total_volume = entry.volume();
        let comparison = last_session(history, &self.workout.id).map(|prev| Comparison {
            previous_timestamp: prev.timestamp,
            volume_delta: total_volume - prev.volume(),
            sets_delta: i64::try_from(total_sets).unwrap_or(i64::MAX)
                - i64::try_from(prev.total_sets()).unwrap_or(i64::MAX),
        });

        let summary = WorkoutSummary {
            name: self.workout.name.clone(),
            exercise_count: entry.exercises.len(),
            total_sets,
            total_volume,
            duration_minutes,
            personal_records,
            comparison,
        };
        info!(
            "Finished workout '{}': {} sets, volume {}",
            summary.name, summary.total_sets, summary.total_volume
        );
        FinishOutcome::Finished { entry, summary }
    }
}

/// Renders a weight without float noise ("62.5", "65").
pub fn format_weight(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded}")
}
