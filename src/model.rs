// src/model.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parses user-entered numeric text permissively.
/// Empty, partial or otherwise unparseable input counts as `0`.
#[must_use]
pub fn parse_decimal(text: &str) -> f64 {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Raw text of a weight or reps field exactly as the user typed it.
///
/// Storage never coerces this to a number because a set can sit in a
/// half-typed state ("", "6", "62.") while the session is running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawNumber(String);

impl RawNumber {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Numeric value, `0` when empty or unparseable.
    pub fn value(&self) -> f64 {
        parse_decimal(&self.0)
    }
}

impl From<&str> for RawNumber {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RawNumber {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RawNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetRecord {
    pub weight: RawNumber,
    pub reps: RawNumber,
    pub done: bool,
}

impl SetRecord {
    /// Volume contributed by this set (`weight * reps`).
    pub fn volume(&self) -> f64 {
        self.weight.value() * self.reps.value()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupItem {
    pub name: String,
    pub sets: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseDefinition {
    /// Single-letter key, stable across sessions of the same workout.
    pub order: String,
    pub name: String,
    pub sets_config: String,
    #[serde(default)]
    pub tempo: String,
    #[serde(default)]
    pub rest: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub warmup: Vec<WarmupItem>,
    pub exercises: Vec<ExerciseDefinition>,
}

impl WorkoutDefinition {
    pub fn exercise(&self, order: &str) -> Option<&ExerciseDefinition> {
        self.exercises.iter().find(|ex| ex.order == order)
    }
}

/// Completed sets of one exercise inside a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedExercise {
    pub name: String,
    pub sets: Vec<SetRecord>,
}

impl LoggedExercise {
    pub fn best_weight(&self) -> f64 {
        self.sets
            .iter()
            .map(|s| s.weight.value())
            .fold(0.0, f64::max)
    }

    pub fn volume(&self) -> f64 {
        self.sets.iter().map(SetRecord::volume).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub workout_id: String,
    pub workout_name: String,
    /// Session completion time, epoch milliseconds on the wire.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Whole minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    pub exercises: BTreeMap<String, LoggedExercise>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl HistoryEntry {
    pub fn total_sets(&self) -> usize {
        self.exercises.values().map(|ex| ex.sets.len()).sum()
    }

    pub fn volume(&self) -> f64 {
        self.exercises.values().map(LoggedExercise::volume).sum()
    }
}

/// One body-weight reading per calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyWeightEntry {
    pub date: NaiveDate,
    pub weight: f64,
}

/// Base-36 encoding of the epoch milliseconds, used for generated ids.
pub fn time_id(ts: DateTime<Utc>) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut n = u64::try_from(ts.timestamp_millis()).unwrap_or(0);
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
