// src/history.rs
//! Read-only aggregations over the full session history. Calendar logic
//! runs in the time zone of the `now` argument; entries are converted into
//! it before their date is taken.

use crate::catalog::{Catalog, Muscle, WorkoutType};
use crate::model::{HistoryEntry, SetRecord};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use strum::IntoEnumIterator;

pub const HEATMAP_WEEKS: usize = 12;
pub const PROGRESS_CHART_POINTS: usize = 10;
const ACTIVITY_WINDOW_DAYS: i64 = 7;

/// Most recent entry for `workout_id` by completion time.
pub fn last_session<'a>(history: &'a [HistoryEntry], workout_id: &str) -> Option<&'a HistoryEntry> {
    history
        .iter()
        .filter(|h| h.workout_id == workout_id)
        .max_by_key(|h| h.timestamp)
}

/// Heaviest completed set ever logged under exactly this exercise name,
/// whichever workout it came from. `0` when never logged.
pub fn personal_record(history: &[HistoryEntry], exercise_name: &str) -> f64 {
    history
        .iter()
        .flat_map(|h| h.exercises.values())
        .filter(|ex| ex.name == exercise_name)
        .flat_map(|ex| ex.sets.iter())
        .map(|s| s.weight.value())
        .fold(0.0, f64::max)
}

/// Epley one-rep-max estimate, rounded to one decimal.
pub fn estimated_1rm(weight: f64, reps: f64) -> f64 {
    if reps <= 0.0 || weight <= 0.0 {
        return 0.0;
    }
    if (reps - 1.0).abs() < f64::EPSILON {
        return weight;
    }
    (weight * (1.0 + reps / 30.0) * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrBoardEntry {
    pub exercise: String,
    pub weight: f64,
    pub reps: f64,
    pub estimated_1rm: f64,
    pub timestamp: DateTime<Utc>,
}

/// Best estimated 1RM per exercise name, strongest first. Equal estimates
/// keep the order in which the exercises first appear in the history.
pub fn pr_board(history: &[HistoryEntry]) -> Vec<PrBoardEntry> {
    let mut board: Vec<PrBoardEntry> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for entry in history {
        for ex in entry.exercises.values() {
            for set in &ex.sets {
                let weight = set.weight.value();
                let reps = set.reps.value();
                let e1rm = estimated_1rm(weight, reps);
                if e1rm <= 0.0 {
                    continue;
                }
                let candidate = PrBoardEntry {
                    exercise: ex.name.clone(),
                    weight,
                    reps,
                    estimated_1rm: e1rm,
                    timestamp: entry.timestamp,
                };
                match index.get(ex.name.as_str()) {
                    Some(&i) if board[i].estimated_1rm < e1rm => board[i] = candidate,
                    Some(_) => {}
                    None => {
                        index.insert(ex.name.as_str(), board.len());
                        board.push(candidate);
                    }
                }
            }
        }
    }

    board.sort_by(|a, b| b.estimated_1rm.total_cmp(&a.estimated_1rm));
    board
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn local_date<Tz: TimeZone>(ts: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    ts.with_timezone(tz).date_naive()
}

/// Distinct local calendar days with at least one session.
pub fn session_dates<Tz: TimeZone>(history: &[HistoryEntry], tz: &Tz) -> BTreeSet<NaiveDate> {
    history.iter().map(|h| local_date(h.timestamp, tz)).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyStats {
    pub sessions_this_week: usize,
    pub target: u32,
    pub volume_this_week: f64,
    pub volume_last_week: f64,
    /// Percent change against last week; `0` when last week had no volume.
    pub volume_change: f64,
}

/// Monday-to-Sunday stats for the week containing `now`, against the
/// previous week.
pub fn weekly_stats<Tz: TimeZone>(history: &[HistoryEntry], now: &DateTime<Tz>, target: u32) -> WeeklyStats {
    let tz = now.timezone();
    let this_week = week_start(now.date_naive());
    let next_week = this_week + Duration::days(7);
    let last_week = this_week - Duration::days(7);

    let mut sessions_this_week = 0;
    let mut volume_this_week = 0.0;
    let mut volume_last_week = 0.0;
    for entry in history {
        let day = local_date(entry.timestamp, &tz);
        if day >= this_week && day < next_week {
            sessions_this_week += 1;
            volume_this_week += entry.volume();
        } else if day >= last_week && day < this_week {
            volume_last_week += entry.volume();
        }
    }

    let volume_change = if volume_last_week > 0.0 {
        (volume_this_week - volume_last_week) / volume_last_week * 100.0
    } else {
        0.0
    };

    WeeklyStats {
        sessions_this_week,
        target,
        volume_this_week,
        volume_last_week,
        volume_change,
    }
}

/// Consecutive days with a session, walking back from today. A day with no
/// session yet does not break the streak until it has passed.
pub fn current_streak<Tz: TimeZone>(history: &[HistoryEntry], now: &DateTime<Tz>) -> u32 {
    let dates = session_dates(history, &now.timezone());
    let today = now.date_naive();
    let mut day = if dates.contains(&today) {
        Some(today)
    } else {
        today.pred_opt()
    };
    let mut streak = 0;
    while let Some(d) = day.filter(|d| dates.contains(d)) {
        streak += 1;
        day = d.pred_opt();
    }
    streak
}

pub fn longest_streak<Tz: TimeZone>(history: &[HistoryEntry], tz: &Tz) -> u32 {
    let mut longest = 0;
    let mut current = 0;
    let mut prev: Option<NaiveDate> = None;
    for day in session_dates(history, tz) {
        current = match prev {
            Some(p) if p.succ_opt() == Some(day) => current + 1,
            _ => 1,
        };
        longest = longest.max(current);
        prev = Some(day);
    }
    longest
}

/// Sessions per muscle group over the trailing seven days.
pub fn muscle_activity<Tz: TimeZone>(history: &[HistoryEntry], now: &DateTime<Tz>) -> BTreeMap<Muscle, u32> {
    let now_utc = now.with_timezone(&Utc);
    let window_start = now_utc - Duration::days(ACTIVITY_WINDOW_DAYS);
    let mut activity: BTreeMap<Muscle, u32> = Muscle::iter().map(|m| (m, 0)).collect();
    for entry in history
        .iter()
        .filter(|h| h.timestamp >= window_start && h.timestamp <= now_utc)
    {
        let Some(workout_type) = WorkoutType::from_workout_id(&entry.workout_id) else {
            continue;
        };
        for muscle in workout_type.muscles() {
            *activity.entry(*muscle).or_insert(0) += 1;
        }
    }
    activity
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeatmapCell {
    pub date: NaiveDate,
    pub sessions: u32,
    /// Day after today. Rendered as a neutral cell, never as zero activity.
    pub future: bool,
}

/// Twelve Monday-first weeks ending with the current week, oldest first.
pub fn calendar_heatmap<Tz: TimeZone>(history: &[HistoryEntry], now: &DateTime<Tz>) -> Vec<[HeatmapCell; 7]> {
    let tz = now.timezone();
    let today = now.date_naive();
    let mut counts: HashMap<NaiveDate, u32> = HashMap::new();
    for entry in history {
        *counts.entry(local_date(entry.timestamp, &tz)).or_insert(0) += 1;
    }

    let first_monday = week_start(today) - Duration::weeks(HEATMAP_WEEKS as i64 - 1);
    (0..HEATMAP_WEEKS)
        .map(|w| {
            let monday = first_monday + Duration::weeks(w as i64);
            std::array::from_fn(|d| {
                let date = monday + Duration::days(d as i64);
                let future = date > today;
                HeatmapCell {
                    date,
                    sessions: if future { 0 } else { counts.get(&date).copied().unwrap_or(0) },
                    future,
                }
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressPoint {
    pub timestamp: DateTime<Utc>,
    pub max_weight: f64,
    pub best_set: SetRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseProgress {
    pub name: String,
    pub best_weight: f64,
    /// Latest session's top weight minus the first one's; `0` with a single session.
    pub improvement: f64,
    pub sessions: usize,
    /// Most recent points only, oldest first.
    pub chart: Vec<ProgressPoint>,
}

/// Top weight per session for every exercise name, in order of first
/// appearance. Sessions without any weight are skipped.
pub fn exercise_progress(history: &[HistoryEntry]) -> Vec<ExerciseProgress> {
    let mut order: Vec<&str> = Vec::new();
    let mut points: HashMap<&str, Vec<ProgressPoint>> = HashMap::new();

    for entry in history {
        for ex in entry.exercises.values() {
            let Some(best_set) = ex
                .sets
                .iter()
                .fold(None::<&SetRecord>, |best, s| match best {
                    Some(b) if b.weight.value() >= s.weight.value() => Some(b),
                    _ => Some(s),
                })
            else {
                continue;
            };
            if !points.contains_key(ex.name.as_str()) {
                order.push(ex.name.as_str());
            }
            let max_weight = best_set.weight.value();
            let series = points.entry(ex.name.as_str()).or_default();
            if max_weight > 0.0 {
                series.push(ProgressPoint {
                    timestamp: entry.timestamp,
                    max_weight,
                    best_set: best_set.clone(),
                });
            }
        }
    }

    order
        .into_iter()
        .filter_map(|name| {
            let mut series = points.remove(name)?;
            if series.is_empty() {
                return None;
            }
            series.sort_by_key(|p| p.timestamp);
            let best_weight = series.iter().map(|p| p.max_weight).fold(0.0, f64::max);
            let improvement = match (series.first(), series.last()) {
                (Some(first), Some(last)) if series.len() > 1 => last.max_weight - first.max_weight,
                _ => 0.0,
            };
            let sessions = series.len();
            let chart = series.split_off(sessions.saturating_sub(PROGRESS_CHART_POINTS));
            Some(ExerciseProgress {
                name: name.to_string(),
                best_weight,
                improvement,
                sessions,
                chart,
            })
        })
        .collect()
}

/// [`exercise_progress`] restricted to exercises that appear in any catalog
/// workout of `workout_type`.
pub fn exercise_progress_for_type(
    history: &[HistoryEntry],
    catalog: &Catalog,
    workout_type: WorkoutType,
) -> Vec<ExerciseProgress> {
    let names: BTreeSet<&str> = catalog
        .of_type(workout_type)
        .flat_map(|w| w.exercises.iter().map(|e| e.name.as_str()))
        .collect();
    exercise_progress(history)
        .into_iter()
        .filter(|p| names.contains(p.name.as_str()))
        .collect()
}

/// Entries grouped by local completion date, newest day and entry first.
pub fn sessions_by_day<'a, Tz: TimeZone>(
    history: &'a [HistoryEntry],
    tz: &Tz,
) -> Vec<(NaiveDate, Vec<&'a HistoryEntry>)> {
    let mut sorted: Vec<&HistoryEntry> = history.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut days: Vec<(NaiveDate, Vec<&HistoryEntry>)> = Vec::new();
    for entry in sorted {
        let day = local_date(entry.timestamp, tz);
        match days.last_mut() {
            Some((d, entries)) if *d == day => entries.push(entry),
            _ => days.push((day, vec![entry])),
        }
    }
    days
}

/// Attaches `note` to the entry with `entry_id`; a blank note clears it.
/// Returns `false` when no entry has that id.
pub fn set_note(history: &mut [HistoryEntry], entry_id: &str, note: &str) -> bool {
    let Some(entry) = history.iter_mut().find(|h| h.id == entry_id) else {
        return false;
    };
    let trimmed = note.trim();
    entry.notes = (!trimmed.is_empty()).then(|| trimmed.to_string());
    true
}

/// Removes and returns the entry with `entry_id`.
pub fn delete_entry(history: &mut Vec<HistoryEntry>, entry_id: &str) -> Option<HistoryEntry> {
    let pos = history.iter().position(|h| h.id == entry_id)?;
    Some(history.remove(pos))
}
