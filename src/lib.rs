// src/lib.rs
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{info, warn};

// --- Declare modules ---
pub mod bodyweight;
pub mod catalog;
pub mod clock;
mod config;
pub mod db;
pub mod history;
pub mod mirror;
pub mod model;
pub mod parse;
pub mod session;
pub mod timer;

// --- Expose public types ---
pub use bodyweight::BodyWeightSummary;
pub use catalog::{Catalog, Error as CatalogError, Muscle, WorkoutType};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    get_config_path as get_config_path_util, load_config as load_config_util, parse_color,
    save_config as save_config_util, Config, ConfigError, MirrorConfig, StandardColor, Theme, Units,
};
pub use db::{get_db_path as get_db_path_util, Error as DbError, MemoryStorage, SqliteStorage, Storage, StorageKey};
pub use history::{ExerciseProgress, HeatmapCell, PrBoardEntry, ProgressPoint, WeeklyStats};
pub use mirror::{HttpMirror, RemoteMirror};
pub use model::{
    BodyWeightEntry, ExerciseDefinition, HistoryEntry, LoggedExercise, RawNumber, SetRecord, WarmupItem,
    WorkoutDefinition,
};
pub use session::{
    format_weight, Comparison, ExerciseSession, FinishOutcome, PrDelta, PrEvent, Session, SessionError,
    SessionSettings, SetField, ToggleOutcome, WorkoutSummary,
};
pub use timer::{format_countdown, RestTimerEvent, RestTimerState};

/// Owns everything the presentation layer talks to: config, the persisted
/// collections, the catalog and at most one active session.
pub struct AppService {
    pub config: Config,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    storage: Box<dyn Storage>,
    mirror: Option<Box<dyn RemoteMirror>>,
    clock: SharedClock,
    catalog: Catalog,
    history: Vec<HistoryEntry>,
    body_weight: Vec<BodyWeightEntry>,
    active: Option<Session>,
}

impl AppService {
    /// Initializes the application service.
    /// # Errors
    /// Returns `anyhow::Error` if config/db path determination, loading, or initialization fails.
    pub fn initialize() -> Result<Self> {
        let config_path = config::get_config_path().context("Failed to determine configuration file path")?;
        let config =
            config::load_config(&config_path).context(format!("Failed to load config from {config_path:?}"))?;

        let db_path = db::get_db_path().context("Failed to determine database path")?;
        let storage =
            SqliteStorage::open(&db_path).with_context(|| format!("Failed to open database at {db_path:?}"))?;

        let mirror_url = config.mirror.url.clone();
        let mut service = Self::with_storage(config, Box::new(storage), Rc::new(SystemClock), db_path, config_path)?;
        if let Some(url) = mirror_url.filter(|u| !u.trim().is_empty()) {
            match HttpMirror::new(url) {
                Ok(mirror) => service.set_mirror(Box::new(mirror)),
                Err(e) => warn!("Mirror disabled, HTTP client could not be built: {}", e),
            }
        }
        Ok(service)
    }

    /// Builds a service over any storage backend and clock, loading the
    /// persisted collections up front.
    /// # Errors
    /// Returns an error if a stored collection cannot be read or decoded, or
    /// the built-in programs fail to parse.
    pub fn with_storage(
        config: Config,
        storage: Box<dyn Storage>,
        clock: SharedClock,
        db_path: PathBuf,
        config_path: PathBuf,
    ) -> Result<Self> {
        let history: Vec<HistoryEntry> = db::load(storage.as_ref(), StorageKey::WorkoutHistory)
            .context("Failed to load workout history")?
            .unwrap_or_default();
        let custom: Vec<WorkoutDefinition> = db::load(storage.as_ref(), StorageKey::CustomWorkouts)
            .context("Failed to load custom workouts")?
            .unwrap_or_default();
        let body_weight: Vec<BodyWeightEntry> = db::load(storage.as_ref(), StorageKey::BodyWeight)
            .context("Failed to load body weight log")?
            .unwrap_or_default();
        let catalog = Catalog::with_builtins(custom).context("Failed to load workout programs")?;
        info!(
            "Loaded {} history entries, {} custom workouts",
            history.len(),
            catalog.custom().len()
        );

        Ok(Self {
            config,
            db_path,
            config_path,
            storage,
            mirror: None,
            clock,
            catalog,
            history,
            body_weight,
            active: None,
        })
    }

    pub fn set_mirror(&mut self, mirror: Box<dyn RemoteMirror>) {
        self.mirror = Some(mirror);
    }

    /// Waits for outstanding mirror requests. Call before the process exits.
    pub fn flush_mirror(&self) {
        if let Some(mirror) = &self.mirror {
            mirror.flush();
        }
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    /// Saves the current configuration state.
    /// # Errors
    /// Returns `ConfigError` if saving fails.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        config::save_config(&self.config_path, &self.config)
    }

    fn now_local(&self) -> DateTime<Local> {
        self.clock.now().with_timezone(&Local)
    }

    /// Writes `value` and mirrors it. Failures are logged and dropped; the
    /// in-memory copy stays authoritative.
    fn persist<T: Serialize + ?Sized>(&self, key: StorageKey, value: &T) {
        match db::store(self.storage.as_ref(), key, value) {
            Ok(json) => {
                if let Some(mirror) = &self.mirror {
                    mirror.push(key, &json);
                }
            }
            Err(e) => warn!("Failed to persist '{}': {}", key, e),
        }
    }

    // --- Catalog ---

    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn list_workouts(&self) -> Vec<&WorkoutDefinition> {
        self.catalog.list_all().collect()
    }

    pub fn find_workout(&self, workout_id: &str) -> Option<&WorkoutDefinition> {
        self.catalog.find(workout_id)
    }

    /// # Errors
    /// Returns `CatalogError::EmptyName` for a blank name.
    pub fn add_custom_workout(
        &mut self,
        name: &str,
        warmup: Vec<WarmupItem>,
        exercises: Vec<ExerciseDefinition>,
    ) -> Result<String, CatalogError> {
        let id = self.catalog.add_custom(name, warmup, exercises, self.clock.now())?;
        info!("Created custom workout '{}' ({})", name.trim(), id);
        self.persist(StorageKey::CustomWorkouts, self.catalog.custom());
        Ok(id)
    }

    /// # Errors
    /// Returns `CatalogError` for built-in or unknown ids and blank names.
    pub fn update_custom_workout(&mut self, workout: WorkoutDefinition) -> Result<(), CatalogError> {
        self.catalog.update_custom(workout)?;
        self.persist(StorageKey::CustomWorkouts, self.catalog.custom());
        Ok(())
    }

    /// # Errors
    /// Returns `CatalogError` for built-in or unknown ids.
    pub fn delete_custom_workout(&mut self, workout_id: &str) -> Result<WorkoutDefinition, CatalogError> {
        let removed = self.catalog.delete_custom(workout_id)?;
        info!("Deleted custom workout '{}'", workout_id);
        self.persist(StorageKey::CustomWorkouts, self.catalog.custom());
        Ok(removed)
    }

    // --- Active session ---

    /// Starts a workout, replacing any session already in progress.
    /// # Errors
    /// Returns `SessionError::NotFound` for an unknown id; the previous
    /// session, if any, is kept in that case.
    pub fn start_workout(&mut self, workout_id: &str) -> Result<&Session, SessionError> {
        let session = Session::start(
            &self.catalog,
            workout_id,
            &self.history,
            self.clock.clone(),
            self.config.session_settings(),
        )?;
        if let Some(previous) = self.active.take() {
            previous.abandon();
        }
        Ok(self.active.insert(session))
    }

    pub const fn active_session(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    fn active_mut(&mut self) -> Result<&mut Session, SessionError> {
        self.active.as_mut().ok_or(SessionError::NoActiveSession)
    }

    /// # Errors
    /// `NoActiveSession`, `UnknownExercise` or `SetOutOfRange`.
    pub fn update_set(&mut self, order: &str, index: usize, field: SetField, value: &str) -> Result<(), SessionError> {
        self.active_mut()?.update_set(order, index, field, value)
    }

    /// # Errors
    /// `NoActiveSession`, `UnknownExercise` or `SetOutOfRange`.
    pub fn toggle_set_done(&mut self, order: &str, index: usize) -> Result<ToggleOutcome, SessionError> {
        let session = self.active.as_mut().ok_or(SessionError::NoActiveSession)?;
        session.toggle_set_done(order, index, &self.history)
    }

    /// Stops the rest countdown. A no-op when nothing is running.
    pub fn skip_rest(&mut self) {
        if let Some(session) = self.active.as_mut() {
            session.skip_rest();
        }
    }

    /// Advances the rest timer; returns `Done` once when the countdown ends.
    pub fn poll_rest(&mut self) -> Option<RestTimerEvent> {
        self.active.as_mut()?.rest_timer_mut().poll()
    }

    pub fn rest_display(&self) -> Option<String> {
        self.active.as_ref()?.rest_timer().display()
    }

    pub fn elapsed_seconds(&self) -> Option<u64> {
        self.active.as_ref().map(Session::elapsed_seconds)
    }

    /// Ends the active session. With at least one completed set the entry
    /// is appended to history and persisted, and the summary is returned.
    /// Otherwise nothing is written and `None` is returned; calling this
    /// again without a session is a no-op.
    pub fn finish_workout(&mut self) -> Option<WorkoutSummary> {
        let session = self.active.take()?;
        match session.finish(&self.history) {
            FinishOutcome::Abandoned => None,
            FinishOutcome::Finished { entry, summary } => {
                self.history.push(entry);
                self.persist(StorageKey::WorkoutHistory, &self.history);
                Some(summary)
            }
        }
    }

    /// Drops the active session without writing anything.
    pub fn abandon_workout(&mut self) {
        if let Some(session) = self.active.take() {
            session.abandon();
        }
    }

    // --- History ---

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Entries newest first, at most `limit` of them.
    pub fn recent_history(&self, limit: usize) -> Vec<&HistoryEntry> {
        let mut entries: Vec<&HistoryEntry> = self.history.iter().collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        entries
    }

    pub fn last_session(&self, workout_id: &str) -> Option<&HistoryEntry> {
        history::last_session(&self.history, workout_id)
    }

    /// # Errors
    /// Fails if no history entry has `entry_id`.
    pub fn set_history_note(&mut self, entry_id: &str, note: &str) -> Result<()> {
        if !history::set_note(&mut self.history, entry_id, note) {
            bail!("History entry not found: {}", entry_id);
        }
        self.persist(StorageKey::WorkoutHistory, &self.history);
        Ok(())
    }

    /// Deletes a history entry locally and from the mirror.
    /// # Errors
    /// Fails if no history entry has `entry_id`.
    pub fn delete_history_entry(&mut self, entry_id: &str) -> Result<HistoryEntry> {
        let Some(removed) = history::delete_entry(&mut self.history, entry_id) else {
            bail!("History entry not found: {}", entry_id);
        };
        info!("Deleted history entry '{}'", entry_id);
        self.persist(StorageKey::WorkoutHistory, &self.history);
        if let Some(mirror) = &self.mirror {
            mirror.delete_entry(entry_id);
        }
        Ok(removed)
    }

    // --- Aggregates ---

    pub fn personal_record(&self, exercise_name: &str) -> f64 {
        history::personal_record(&self.history, exercise_name)
    }

    pub fn pr_board(&self) -> Vec<PrBoardEntry> {
        history::pr_board(&self.history)
    }

    pub fn weekly_stats(&self) -> WeeklyStats {
        history::weekly_stats(&self.history, &self.now_local(), self.config.weekly_target)
    }

    pub fn current_streak(&self) -> u32 {
        history::current_streak(&self.history, &self.now_local())
    }

    pub fn longest_streak(&self) -> u32 {
        history::longest_streak(&self.history, &Local)
    }

    pub fn muscle_activity(&self) -> BTreeMap<Muscle, u32> {
        history::muscle_activity(&self.history, &self.now_local())
    }

    pub fn calendar_heatmap(&self) -> Vec<[HeatmapCell; 7]> {
        history::calendar_heatmap(&self.history, &self.now_local())
    }

    pub fn exercise_progress(&self, workout_type: Option<WorkoutType>) -> Vec<ExerciseProgress> {
        match workout_type {
            Some(t) => history::exercise_progress_for_type(&self.history, &self.catalog, t),
            None => history::exercise_progress(&self.history),
        }
    }

    pub fn sessions_by_day(&self) -> Vec<(NaiveDate, Vec<&HistoryEntry>)> {
        history::sessions_by_day(&self.history, &Local)
    }

    // --- Body weight ---

    pub fn body_weight_log(&self) -> &[BodyWeightEntry] {
        &self.body_weight
    }

    /// Records today's (or `date`'s) body weight, replacing a same-day reading.
    /// # Errors
    /// Fails if `weight` is not a positive number.
    pub fn log_body_weight(&mut self, date: Option<NaiveDate>, weight: f64) -> Result<()> {
        if !(weight.is_finite() && weight > 0.0) {
            bail!("Body weight must be a positive number, got {}", weight);
        }
        let date = date.unwrap_or_else(|| self.now_local().date_naive());
        bodyweight::record_body_weight(&mut self.body_weight, date, weight);
        self.persist(StorageKey::BodyWeight, &self.body_weight);
        Ok(())
    }

    pub fn body_weight_summary(&self) -> Option<BodyWeightSummary> {
        bodyweight::body_weight_summary(&self.body_weight)
    }
}
