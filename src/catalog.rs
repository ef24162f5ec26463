// src/catalog.rs
use crate::model::{time_id, ExerciseDefinition, WarmupItem, WorkoutDefinition};
use chrono::{DateTime, Utc};
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

const BUILTIN_PROGRAMS: &str = include_str!("programs.json");
pub const CUSTOM_ID_PREFIX: &str = "custom-";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Workout not found: {0}")]
    NotFound(String),
    #[error("Built-in workout '{0}' cannot be modified")]
    ReadOnly(String),
    #[error("Workout name cannot be empty")]
    EmptyName,
    #[error("Failed to parse built-in program data: {0}")]
    ProgramData(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WorkoutType {
    Push,
    Pull,
    Legs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Muscle {
    Chest,
    Shoulders,
    Triceps,
    Back,
    Biceps,
    Quads,
    Hamstrings,
    Glutes,
    Core,
}

impl WorkoutType {
    /// Type encoded in a workout id: the id with its digits stripped
    /// ("push1" -> push). Custom workouts have no type.
    pub fn from_workout_id(workout_id: &str) -> Option<Self> {
        Self::from_str(&type_key(workout_id)).ok()
    }

    pub const fn muscles(self) -> &'static [Muscle] {
        match self {
            Self::Push => &[Muscle::Chest, Muscle::Shoulders, Muscle::Triceps],
            Self::Pull => &[Muscle::Back, Muscle::Biceps],
            Self::Legs => &[Muscle::Quads, Muscle::Hamstrings, Muscle::Glutes, Muscle::Core],
        }
    }
}

/// Workout id with every ASCII digit removed.
pub fn type_key(workout_id: &str) -> String {
    workout_id.chars().filter(|c| !c.is_ascii_digit()).collect()
}

/// Built-in programs followed by the user's custom workouts.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    builtins: Vec<WorkoutDefinition>,
    custom: Vec<WorkoutDefinition>,
}

impl Catalog {
    pub const fn new(builtins: Vec<WorkoutDefinition>, custom: Vec<WorkoutDefinition>) -> Self {
        Self { builtins, custom }
    }

    /// Catalog of the bundled programs with the given custom workouts.
    /// # Errors
    /// Returns `Error::ProgramData` if the bundled JSON is malformed.
    pub fn with_builtins(custom: Vec<WorkoutDefinition>) -> Result<Self, Error> {
        let builtins: Vec<WorkoutDefinition> = serde_json::from_str(BUILTIN_PROGRAMS)?;
        Ok(Self::new(builtins, custom))
    }

    pub fn list_all(&self) -> impl Iterator<Item = &WorkoutDefinition> {
        self.builtins.iter().chain(self.custom.iter())
    }

    pub fn find(&self, workout_id: &str) -> Option<&WorkoutDefinition> {
        self.list_all().find(|w| w.id == workout_id)
    }

    pub fn custom(&self) -> &[WorkoutDefinition] {
        &self.custom
    }

    pub fn is_builtin(&self, workout_id: &str) -> bool {
        self.builtins.iter().any(|w| w.id == workout_id)
    }

    pub fn of_type(&self, workout_type: WorkoutType) -> impl Iterator<Item = &WorkoutDefinition> {
        self.list_all()
            .filter(move |w| WorkoutType::from_workout_id(&w.id) == Some(workout_type))
    }

    /// Creates a custom workout and returns its generated id.
    /// # Errors
    /// Returns `Error::EmptyName` if `name` is blank.
    pub fn add_custom(
        &mut self,
        name: &str,
        warmup: Vec<WarmupItem>,
        exercises: Vec<ExerciseDefinition>,
        now: DateTime<Utc>,
    ) -> Result<String, Error> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::EmptyName);
        }
        let base = format!("{CUSTOM_ID_PREFIX}{}", time_id(now));
        let mut id = base.clone();
        let mut n = 1;
        while self.find(&id).is_some() {
            id = format!("{base}-{n}");
            n += 1;
        }
        self.custom.push(WorkoutDefinition {
            id: id.clone(),
            name: trimmed.to_string(),
            warmup,
            exercises,
        });
        Ok(id)
    }

    /// Replaces a custom workout with the same id.
    /// # Errors
    /// - `Error::ReadOnly` for built-in ids.
    /// - `Error::NotFound` if no custom workout has this id.
    pub fn update_custom(&mut self, workout: WorkoutDefinition) -> Result<(), Error> {
        if self.is_builtin(&workout.id) {
            return Err(Error::ReadOnly(workout.id));
        }
        if workout.name.trim().is_empty() {
            return Err(Error::EmptyName);
        }
        let slot = self
            .custom
            .iter_mut()
            .find(|w| w.id == workout.id)
            .ok_or_else(|| Error::NotFound(workout.id.clone()))?;
        *slot = workout;
        Ok(())
    }

    /// Removes a custom workout and returns it.
    /// # Errors
    /// - `Error::ReadOnly` for built-in ids.
    /// - `Error::NotFound` if no custom workout has this id.
    pub fn delete_custom(&mut self, workout_id: &str) -> Result<WorkoutDefinition, Error> {
        if self.is_builtin(workout_id) {
            return Err(Error::ReadOnly(workout_id.to_string()));
        }
        let pos = self
            .custom
            .iter()
            .position(|w| w.id == workout_id)
            .ok_or_else(|| Error::NotFound(workout_id.to_string()))?;
        Ok(self.custom.remove(pos))
    }
}
