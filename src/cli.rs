//src/cli.rs
use chrono::{Duration, Local, NaiveDate};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use gym_tracker_lib::{ExerciseDefinition, SetField, WorkoutType};
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(author, version, about = "A CLI tool to run and log gym workouts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    /// Print tabular output as CSV
    #[arg(long, global = true)]
    pub export_csv: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkoutTypeCli {
    Push,
    Pull,
    Legs,
}

impl From<WorkoutTypeCli> for WorkoutType {
    fn from(value: WorkoutTypeCli) -> Self {
        match value {
            WorkoutTypeCli::Push => Self::Push,
            WorkoutTypeCli::Pull => Self::Pull,
            WorkoutTypeCli::Legs => Self::Legs,
        }
    }
}

// Custom parser for date strings and shorthands
pub fn parse_date_shorthand(s: &str) -> Result<NaiveDate, String> {
    match s.to_lowercase().as_str() {
        "today" => Ok(Local::now().date_naive()),
        "yesterday" => Ok((Local::now() - Duration::days(1)).date_naive()),
        _ => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(s, "%d.%m.%Y"))
            .map_err(|_| format!("Invalid date format: '{s}'. Use 'today', 'yesterday', YYYY-MM-DD or DD.MM.YYYY.")),
    }
}

/// Parses `"Name;setsConfig[;rest[;tempo]]"` into an exercise. The order
/// key is assigned by the caller.
pub fn parse_exercise_spec(s: &str) -> Result<ExerciseDefinition, String> {
    let mut parts = s.split(';').map(str::trim);
    let name = parts.next().filter(|n| !n.is_empty()).ok_or("Exercise name is empty")?;
    let sets_config = parts
        .next()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| format!("Missing sets config for '{name}', e.g. \"{name};3 x 8-12;2 mins\""))?;
    Ok(ExerciseDefinition {
        order: String::new(),
        name: name.to_string(),
        sets_config: sets_config.to_string(),
        rest: parts.next().unwrap_or_default().to_string(),
        tempo: parts.next().unwrap_or_default().to_string(),
        notes: String::new(),
    })
}

/// Order keys "A".."Z", "AA".."ZZ", "AAA", ... (bijective base 26).
pub fn order_key(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'A' + u8::try_from(n % 26).unwrap_or(0)));
        n /= 26;
    }
    letters.iter().rev().collect()
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List built-in and custom workouts
    Workouts {
        /// Only workouts of this type
        #[arg(short, long = "type", value_enum)]
        type_: Option<WorkoutTypeCli>,
    },
    /// Show the exercises of a workout
    Show { id: String },
    /// Run a workout interactively and log it
    Log { id: String },
    /// List finished sessions, newest first
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete a finished session
    DeleteSession { id: String },
    /// Attach a note to a finished session (empty text clears it)
    Note { id: String, text: String },
    /// Weekly volume, streaks and muscle activity
    Stats,
    /// Best estimated one-rep max per exercise
    Prs,
    /// Top weight per session for each exercise
    Progress {
        #[arg(short, long = "type", value_enum)]
        type_: Option<WorkoutTypeCli>,
        /// Only this exercise (exact name)
        #[arg(short, long)]
        exercise: Option<String>,
    },
    /// Sessions per day over the last twelve weeks
    Heatmap,
    /// Record or list body weight
    Bodyweight {
        #[command(subcommand)]
        action: BodyweightCommand,
    },
    /// Create or delete custom workouts
    Custom {
        #[command(subcommand)]
        action: CustomCommand,
    },
    /// Show the path to the config file
    ConfigPath,
    /// Show the path to the database file
    DbPath,
    GenerateCompletion {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum BodyweightCommand {
    Add {
        weight: f64,
        /// Date of the reading (default: today)
        #[arg(short, long, value_parser = parse_date_shorthand)]
        date: Option<NaiveDate>,
    },
    List,
}

#[derive(Subcommand, Debug)]
pub enum CustomCommand {
    Add {
        #[arg(short, long)]
        name: String,
        /// "Name;setsConfig[;rest[;tempo]]", repeat for each exercise
        #[arg(short, long = "exercise", value_parser = parse_exercise_spec, required = true)]
        exercises: Vec<ExerciseDefinition>,
    },
    Delete { id: String },
}

/// One line typed during `log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Set {
        field: SetField,
        order: String,
        set: usize,
        value: String,
    },
    Done { order: String, set: usize },
    Rest,
    Skip,
    Status,
    Finish,
    Quit,
    Help,
}

// Set numbers are 1-based on the prompt.
fn parse_set_number(s: Option<&str>) -> Result<usize, String> {
    let raw = s.ok_or("Missing set number")?;
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(format!("Invalid set number: '{raw}'")),
    }
}

impl FromStr for SessionCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(Self::Status);
        };
        let head = head.to_lowercase();
        if let Ok(field) = SetField::from_str(&head) {
            let order = words.next().ok_or("Missing exercise order")?.to_uppercase();
            let set = parse_set_number(words.next())?;
            let value = words.collect::<Vec<_>>().join(" ");
            return Ok(Self::Set { field, order, set, value });
        }
        match head.as_str() {
            "d" | "done" => {
                let order = words.next().ok_or("Missing exercise order")?.to_uppercase();
                let set = parse_set_number(words.next())?;
                Ok(Self::Done { order, set })
            }
            "rest" => Ok(Self::Rest),
            "skip" => Ok(Self::Skip),
            "s" | "status" => Ok(Self::Status),
            "finish" => Ok(Self::Finish),
            "q" | "quit" => Ok(Self::Quit),
            "h" | "help" | "?" => Ok(Self::Help),
            other => Err(format!("Unknown command: '{other}'. Type 'help'.")),
        }
    }
}

// Function to parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_parsing_formats() {
        assert_eq!(
            parse_date_shorthand("2024-03-04").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
        );
        assert_eq!(
            parse_date_shorthand("04.03.2024").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
        );
        assert_eq!(parse_date_shorthand("ToDaY").unwrap(), Local::now().date_naive());
        assert!(parse_date_shorthand("March 4th").is_err());
    }

    #[test]
    fn test_session_command_set_values() {
        assert_eq!(
            "w a 1 62.5".parse::<SessionCommand>(),
            Ok(SessionCommand::Set {
                field: SetField::Weight,
                order: "A".into(),
                set: 0,
                value: "62.5".into()
            })
        );
        assert_eq!(
            "reps B 3".parse::<SessionCommand>(),
            Ok(SessionCommand::Set {
                field: SetField::Reps,
                order: "B".into(),
                set: 2,
                value: String::new()
            })
        );
    }

    #[test]
    fn test_session_command_rejects_set_zero() {
        assert!("d a 0".parse::<SessionCommand>().is_err());
        assert_eq!(
            "d a 2".parse::<SessionCommand>(),
            Ok(SessionCommand::Done {
                order: "A".into(),
                set: 1
            })
        );
        assert!("dance".parse::<SessionCommand>().is_err());
    }

    #[test]
    fn test_exercise_spec_parsing() {
        let ex = parse_exercise_spec("Cable Curl; 3 x 10-12; 90s").unwrap();
        assert_eq!(ex.name, "Cable Curl");
        assert_eq!(ex.sets_config, "3 x 10-12");
        assert_eq!(ex.rest, "90s");
        assert!(ex.tempo.is_empty());
        assert!(parse_exercise_spec("Cable Curl").is_err());
    }

    #[test]
    fn test_order_keys() {
        assert_eq!(order_key(0), "A");
        assert_eq!(order_key(25), "Z");
        assert_eq!(order_key(26), "AA");
        assert_eq!(order_key(27), "AB");
        assert_eq!(order_key(701), "ZZ");
        assert_eq!(order_key(702), "AAA");
    }

    #[test]
    fn test_order_keys_never_repeat() {
        let keys: std::collections::HashSet<String> = (0..20_000).map(order_key).collect();
        assert_eq!(keys.len(), 20_000);
    }
}
