//src/main.rs
mod cli; // Keep cli module for parsing args

use anyhow::{bail, Context, Result};
use chrono::Local;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::io::{self, stdin, stdout, BufRead, Write};
use tracing_subscriber::EnvFilter;

use cli::SessionCommand;
use gym_tracker_lib::{
    format_countdown, format_weight, AppService, BodyWeightSummary, ExerciseProgress, HeatmapCell, HistoryEntry,
    PrBoardEntry, RestTimerEvent, Session, SessionError, ToggleOutcome, Units, WorkoutDefinition, WorkoutSummary,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    // --- Check for completion generation request FIRST ---
    let cli_args = cli::parse_args(); // Parse arguments once
    let export_csv = cli_args.export_csv;

    if let cli::Commands::GenerateCompletion { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command();
        let bin_name = cmd.get_name().to_string();

        eprintln!("Generating completion script for {shell}...");
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout());
        return Ok(());
    }

    // Initialize the application service (loads config, opens storage)
    let mut service = AppService::initialize().context("Failed to initialize application service")?;
    let header_color = service.config.header_color();
    let units = service.config.units;

    match cli_args.command {
        cli::Commands::GenerateCompletion { .. } => {
            unreachable!("Completion generation should have exited already");
        }
        cli::Commands::Workouts { type_ } => {
            let workouts: Vec<&WorkoutDefinition> = match type_ {
                Some(t) => service.catalog().of_type(t.into()).collect(),
                None => service.list_workouts(),
            };
            if export_csv {
                print_workouts_csv(&workouts)?;
            } else {
                print_workouts_table(&workouts, header_color);
            }
        }
        cli::Commands::Show { id } => {
            let Some(workout) = service.find_workout(&id) else {
                bail!("Workout not found: {}", id);
            };
            print_workout_detail(workout, service.last_session(&id), header_color, units);
        }
        cli::Commands::Log { id } => {
            run_session(&mut service, &id, units)?;
        }
        cli::Commands::History { limit } => {
            let entries = service.recent_history(limit);
            if entries.is_empty() {
                println!("No sessions logged yet.");
            } else if export_csv {
                print_history_csv(&entries)?;
            } else {
                print_history_table(&entries, header_color, units);
            }
        }
        cli::Commands::DeleteSession { id } => {
            let removed = service
                .delete_history_entry(&id)
                .with_context(|| format!("Error deleting session '{id}'"))?;
            println!(
                "Deleted session '{}' ({}, {}).",
                removed.id,
                removed.workout_name,
                removed.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M")
            );
        }
        cli::Commands::Note { id, text } => {
            service
                .set_history_note(&id, &text)
                .with_context(|| format!("Error updating note for '{id}'"))?;
            if text.trim().is_empty() {
                println!("Cleared note on session '{id}'.");
            } else {
                println!("Saved note on session '{id}'.");
            }
        }
        cli::Commands::Stats => print_stats(&service, units),
        cli::Commands::Prs => {
            let board = service.pr_board();
            if board.is_empty() {
                println!("No personal records yet.");
            } else if export_csv {
                print_pr_csv(&board)?;
            } else {
                print_pr_table(&board, header_color, units);
            }
        }
        cli::Commands::Progress { type_, exercise } => {
            let mut progress = service.exercise_progress(type_.map(Into::into));
            if let Some(name) = &exercise {
                progress.retain(|p| &p.name == name);
            }
            if progress.is_empty() {
                println!("No progress data found.");
            } else if export_csv {
                print_progress_csv(&progress)?;
            } else {
                print_progress_table(&progress, header_color, units);
            }
        }
        cli::Commands::Heatmap => print_heatmap(&service.calendar_heatmap()),
        cli::Commands::Bodyweight { action } => match action {
            cli::BodyweightCommand::Add { weight, date } => {
                service.log_body_weight(date, weight)?;
                println!("Logged body weight {} {}.", format_weight(weight), units.weight_label());
            }
            cli::BodyweightCommand::List => match service.body_weight_summary() {
                None => println!("No body weight recorded yet."),
                Some(summary) if export_csv => print_body_weight_csv(&summary)?,
                Some(summary) => print_body_weight(&summary, header_color, units),
            },
        },
        cli::Commands::Custom { action } => match action {
            cli::CustomCommand::Add { name, exercises } => {
                let exercises = exercises
                    .into_iter()
                    .enumerate()
                    .map(|(i, mut ex)| {
                        ex.order = cli::order_key(i);
                        ex
                    })
                    .collect();
                let id = service
                    .add_custom_workout(&name, Vec::new(), exercises)
                    .context("Error creating custom workout")?;
                println!("Created custom workout '{}' with ID: {}", name.trim(), id);
            }
            cli::CustomCommand::Delete { id } => {
                let removed = service
                    .delete_custom_workout(&id)
                    .with_context(|| format!("Error deleting workout '{id}'"))?;
                println!("Deleted custom workout '{}' ({}).", removed.name, removed.id);
            }
        },
        cli::Commands::ConfigPath => {
            println!("{}", service.get_config_path().display());
        }
        cli::Commands::DbPath => {
            println!("{}", service.get_db_path().display());
        }
    }

    service.flush_mirror();
    Ok(())
}

// --- Interactive session ---

const SESSION_HELP: &str = "\
  w <order> <set> <value>   set weight (e.g. 'w A 1 62.5')
  r <order> <set> <value>   set reps
  d <order> <set>           mark set done / not done
  rest                      show the rest timer
  skip                      skip the rest timer
  status                    show the workout
  finish                    save and end the workout
  quit                      leave without saving";

fn run_session(service: &mut AppService, workout_id: &str, units: Units) -> Result<()> {
    service.start_workout(workout_id).context("Error starting workout")?;
    if let Some(session) = service.active_session() {
        print_session(session, units);
    }
    println!("Type 'help' for commands.");

    let mut lines = stdin().lock().lines();
    loop {
        report_rest(service);
        print!("> ");
        stdout().flush()?;
        let Some(line) = lines.next().transpose()? else {
            // EOF behaves like quit
            service.abandon_workout();
            println!("Workout discarded.");
            return Ok(());
        };

        let command = match line.parse::<SessionCommand>() {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match command {
            SessionCommand::Set {
                field,
                order,
                set,
                value,
            } => {
                if let Err(e) = service.update_set(&order, set, field, &value) {
                    report_session_error(&e);
                }
            }
            SessionCommand::Done { order, set } => match service.toggle_set_done(&order, set) {
                Ok(outcome) => print_toggle(&order, set, &outcome, units),
                Err(e) => report_session_error(&e),
            },
            SessionCommand::Rest => match service.rest_display() {
                Some(display) => println!("Rest: {display}"),
                None => println!("No rest timer running."),
            },
            SessionCommand::Skip => {
                service.skip_rest();
                println!("Rest skipped.");
            }
            SessionCommand::Status => {
                if let Some(session) = service.active_session() {
                    print_session(session, units);
                }
            }
            SessionCommand::Help => println!("{SESSION_HELP}"),
            SessionCommand::Finish => {
                match service.finish_workout() {
                    Some(summary) => print_summary(&summary, units),
                    None => println!("No completed sets, nothing saved."),
                }
                return Ok(());
            }
            SessionCommand::Quit => {
                service.abandon_workout();
                println!("Workout discarded.");
                return Ok(());
            }
        }
    }
}

fn report_rest(service: &mut AppService) {
    if service.poll_rest() == Some(RestTimerEvent::Done) {
        println!("\x07Rest is over. Next set!");
    }
}

fn report_session_error(e: &SessionError) {
    eprintln!("Error: {e}");
}

fn print_toggle(order: &str, set: usize, outcome: &ToggleOutcome, units: Units) {
    let state = if outcome.done { "done" } else { "not done" };
    println!("{order} set {} marked {state}.", set + 1);
    if let Some(pr) = &outcome.personal_record {
        println!(
            "*** New PR for {}: {} {} ***",
            pr.exercise,
            format_weight(pr.weight),
            units.weight_label()
        );
    }
    if let Some(seconds) = outcome.rest_started {
        println!("Rest {}", format_countdown(i64::from(seconds)));
    }
    if outcome.exercise_complete {
        println!("{order} complete.");
    }
}

fn print_session(session: &Session, units: Units) {
    let workout = session.workout();
    let elapsed = session.elapsed_seconds();
    println!("{} ({}:{:02} elapsed)", workout.name, elapsed / 60, elapsed % 60);
    for def in &workout.exercises {
        let check = if session.is_exercise_complete(&def.order) { "x" } else { " " };
        println!(
            "[{check}] {} {} ({}, rest {})",
            def.order,
            def.name,
            def.sets_config,
            if def.rest.is_empty() { "-" } else { def.rest.as_str() }
        );
        let Some(ex) = session.exercise(&def.order) else {
            continue;
        };
        for (i, set) in ex.sets.iter().enumerate() {
            println!(
                "      {}. {:>6} {} x {:>3} {}",
                i + 1,
                if set.weight.is_empty() { "-" } else { set.weight.as_str() },
                units.weight_label(),
                if set.reps.is_empty() { "-" } else { set.reps.as_str() },
                if set.done { "done" } else { "" }
            );
        }
    }
}

fn print_summary(summary: &WorkoutSummary, units: Units) {
    println!("Workout complete: {}", summary.name);
    println!(
        "  {} exercises, {} sets, {} {} volume, {} min",
        summary.exercise_count,
        summary.total_sets,
        format_weight(summary.total_volume),
        units.weight_label(),
        summary.duration_minutes
    );
    for pr in &summary.personal_records {
        println!(
            "  PR {}: {} {} (was {})",
            pr.exercise,
            format_weight(pr.weight),
            units.weight_label(),
            format_weight(pr.previous)
        );
    }
    if let Some(cmp) = &summary.comparison {
        println!(
            "  vs {}: volume {:+}, sets {:+}",
            cmp.previous_timestamp.with_timezone(&Local).format("%Y-%m-%d"),
            (cmp.volume_delta * 100.0).round() / 100.0,
            cmp.sets_delta
        );
    }
}

// --- Tables ---

fn header(table: &mut Table, titles: &[&str], header_color: Color) {
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(titles.iter().map(|t| Cell::new(t).fg(header_color)).collect::<Vec<_>>());
}

fn print_workouts_table(workouts: &[&WorkoutDefinition], header_color: Color) {
    let mut table = Table::new();
    header(&mut table, &["ID", "Name", "Exercises"], header_color);
    for w in workouts {
        table.add_row(vec![
            Cell::new(&w.id),
            Cell::new(&w.name),
            Cell::new(w.exercises.len()),
        ]);
    }
    println!("{table}");
}

fn print_workout_detail(
    workout: &WorkoutDefinition,
    last: Option<&HistoryEntry>,
    header_color: Color,
    units: Units,
) {
    println!("{} ({})", workout.name, workout.id);
    if !workout.warmup.is_empty() {
        println!("Warm-up:");
        for item in &workout.warmup {
            println!("  {} - {}", item.name, item.sets);
        }
    }
    let mut table = Table::new();
    header(
        &mut table,
        &["", "Exercise", "Sets", "Tempo", "Rest", "Last time", "Notes"],
        header_color,
    );
    for ex in &workout.exercises {
        let last_time = last
            .and_then(|h| h.exercises.get(&ex.order))
            .map(|logged| {
                logged
                    .sets
                    .iter()
                    .map(|s| format!("{}{}x{}", s.weight, units.weight_label(), s.reps))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(&ex.order).add_attribute(Attribute::Bold),
            Cell::new(&ex.name),
            Cell::new(&ex.sets_config),
            Cell::new(&ex.tempo),
            Cell::new(&ex.rest),
            Cell::new(last_time),
            Cell::new(&ex.notes),
        ]);
    }
    println!("{table}");
}

fn print_history_table(entries: &[&HistoryEntry], header_color: Color, units: Units) {
    let mut table = Table::new();
    header(
        &mut table,
        &[
            "ID",
            "Date",
            "Workout",
            "Duration (min)",
            "Sets",
            &format!("Volume ({})", units.weight_label()),
            "Notes",
        ],
        header_color,
    );
    for entry in entries {
        table.add_row(vec![
            Cell::new(&entry.id),
            Cell::new(entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M")),
            Cell::new(&entry.workout_name),
            Cell::new(entry.duration.map_or("-".to_string(), |d| d.to_string())),
            Cell::new(entry.total_sets()),
            Cell::new(format_weight(entry.volume())),
            Cell::new(entry.notes.as_deref().unwrap_or("-")),
        ]);
    }
    println!("{table}");
}

fn print_stats(service: &AppService, units: Units) {
    let weekly = service.weekly_stats();
    println!(
        "This week: {}/{} sessions, {} {} volume ({:+.1}% vs last week)",
        weekly.sessions_this_week,
        weekly.target,
        format_weight(weekly.volume_this_week),
        units.weight_label(),
        weekly.volume_change
    );
    println!(
        "Streak: {} day(s), longest {}",
        service.current_streak(),
        service.longest_streak()
    );
    println!("Muscle activity (last 7 days):");
    for (muscle, sessions) in service.muscle_activity() {
        println!("  {muscle:<11} {}", "#".repeat(sessions as usize));
    }
}

fn print_pr_table(board: &[PrBoardEntry], header_color: Color, units: Units) {
    let label = units.weight_label();
    let mut table = Table::new();
    header(
        &mut table,
        &["Exercise", &format!("Weight ({label})"), "Reps", &format!("Est. 1RM ({label})"), "Date"],
        header_color,
    );
    for pr in board {
        table.add_row(vec![
            Cell::new(&pr.exercise),
            Cell::new(format_weight(pr.weight)),
            Cell::new(pr.reps),
            Cell::new(format_weight(pr.estimated_1rm)).add_attribute(Attribute::Bold),
            Cell::new(pr.timestamp.with_timezone(&Local).format("%Y-%m-%d")),
        ]);
    }
    println!("{table}");
}

fn print_progress_table(progress: &[ExerciseProgress], header_color: Color, units: Units) {
    let label = units.weight_label();
    let mut table = Table::new();
    header(
        &mut table,
        &["Exercise", &format!("Best ({label})"), "Change", "Sessions", "Recent"],
        header_color,
    );
    for p in progress {
        let recent = p
            .chart
            .iter()
            .map(|point| format_weight(point.max_weight))
            .collect::<Vec<_>>()
            .join(" ");
        let change = if p.improvement > 0.0 {
            Cell::new(format!("+{}", format_weight(p.improvement))).fg(Color::Green)
        } else {
            Cell::new(format_weight(p.improvement))
        };
        table.add_row(vec![
            Cell::new(&p.name),
            Cell::new(format_weight(p.best_weight)),
            change,
            Cell::new(p.sessions),
            Cell::new(recent),
        ]);
    }
    println!("{table}");
}

fn print_heatmap(weeks: &[[HeatmapCell; 7]]) {
    println!("     Mo Tu We Th Fr Sa Su");
    for week in weeks {
        let row: Vec<&str> = week
            .iter()
            .map(|cell| match (cell.future, cell.sessions) {
                (true, _) => " .",
                (false, 0) => " -",
                (false, 1) => " #",
                _ => "##",
            })
            .collect();
        println!("{} {}", week[0].date.format("%m-%d"), row.join(" "));
    }
}

fn print_body_weight(summary: &BodyWeightSummary, header_color: Color, units: Units) {
    let label = units.weight_label();
    println!(
        "Latest {} {label}, min {}, max {}, change {:+} over {} readings",
        format_weight(summary.latest),
        format_weight(summary.min),
        format_weight(summary.max),
        (summary.change * 100.0).round() / 100.0,
        summary.entries
    );
    let mut table = Table::new();
    header(&mut table, &["Date", &format!("Weight ({label})")], header_color);
    for entry in &summary.chart {
        table.add_row(vec![
            Cell::new(entry.date.format("%Y-%m-%d")),
            Cell::new(format_weight(entry.weight)),
        ]);
    }
    println!("{table}");
}

// --- CSV ---

fn print_workouts_csv(workouts: &[&WorkoutDefinition]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["ID", "Name", "Order", "Exercise", "Sets", "Tempo", "Rest"])?;
    for w in workouts {
        for ex in &w.exercises {
            writer.write_record([
                w.id.as_str(),
                w.name.as_str(),
                ex.order.as_str(),
                ex.name.as_str(),
                ex.sets_config.as_str(),
                ex.tempo.as_str(),
                ex.rest.as_str(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn print_history_csv(entries: &[&HistoryEntry]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record([
        "ID",
        "Timestamp_Local",
        "Workout_ID",
        "Workout",
        "Exercise",
        "Set",
        "Weight",
        "Reps",
        "Notes",
    ])?;
    for entry in entries {
        let timestamp = entry.timestamp.with_timezone(&Local).to_rfc3339();
        for logged in entry.exercises.values() {
            for (i, set) in logged.sets.iter().enumerate() {
                writer.write_record([
                    entry.id.clone(),
                    timestamp.clone(),
                    entry.workout_id.clone(),
                    entry.workout_name.clone(),
                    logged.name.clone(),
                    (i + 1).to_string(),
                    set.weight.to_string(),
                    set.reps.to_string(),
                    entry.notes.clone().unwrap_or_default(),
                ])?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

fn print_pr_csv(board: &[PrBoardEntry]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Exercise", "Weight", "Reps", "Estimated_1RM", "Timestamp_Local"])?;
    for pr in board {
        writer.write_record([
            pr.exercise.clone(),
            pr.weight.to_string(),
            pr.reps.to_string(),
            pr.estimated_1rm.to_string(),
            pr.timestamp.with_timezone(&Local).to_rfc3339(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_progress_csv(progress: &[ExerciseProgress]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Exercise", "Timestamp_Local", "Max_Weight", "Reps"])?;
    for p in progress {
        for point in &p.chart {
            writer.write_record([
                p.name.clone(),
                point.timestamp.with_timezone(&Local).to_rfc3339(),
                point.max_weight.to_string(),
                point.best_set.reps.to_string(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn print_body_weight_csv(summary: &BodyWeightSummary) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Date", "Weight"])?;
    for entry in &summary.chart {
        writer.write_record([entry.date.format("%Y-%m-%d").to_string(), entry.weight.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}
