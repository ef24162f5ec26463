use anyhow::Result;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use gym_tracker_lib::{
    load_config_util, save_config_util, AppService, CatalogError, Config, ConfigError, DbError, ExerciseDefinition,
    HistoryEntry, HttpMirror, LoggedExercise, ManualClock, MemoryStorage, RawNumber, RemoteMirror, RestTimerEvent, SessionError,
    SetField, SetRecord, SqliteStorage, Storage, StorageKey,
};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;

fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 18, 0, 0).unwrap()
}

// Helper function to create a test service with in-memory database
fn create_test_service() -> Result<(AppService, ManualClock)> {
    let clock = ManualClock::new(start_time());
    let storage = SqliteStorage::open_in_memory()?;
    let service = AppService::with_storage(
        Config::default(),
        Box::new(storage),
        Rc::new(clock.clone()),
        ":memory:".into(),
        "test_config.toml".into(),
    )?;
    Ok((service, clock))
}

fn service_over(storage: Box<dyn Storage>, clock: &ManualClock) -> Result<AppService> {
    AppService::with_storage(
        Config::default(),
        storage,
        Rc::new(clock.clone()),
        ":memory:".into(),
        "test_config.toml".into(),
    )
}

fn exercise(order: &str, name: &str, sets_config: &str, rest: &str) -> ExerciseDefinition {
    ExerciseDefinition {
        order: order.to_string(),
        name: name.to_string(),
        sets_config: sets_config.to_string(),
        tempo: String::new(),
        rest: rest.to_string(),
        notes: String::new(),
    }
}

fn add_bench_day(service: &mut AppService) -> Result<String> {
    Ok(service.add_custom_workout("Bench Day", Vec::new(), vec![exercise("A", "Bench", "3 x 10-12", "90s")])?)
}

fn set_values(service: &AppService, order: &str) -> Vec<(String, String, bool)> {
    service
        .active_session()
        .and_then(|s| s.exercise(order))
        .map(|ex| {
            ex.sets
                .iter()
                .map(|s| (s.weight.to_string(), s.reps.to_string(), s.done))
                .collect()
        })
        .unwrap_or_default()
}

/// Shares one in-memory store between service instances.
struct SharedStorage(Rc<MemoryStorage>);

impl Storage for SharedStorage {
    fn get(&self, key: StorageKey) -> Result<Option<Value>, DbError> {
        self.0.get(key)
    }
    fn set(&self, key: StorageKey, value: &Value) -> Result<(), DbError> {
        self.0.set(key, value)
    }
    fn remove(&self, key: StorageKey) -> Result<(), DbError> {
        self.0.remove(key)
    }
}

struct FailingStorage;

impl Storage for FailingStorage {
    fn get(&self, _key: StorageKey) -> Result<Option<Value>, DbError> {
        Ok(None)
    }
    fn set(&self, _key: StorageKey, _value: &Value) -> Result<(), DbError> {
        Err(DbError::DataDir)
    }
    fn remove(&self, _key: StorageKey) -> Result<(), DbError> {
        Err(DbError::DataDir)
    }
}

#[derive(Default, Clone)]
struct RecordingMirror {
    pushed: Rc<RefCell<Vec<StorageKey>>>,
    deleted: Rc<RefCell<Vec<String>>>,
    flushes: Rc<Cell<usize>>,
}

impl RemoteMirror for RecordingMirror {
    fn push(&self, key: StorageKey, _value: &Value) {
        self.pushed.borrow_mut().push(key);
    }
    fn delete_entry(&self, entry_id: &str) {
        self.deleted.borrow_mut().push(entry_id.to_string());
    }
    fn flush(&self) {
        self.flushes.set(self.flushes.get() + 1);
    }
}

/// Accepts `requests` connections, reports each request line on the channel,
/// then answers `200 OK`.
fn spawn_mirror_server(requests: usize) -> Result<(String, mpsc::Receiver<String>)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let url = format!("http://{}", listener.local_addr()?);
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for stream in listener.incoming().take(requests) {
            let Ok(mut stream) = stream else { return };
            let Ok(reader_stream) = stream.try_clone() else { return };
            let mut reader = BufReader::new(reader_stream);
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).is_err() {
                return;
            }
            let mut content_length = 0;
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).is_err() || header.trim().is_empty() {
                    break;
                }
                if let Some((name, value)) = header.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
            }
            let mut body = vec![0; content_length];
            let _ = reader.read_exact(&mut body);
            let _ = tx.send(request_line.trim().to_string());
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        }
    });
    Ok((url, rx))
}

#[test]
fn test_start_unknown_workout_is_not_found() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    let err = service.start_workout("push9").err();
    assert_eq!(err, Some(SessionError::NotFound("push9".to_string())));
    assert!(service.active_session().is_none());
    Ok(())
}

#[test]
fn test_mutations_without_session_fail() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    assert_eq!(
        service.update_set("A", 0, SetField::Weight, "50"),
        Err(SessionError::NoActiveSession)
    );
    assert_eq!(service.toggle_set_done("A", 0).err(), Some(SessionError::NoActiveSession));
    // No-ops rather than errors
    service.skip_rest();
    assert!(service.finish_workout().is_none());
    Ok(())
}

#[test]
fn test_start_initializes_every_exercise() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    let session = service.start_workout("push1")?;
    assert_eq!(session.exercise("A").map(|e| e.sets.len()), Some(3));
    // "Pump Set + 3 x 8-12"
    assert_eq!(session.exercise("F").map(|e| e.sets.len()), Some(4));
    assert!(session.exercise("F").is_some_and(|e| e.sets.iter().all(|s| s.weight.is_empty())));
    Ok(())
}

#[test]
fn test_addressing_errors() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_workout("push1")?;
    assert_eq!(
        service.update_set("Z", 0, SetField::Reps, "10"),
        Err(SessionError::UnknownExercise("Z".to_string()))
    );
    assert_eq!(
        service.toggle_set_done("A", 3).err(),
        Some(SessionError::SetOutOfRange {
            order: "A".to_string(),
            index: 3
        })
    );
    Ok(())
}

#[test]
fn test_finish_without_completed_sets_writes_nothing() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_workout("push1")?;
    service.update_set("A", 0, SetField::Weight, "20")?;
    service.update_set("A", 0, SetField::Reps, "12")?;

    assert!(service.finish_workout().is_none());
    assert!(service.finish_workout().is_none());
    assert!(service.history().is_empty());
    assert!(service.active_session().is_none());
    Ok(())
}

#[test]
fn test_finish_keeps_only_done_sets() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    service.start_workout("push1")?;
    service.update_set("A", 0, SetField::Weight, "20")?;
    service.update_set("A", 0, SetField::Reps, "12")?;
    service.update_set("A", 1, SetField::Reps, "11")?;
    service.toggle_set_done("A", 0)?;
    service.update_set("B", 0, SetField::Weight, "40")?;
    service.update_set("B", 0, SetField::Reps, "abc")?;
    service.toggle_set_done("B", 0)?;
    clock.advance(Duration::minutes(42) + Duration::seconds(50));

    let summary = service.finish_workout().expect("summary for a session with done sets");
    assert_eq!(summary.name, "PUSH 1");
    assert_eq!(summary.exercise_count, 2);
    assert_eq!(summary.total_sets, 2);
    // unparseable reps count as zero
    assert_eq!(summary.total_volume, 240.0);
    assert_eq!(summary.duration_minutes, 42);
    assert!(summary.comparison.is_none());

    assert_eq!(service.history().len(), 1);
    let entry = &service.history()[0];
    assert_eq!(entry.workout_id, "push1");
    assert_eq!(entry.duration, Some(42));
    assert_eq!(entry.exercises.keys().collect::<Vec<_>>(), ["A", "B"]);
    assert_eq!(entry.exercises["A"].sets.len(), 1);
    assert!(entry.exercises.values().flat_map(|e| &e.sets).all(|s| s.done));
    Ok(())
}

#[test]
fn test_pr_event_only_above_previous_best() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    let id = add_bench_day(&mut service)?;

    service.start_workout(&id)?;
    service.update_set("A", 0, SetField::Weight, "80")?;
    service.update_set("A", 0, SetField::Reps, "8")?;
    service.toggle_set_done("A", 0)?;
    service.finish_workout();
    clock.advance(Duration::days(2));

    service.start_workout(&id)?;
    assert_eq!(set_values(&service, "A")[0], ("80".into(), "8".into(), false));
    let at_best = service.toggle_set_done("A", 0)?;
    assert!(at_best.personal_record.is_none());

    service.update_set("A", 1, SetField::Weight, "85")?;
    let above = service.toggle_set_done("A", 1)?;
    let pr = above.personal_record.expect("85 beats 80");
    assert_eq!(pr.exercise, "Bench");
    assert_eq!(pr.weight, 85.0);

    // Unticking never reports a record
    assert!(service.toggle_set_done("A", 1)?.personal_record.is_none());
    Ok(())
}

#[test]
fn test_summary_reports_pr_and_comparison() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    let id = add_bench_day(&mut service)?;

    service.start_workout(&id)?;
    service.update_set("A", 0, SetField::Weight, "80")?;
    service.update_set("A", 0, SetField::Reps, "10")?;
    service.toggle_set_done("A", 0)?;
    let first = service.finish_workout().expect("first summary");
    assert_eq!(first.personal_records.len(), 1);
    assert_eq!(first.personal_records[0].previous, 0.0);
    clock.advance(Duration::days(3));

    service.start_workout(&id)?;
    service.update_set("A", 0, SetField::Weight, "82.5")?;
    service.toggle_set_done("A", 0)?;
    service.toggle_set_done("A", 1)?;
    let second = service.finish_workout().expect("second summary");

    assert_eq!(second.personal_records.len(), 1);
    assert_eq!(second.personal_records[0].weight, 82.5);
    assert_eq!(second.personal_records[0].previous, 80.0);
    let cmp = second.comparison.expect("same workout done before");
    assert_eq!(cmp.previous_timestamp, start_time());
    assert_eq!(cmp.sets_delta, 1);
    // 82.5 x 10 + 82.5 x 0 against 80 x 10
    assert_eq!(cmp.volume_delta, 25.0);
    assert_eq!(service.history().len(), 2);
    Ok(())
}

#[test]
fn test_auto_bump_only_where_reps_hit_top() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    let id = add_bench_day(&mut service)?;

    service.start_workout(&id)?;
    for (i, reps) in ["10", "11", "12"].iter().enumerate() {
        service.update_set("A", i, SetField::Weight, "50")?;
        service.update_set("A", i, SetField::Reps, reps)?;
        service.toggle_set_done("A", i)?;
    }
    service.finish_workout();
    clock.advance(Duration::days(2));

    service.start_workout(&id)?;
    let weights: Vec<String> = set_values(&service, "A").into_iter().map(|(w, _, _)| w).collect();
    assert_eq!(weights, ["50", "50", "52.5"]);
    Ok(())
}

#[test]
fn test_bump_uses_configured_increment() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    service.config.overload_increment = 1.25;
    let id = add_bench_day(&mut service)?;

    service.start_workout(&id)?;
    service.update_set("A", 0, SetField::Weight, "20")?;
    service.update_set("A", 0, SetField::Reps, "12")?;
    service.toggle_set_done("A", 0)?;
    service.finish_workout();
    clock.advance(Duration::days(1));

    service.start_workout(&id)?;
    assert_eq!(set_values(&service, "A")[0].0, "21.25");
    Ok(())
}

#[test]
fn test_first_set_weight_propagates_to_empty_sets() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    let id = add_bench_day(&mut service)?;
    service.start_workout(&id)?;

    service.update_set("A", 1, SetField::Weight, "55")?;
    service.update_set("A", 0, SetField::Weight, "60")?;
    let weights: Vec<String> = set_values(&service, "A").into_iter().map(|(w, _, _)| w).collect();
    assert_eq!(weights, ["60", "55", "60"]);

    // Clearing the first set does not clear the others
    service.update_set("A", 0, SetField::Weight, "")?;
    assert_eq!(set_values(&service, "A")[2].0, "60");
    Ok(())
}

#[test]
fn test_rest_timer_runs_after_done_set() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    service.start_workout("push1")?;

    let outcome = service.toggle_set_done("E", 0)?;
    assert_eq!(outcome.rest_started, Some(45));
    assert_eq!(service.rest_display().as_deref(), Some("0:45"));

    clock.advance_secs(30);
    assert_eq!(service.poll_rest(), None);
    assert_eq!(service.rest_display().as_deref(), Some("0:15"));

    clock.advance_secs(20);
    assert_eq!(service.poll_rest(), Some(RestTimerEvent::Done));
    assert_eq!(service.poll_rest(), None);
    assert_eq!(service.rest_display().as_deref(), Some("+0:05"));

    service.skip_rest();
    service.skip_rest();
    assert!(service.rest_display().is_none());
    Ok(())
}

#[test]
fn test_new_rest_replaces_running_one() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    service.start_workout("push1")?;
    service.toggle_set_done("A", 0)?; // "1-2 mins"
    clock.advance_secs(60);
    service.toggle_set_done("E", 0)?; // "45s"
    assert_eq!(service.rest_display().as_deref(), Some("0:45"));
    Ok(())
}

#[test]
fn test_no_rest_sentinel_skips_timer() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_workout("pull1")?;
    // Pull Up / Chin Up rests "ALAN"
    let outcome = service.toggle_set_done("B", 0)?;
    assert!(outcome.done);
    assert_eq!(outcome.rest_started, None);
    assert!(service.rest_display().is_none());
    Ok(())
}

#[test]
fn test_exercise_complete_flag() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_workout("pull1")?;
    // "2 x 10-12"
    assert!(!service.toggle_set_done("C", 0)?.exercise_complete);
    assert!(service.toggle_set_done("C", 1)?.exercise_complete);
    assert!(!service.toggle_set_done("C", 1)?.exercise_complete);
    Ok(())
}

#[test]
fn test_starting_again_replaces_session() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_workout("push1")?;
    service.toggle_set_done("A", 0)?;
    service.start_workout("legs1")?;
    assert_eq!(service.active_session().map(|s| s.workout().id.as_str()), Some("legs1"));
    assert_eq!(service.active_session().map(|s| s.completed_set_count()), Some(0));

    service.abandon_workout();
    assert!(service.active_session().is_none());
    assert!(service.history().is_empty());
    Ok(())
}

#[test]
fn test_history_survives_reload() -> Result<()> {
    let clock = ManualClock::new(start_time());
    let store = Rc::new(MemoryStorage::new());
    let mut service = service_over(Box::new(SharedStorage(store.clone())), &clock)?;
    let id = add_bench_day(&mut service)?;
    service.start_workout(&id)?;
    service.update_set("A", 0, SetField::Weight, "62.5")?;
    service.toggle_set_done("A", 0)?;
    service.finish_workout();
    service.log_body_weight(NaiveDate::from_ymd_opt(2024, 3, 4), 81.3)?;

    let reloaded = service_over(Box::new(SharedStorage(store)), &clock)?;
    assert_eq!(reloaded.history(), service.history());
    assert_eq!(reloaded.body_weight_log(), service.body_weight_log());
    assert_eq!(reloaded.find_workout(&id).map(|w| w.name.as_str()), Some("Bench Day"));
    Ok(())
}

#[test]
fn test_failed_writes_leave_memory_intact() -> Result<()> {
    let clock = ManualClock::new(start_time());
    let mut service = service_over(Box::new(FailingStorage), &clock)?;
    service.start_workout("push1")?;
    service.toggle_set_done("A", 0)?;

    assert!(service.finish_workout().is_some());
    assert_eq!(service.history().len(), 1);
    service.log_body_weight(None, 80.0)?;
    assert_eq!(service.body_weight_log().len(), 1);
    Ok(())
}

#[test]
fn test_writes_and_deletes_reach_mirror() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    let mirror = RecordingMirror::default();
    service.set_mirror(Box::new(mirror.clone()));

    service.start_workout("push1")?;
    service.toggle_set_done("A", 0)?;
    service.finish_workout();
    let entry_id = service.history()[0].id.clone();
    service.delete_history_entry(&entry_id)?;

    assert_eq!(
        *mirror.pushed.borrow(),
        [StorageKey::WorkoutHistory, StorageKey::WorkoutHistory]
    );
    assert_eq!(*mirror.deleted.borrow(), [entry_id]);
    assert!(service.history().is_empty());
    assert!(service.delete_history_entry("nope").is_err());
    Ok(())
}

#[test]
fn test_flush_mirror_waits_for_http_requests() -> Result<()> {
    let (url, requests) = spawn_mirror_server(2)?;
    let (mut service, _clock) = create_test_service()?;
    service.set_mirror(Box::new(HttpMirror::new(url)?));

    service.log_body_weight(NaiveDate::from_ymd_opt(2024, 3, 4), 80.0)?;
    service.start_workout("push1")?;
    service.toggle_set_done("A", 0)?;
    service.finish_workout();
    service.flush_mirror();

    // Both requests were answered before flush returned
    let mut lines: Vec<String> = requests.try_iter().collect();
    lines.sort();
    assert_eq!(lines, ["PUT /kv/bodyWeight HTTP/1.1", "PUT /kv/workoutHistory HTTP/1.1"]);
    Ok(())
}

#[test]
fn test_dropping_http_mirror_delivers_delete() -> Result<()> {
    let (url, requests) = spawn_mirror_server(1)?;
    let mirror = HttpMirror::new(url)?;
    mirror.delete_entry("abc123");
    drop(mirror);
    assert_eq!(requests.try_recv()?, "DELETE /history/abc123 HTTP/1.1");
    Ok(())
}

#[test]
fn test_service_flush_reaches_mirror() -> Result<()> {
    let (service, _clock) = create_test_service()?;
    service.flush_mirror();

    let (mut service, _clock) = create_test_service()?;
    let mirror = RecordingMirror::default();
    service.set_mirror(Box::new(mirror.clone()));
    service.flush_mirror();
    assert_eq!(mirror.flushes.get(), 1);
    Ok(())
}

#[test]
fn test_history_note_set_and_cleared() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.start_workout("legs1")?;
    service.toggle_set_done("A", 0)?;
    service.finish_workout();
    let id = service.history()[0].id.clone();

    service.set_history_note(&id, "  knee felt fine ")?;
    assert_eq!(service.history()[0].notes.as_deref(), Some("knee felt fine"));
    service.set_history_note(&id, "")?;
    assert_eq!(service.history()[0].notes, None);
    assert!(service.set_history_note("missing", "x").is_err());
    Ok(())
}

#[test]
fn test_custom_workouts_crud() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    let id = add_bench_day(&mut service)?;
    assert!(id.starts_with("custom-"));
    assert_eq!(service.list_workouts().len(), 7);
    assert_eq!(service.list_workouts().last().map(|w| w.id.as_str()), Some(id.as_str()));

    clock.advance_secs(1);
    let mut edited = service.find_workout(&id).cloned().expect("just created");
    edited.exercises.push(exercise("B", "Dips", "2 x 8-10", "-"));
    service.update_custom_workout(edited)?;
    assert_eq!(service.find_workout(&id).map(|w| w.exercises.len()), Some(2));

    assert!(matches!(
        service.delete_custom_workout("push1"),
        Err(CatalogError::ReadOnly(_))
    ));
    assert!(matches!(
        service.add_custom_workout("   ", Vec::new(), Vec::new()),
        Err(CatalogError::EmptyName)
    ));
    let removed = service.delete_custom_workout(&id)?;
    assert_eq!(removed.name, "Bench Day");
    assert!(service.find_workout(&id).is_none());
    Ok(())
}

#[test]
fn test_body_weight_logging() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    let day = |d| NaiveDate::from_ymd_opt(2024, 3, d);
    service.log_body_weight(day(1), 82.0)?;
    service.log_body_weight(day(3), 81.0)?;
    service.log_body_weight(day(3), 80.5)?;
    assert!(service.log_body_weight(day(4), 0.0).is_err());
    assert!(service.log_body_weight(day(4), f64::NAN).is_err());

    let summary = service.body_weight_summary().expect("two readings");
    assert_eq!(summary.entries, 2);
    assert_eq!(summary.latest, 80.5);
    assert_eq!(summary.change, -1.5);
    Ok(())
}

#[test]
fn test_history_entry_round_trip() -> Result<()> {
    let mut exercises = BTreeMap::new();
    exercises.insert(
        "A".to_string(),
        LoggedExercise {
            name: "Bench".to_string(),
            sets: vec![SetRecord {
                weight: RawNumber::from("62.5"),
                reps: RawNumber::from("10"),
                done: true,
            }],
        },
    );
    let entry = HistoryEntry {
        id: "lt8kq2xs".to_string(),
        workout_id: "push1".to_string(),
        workout_name: "PUSH 1".to_string(),
        timestamp: Utc.timestamp_millis_opt(1_709_575_200_123).unwrap(),
        duration: Some(55),
        exercises,
        notes: Some("good".to_string()),
    };

    let storage = SqliteStorage::open_in_memory()?;
    gym_tracker_lib::db::store(&storage, StorageKey::WorkoutHistory, &vec![entry.clone()])?;
    let loaded: Vec<HistoryEntry> =
        gym_tracker_lib::db::load(&storage, StorageKey::WorkoutHistory)?.expect("stored above");
    assert_eq!(loaded, vec![entry]);

    let raw = storage.get(StorageKey::WorkoutHistory)?.expect("stored above");
    assert_eq!(raw[0]["workoutId"], "push1");
    assert_eq!(raw[0]["timestamp"], 1_709_575_200_123_i64);
    assert_eq!(raw[0]["exercises"]["A"]["sets"][0]["weight"], "62.5");
    Ok(())
}

#[test]
fn test_config_file_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");

    // Missing file is created with defaults
    let config = load_config_util(&path)?;
    assert_eq!(config, Config::default());
    assert!(path.exists());

    let mut changed = config;
    changed.weekly_target = 5;
    changed.mirror.url = Some("http://localhost:8080".to_string());
    save_config_util(&path, &changed)?;
    assert_eq!(load_config_util(&path)?, changed);

    std::fs::write(&path, "weekly_target = 0\n")?;
    assert!(matches!(load_config_util(&path), Err(ConfigError::InvalidWeeklyTarget)));

    std::fs::write(&path, "overload_increment = 5.0\n")?;
    let partial = load_config_util(&path)?;
    assert_eq!(partial.overload_increment, 5.0);
    assert_eq!(partial.weekly_target, 4);
    Ok(())
}
