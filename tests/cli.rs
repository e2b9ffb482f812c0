use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use sea_orm::{ConnectionTrait, Database, DatabaseBackend, Statement};
use serde_json::Value;
use tempfile::TempDir;
use url::Url;

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_gymlog"))
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("gym.db")
}

fn run_cmd_with_session(dir: &TempDir, session_id: &str, args: &[&str]) -> Output {
    let mut cmd = Command::new(bin_path());
    cmd.arg("--db")
        .arg(db_path(dir))
        .arg("--session-id")
        .arg(session_id)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd.output().expect("run command")
}

fn run_cmd(dir: &TempDir, args: &[&str]) -> Output {
    run_cmd_with_session(dir, "test-session", args)
}

fn output_stdout(output: Output) -> String {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("stdout utf8")
}

fn output_stderr(output: Output) -> String {
    assert!(!output.status.success(), "command unexpectedly succeeded");
    String::from_utf8(output.stderr).expect("stderr utf8")
}

fn parse_created_id(stdout: &str, prefix: &str) -> i64 {
    let line = stdout
        .lines()
        .find(|line| line.starts_with(prefix))
        .unwrap_or_else(|| panic!("missing '{prefix}' in: {stdout}"));
    let rest = line.strip_prefix(prefix).expect("prefix");
    let id_str = rest.split(':').next().expect("id");
    id_str.trim().parse().expect("id parse")
}

fn setup_user(dir: &TempDir) {
    output_stdout(run_cmd(dir, &["user", "add", "sam"]));
}

fn add_definition(dir: &TempDir, name: &str) -> i64 {
    let stdout = output_stdout(run_cmd(dir, &["definition", "add", name]));
    parse_created_id(&stdout, "Created definition ID: ")
}

fn start_workout(dir: &TempDir) -> i64 {
    let stdout = output_stdout(run_cmd(dir, &["workout", "start", "--user", "sam"]));
    parse_created_id(&stdout, "Started workout ID: ")
}

fn add_exercise(dir: &TempDir, definition_id: i64) -> i64 {
    let stdout = output_stdout(run_cmd(
        dir,
        &["exercise", "add", &definition_id.to_string()],
    ));
    parse_created_id(&stdout, "Created exercise ID: ")
}

fn add_set(dir: &TempDir, exercise_id: i64, reps: &str, weight: &str) {
    output_stdout(run_cmd(
        dir,
        &[
            "set",
            "add",
            &exercise_id.to_string(),
            "--reps",
            reps,
            "--weight",
            weight,
        ],
    ));
}

/// Finished workout with Bench Press partnered to Barbell Row.
fn finished_workout(dir: &TempDir) -> i64 {
    setup_user(dir);
    let bench = add_definition(dir, "Bench Press");
    let row = add_definition(dir, "Barbell Row");
    let workout_id = start_workout(dir);
    let bench_exercise = add_exercise(dir, bench);
    let row_exercise = add_exercise(dir, row);
    add_set(dir, bench_exercise, "8", "80");
    add_set(dir, row_exercise, "10", "60");
    output_stdout(run_cmd(
        dir,
        &[
            "exercise",
            "partner",
            &bench_exercise.to_string(),
            &row_exercise.to_string(),
        ],
    ));
    let stdout = output_stdout(run_cmd(dir, &["workout", "finish"]));
    assert!(stdout.contains(&format!("Finished workout ID: {workout_id}")));
    workout_id
}

fn show_json(dir: &TempDir, workout_id: i64) -> Value {
    let stdout = output_stdout(run_cmd(
        dir,
        &["workout", "show", &workout_id.to_string(), "--json"],
    ));
    serde_json::from_str(&stdout).expect("json output")
}

fn exercise_ids(detail: &Value) -> Vec<i64> {
    detail["exercises"]
        .as_array()
        .expect("exercises")
        .iter()
        .map(|item| item["exercise"]["id"].as_i64().expect("exercise id"))
        .collect()
}

async fn count_rows(dir: &TempDir, sql: &str) -> i64 {
    let mut url = Url::from_file_path(db_path(dir)).expect("db path");
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    let db = Database::connect(&sqlite_url).await.expect("connect db");
    let row = db
        .query_one(Statement::from_string(DatabaseBackend::Sqlite, sql.to_string()))
        .await
        .expect("query")
        .expect("row");
    row.try_get_by_index::<i64>(0).expect("count")
}

#[test]
fn start_add_and_finish_creates_active_workout() {
    let dir = TempDir::new().expect("temp dir");
    let workout_id = finished_workout(&dir);

    let stdout = output_stdout(run_cmd(&dir, &["workout", "active"]));
    assert!(stdout.contains("No active workout."));

    let stdout = output_stdout(run_cmd(&dir, &["workout", "list", "--user", "sam"]));
    assert!(stdout.contains(&format!("[active] Gym Workout (workout id {workout_id}")));

    let stdout = output_stdout(run_cmd(&dir, &["workout", "show", &workout_id.to_string()]));
    assert!(stdout.contains("- Superset:"));
    assert!(stdout.contains("Bench Press"));
    assert!(stdout.contains("1. 8 x 80kg"));
}

#[test]
fn edit_copies_workout_and_finish_keeps_original_id() {
    let dir = TempDir::new().expect("temp dir");
    let workout_id = finished_workout(&dir);
    let original = show_json(&dir, workout_id);
    let original_exercises = exercise_ids(&original);

    let stdout = output_stdout(run_cmd(&dir, &["workout", "edit", &workout_id.to_string()]));
    let prefix = format!("Editing workout ID: {workout_id} as draft ID: ");
    let draft_id: i64 = stdout
        .trim()
        .strip_prefix(&prefix)
        .expect("edit output")
        .parse()
        .expect("draft id");

    let draft = show_json(&dir, draft_id);
    assert_eq!(draft["workout"]["status"], "draft");
    assert_eq!(draft["workout"]["original_workout_id"], workout_id);
    let draft_exercises = exercise_ids(&draft);
    assert_eq!(draft_exercises.len(), 2);
    assert!(draft_exercises
        .iter()
        .all(|id| !original_exercises.contains(id)));
    assert_eq!(
        draft["exercises"][0]["exercise"]["superset_partner_id"],
        draft_exercises[1]
    );

    add_set(&dir, draft_exercises[0], "6", "85");
    let untouched = show_json(&dir, workout_id);
    assert_eq!(
        untouched["exercises"][0]["sets"].as_array().expect("sets").len(),
        1
    );

    let stdout = output_stdout(run_cmd(
        &dir,
        &["workout", "finish", "--notes", "heavier"],
    ));
    assert!(stdout.contains(&format!("Finished workout ID: {workout_id}")));

    let finished = show_json(&dir, workout_id);
    assert_eq!(finished["workout"]["notes"], "heavier");
    assert_eq!(exercise_ids(&finished), draft_exercises);
    assert_eq!(
        finished["exercises"][0]["sets"].as_array().expect("sets").len(),
        2
    );

    let stderr = output_stderr(run_cmd(&dir, &["workout", "show", &draft_id.to_string()]));
    assert!(stderr.contains(&format!("Not found: workout id {draft_id}")));
}

#[test]
fn discard_twice_is_idempotent() {
    let dir = TempDir::new().expect("temp dir");
    let workout_id = finished_workout(&dir);
    let stdout = output_stdout(run_cmd(&dir, &["workout", "edit", &workout_id.to_string()]));
    let draft_id: i64 = stdout
        .trim()
        .rsplit(' ')
        .next()
        .expect("draft id")
        .parse()
        .expect("draft id parse");

    let stdout = output_stdout(run_cmd(&dir, &["workout", "discard"]));
    assert!(stdout.contains(&format!("Discarded draft ID: {draft_id}.")));
    assert!(stdout.contains(&format!("Workout ID: {workout_id} unchanged.")));

    let stdout = output_stdout(run_cmd(
        &dir,
        &["workout", "discard", "--id", &draft_id.to_string()],
    ));
    assert!(stdout.contains(&format!("Draft ID: {draft_id} already discarded.")));

    let original = show_json(&dir, workout_id);
    assert_eq!(original["workout"]["status"], "active");
    assert_eq!(exercise_ids(&original).len(), 2);
}

#[test]
fn editing_again_resumes_pending_copy() {
    let dir = TempDir::new().expect("temp dir");
    let workout_id = finished_workout(&dir);
    let id_arg = workout_id.to_string();

    let first = output_stdout(run_cmd(&dir, &["workout", "edit", &id_arg]));
    let second = output_stdout(run_cmd(&dir, &["workout", "edit", &id_arg]));
    assert_eq!(first, second);
    assert!(second.starts_with(&format!("Editing workout ID: {workout_id} as draft ID: ")));

    let stdout = output_stdout(run_cmd(&dir, &["workout", "list", "--user", "sam"]));
    let pending = stdout
        .lines()
        .filter(|line| line.contains(&format!("editing workout {workout_id}")))
        .count();
    assert_eq!(pending, 1);
}

#[test]
fn start_with_draft_in_progress_requires_flag() {
    let dir = TempDir::new().expect("temp dir");
    setup_user(&dir);
    let first = start_workout(&dir);

    let stderr = output_stderr(run_cmd(&dir, &["workout", "start", "--user", "sam"]));
    assert!(stderr.contains("--discard-current"));

    let stdout = output_stdout(run_cmd(
        &dir,
        &["workout", "start", "--user", "sam", "--discard-current"],
    ));
    assert!(stdout.contains(&format!("Discarded draft ID: {first}.")));
    let second = parse_created_id(&stdout, "Started workout ID: ");
    assert_ne!(first, second);

    let stdout = output_stdout(run_cmd(&dir, &["workout", "active"]));
    assert!(stdout.contains(&format!("Workout ID: {second}")));
}

#[test]
fn sessions_track_their_own_drafts() {
    let dir = TempDir::new().expect("temp dir");
    setup_user(&dir);
    let phone_draft = start_workout(&dir);

    let stdout = output_stdout(run_cmd_with_session(&dir, "laptop", &["workout", "active"]));
    assert!(stdout.contains("No active workout."));

    let stdout = output_stdout(run_cmd_with_session(
        &dir,
        "laptop",
        &["workout", "start", "--user", "sam"],
    ));
    let laptop_draft = parse_created_id(&stdout, "Started workout ID: ");
    assert_ne!(phone_draft, laptop_draft);

    let stdout = output_stdout(run_cmd(&dir, &["workout", "active"]));
    assert!(stdout.contains(&format!("Workout ID: {phone_draft}")));
}

#[test]
fn finished_workout_rejects_direct_mutation() {
    let dir = TempDir::new().expect("temp dir");
    let workout_id = finished_workout(&dir);
    let squat = add_definition(&dir, "Squat");

    let stderr = output_stderr(run_cmd(
        &dir,
        &[
            "exercise",
            "add",
            &squat.to_string(),
            "--workout",
            &workout_id.to_string(),
        ],
    ));
    assert!(stderr.contains("open it for editing first"));
}

#[test]
fn finish_without_active_workout_fails() {
    let dir = TempDir::new().expect("temp dir");
    setup_user(&dir);
    let stderr = output_stderr(run_cmd(&dir, &["workout", "finish"]));
    assert!(stderr.contains("no active workout"));
}

#[test]
fn superset_group_commands_report_order() {
    let dir = TempDir::new().expect("temp dir");
    setup_user(&dir);
    let squat = add_definition(&dir, "Squat");
    let lunge = add_definition(&dir, "Lunge");
    start_workout(&dir);
    let first = add_exercise(&dir, squat);
    let second = add_exercise(&dir, lunge);

    let stdout = output_stdout(run_cmd(
        &dir,
        &["exercise", "superset", &first.to_string(), "legs"],
    ));
    assert!(stdout.contains("joined superset 'legs' at order 0"));
    let stdout = output_stdout(run_cmd(
        &dir,
        &["exercise", "superset", &second.to_string(), "legs"],
    ));
    assert!(stdout.contains("at order 1"));

    let stdout = output_stdout(run_cmd(&dir, &["exercise", "group", "legs"]));
    assert!(stdout.contains(&format!("0. exercise ID: {first}")));
    assert!(stdout.contains("Next order: 2"));

    let stdout = output_stdout(run_cmd(&dir, &["workout", "show"]));
    assert!(stdout.contains("- Superset 'legs':"));
}

#[tokio::test]
async fn remove_workout_drops_drafts_and_session_pointers() {
    let dir = TempDir::new().expect("temp dir");
    let workout_id = finished_workout(&dir);
    output_stdout(run_cmd(&dir, &["workout", "edit", &workout_id.to_string()]));

    let stdout = output_stdout(run_cmd(&dir, &["workout", "remove", &workout_id.to_string()]));
    assert!(stdout.contains(&format!("Workout ID: {workout_id} removed.")));
    assert!(stdout.contains("Removed 1 pending draft(s)."));

    assert_eq!(count_rows(&dir, "SELECT COUNT(*) FROM workouts").await, 0);
    assert_eq!(
        count_rows(&dir, "SELECT COUNT(*) FROM exercise_instances").await,
        0
    );
    assert_eq!(count_rows(&dir, "SELECT COUNT(*) FROM gym_sets").await, 0);
    assert_eq!(
        count_rows(&dir, "SELECT COUNT(*) FROM active_workouts").await,
        0
    );
}

#[tokio::test]
async fn failed_copy_leaves_no_rows_behind() {
    let dir = TempDir::new().expect("temp dir");
    let workout_id = finished_workout(&dir);

    setup_other_workout(&dir).await;
    let before = count_rows(&dir, "SELECT COUNT(*) FROM exercise_instances").await;

    let stderr = output_stderr(run_cmd(&dir, &["workout", "edit", &workout_id.to_string()]));
    assert!(stderr.contains("Consistency violation"));

    assert_eq!(
        count_rows(&dir, "SELECT COUNT(*) FROM exercise_instances").await,
        before
    );
    assert_eq!(
        count_rows(
            &dir,
            &format!("SELECT COUNT(*) FROM workouts WHERE original_workout_id = {workout_id}")
        )
        .await,
        0
    );
}

/// Points the first exercise of workout 1 at an exercise of another workout.
async fn setup_other_workout(dir: &TempDir) {
    let row_definition = 2;
    let workout_id = start_workout(dir);
    assert!(workout_id > 1);
    let foreign = add_exercise(dir, row_definition);
    output_stdout(run_cmd(dir, &["workout", "finish"]));

    let mut url = Url::from_file_path(db_path(dir)).expect("db path");
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    let db = Database::connect(&sqlite_url).await.expect("connect db");
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        format!(
            "UPDATE exercise_instances SET superset_partner_id = {foreign} \
             WHERE workout_id = 1 AND sort_number = 1;"
        ),
    ))
    .await
    .expect("corrupt partner link");
}
