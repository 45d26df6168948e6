//! End-to-end schedule runs against an in-memory SQLite database.

use std::sync::Arc;

use sqlsched_runner::{
    DbType, ErrorPolicy, FileOutcomeRecorder, MemoryOutcomeRecorder, Schedule, ScheduleRunner,
    SqlxConnectionProvider, Task,
};

fn sqlite_schedule(policy: ErrorPolicy, tasks: Vec<Task>) -> Schedule {
    Schedule {
        schedule_name: "integration".to_owned(),
        policy_when_error: policy,
        db_type: Some(DbType::Sqlite),
        db_url: Some("sqlite::memory:".to_owned()),
        db_user: None,
        db_password: None,
        result_file_path: None,
        task_list: tasks,
    }
}

fn task(name: &str, policy: Option<ErrorPolicy>, statements: &[&str]) -> Task {
    Task {
        task_name: name.to_owned(),
        policy_when_error: policy,
        sql_list: statements.iter().map(|s| (*s).to_owned()).collect(),
    }
}

#[tokio::test]
async fn full_run_creates_inserts_and_reads_back() {
    let recorder = Arc::new(MemoryOutcomeRecorder::new());
    let runner = ScheduleRunner::new(SqlxConnectionProvider::new(), recorder.clone());
    let schedule = sqlite_schedule(
        ErrorPolicy::Stop,
        vec![
            task(
                "setup",
                None,
                &["CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)"],
            ),
            task(
                "load",
                None,
                &[
                    "INSERT INTO users (id, name) VALUES (1, 'alice')",
                    "INSERT INTO users (id, name) VALUES (2, 'bob')",
                ],
            ),
            task("report", None, &["SELECT name FROM users"]),
        ],
    );

    let report = runner.run(&schedule).await.unwrap();
    assert!(report.succeeded());
    assert_eq!(report.tasks_attempted, 3);
    assert_eq!(report.statements_executed, 4);
    assert_eq!(report.statements_failed, 0);

    let lines = recorder.lines();
    assert!(lines.iter().any(|line| line.contains("rows affected: 1")));
    assert!(lines.iter().any(|line| line == "Total rows: 2"));
    assert!(lines.iter().any(|line| line.starts_with("Row 1: ")));
}

#[tokio::test]
async fn continue_policy_records_failures_and_completes() {
    let recorder = Arc::new(MemoryOutcomeRecorder::new());
    let runner = ScheduleRunner::new(SqlxConnectionProvider::new(), recorder.clone());
    let schedule = sqlite_schedule(
        ErrorPolicy::Continue,
        vec![
            task("setup", None, &["CREATE TABLE t (id INTEGER)"]),
            task(
                "flaky",
                None,
                &[
                    "INSERT INTO nowhere VALUES (1)",
                    "INSERT INTO t VALUES (1)",
                ],
            ),
            task("report", None, &["SELECT id FROM t"]),
        ],
    );

    let report = runner.run(&schedule).await.unwrap();
    assert!(report.succeeded());
    assert_eq!(report.statements_failed, 1);

    let lines = recorder.lines();
    assert!(lines.iter().any(|line| line.starts_with("execution fail:")));
    assert!(lines.iter().any(|line| line == "Total rows: 1"));
}

#[tokio::test]
async fn stop_policy_rolls_back_the_failing_task() {
    let recorder = Arc::new(MemoryOutcomeRecorder::new());
    let runner = ScheduleRunner::new(SqlxConnectionProvider::new(), recorder.clone());
    let schedule = sqlite_schedule(
        ErrorPolicy::Continue,
        vec![
            task("setup", None, &["CREATE TABLE t (id INTEGER)"]),
            task(
                "load",
                Some(ErrorPolicy::Stop),
                &[
                    "INSERT INTO t VALUES (1)",
                    "INSERT INTO nowhere VALUES (1)",
                ],
            ),
            task("report", None, &["SELECT id FROM t"]),
        ],
    );

    let report = runner.run(&schedule).await.unwrap();
    // The failed task rolled back its insert, the schedule-level
    // `continue` policy let the run finish anyway.
    assert!(report.succeeded());
    assert!(recorder.lines().iter().any(|line| line == "Total rows: 0"));
}

#[tokio::test]
async fn sql_file_reference_executes_against_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("seed.sql");
    std::fs::write(
        &seed,
        "-- seed rows\nCREATE TABLE u (id INTEGER, label TEXT);\nINSERT INTO u VALUES (1, 'a;b'); /* literal semicolon above */\n",
    )
    .unwrap();

    let recorder = Arc::new(MemoryOutcomeRecorder::new());
    let runner = ScheduleRunner::new(SqlxConnectionProvider::new(), recorder.clone());
    let schedule = sqlite_schedule(
        ErrorPolicy::Stop,
        vec![
            task("seed", None, &[seed.to_str().unwrap()]),
            task("check", None, &["SELECT label FROM u"]),
        ],
    );

    let report = runner.run(&schedule).await.unwrap();
    assert!(report.succeeded());
    assert_eq!(report.statements_executed, 3);
    assert!(recorder.lines().iter().any(|line| line == "Row 1: a;b"));
}

#[tokio::test]
async fn json_document_runs_with_a_file_trail() {
    let dir = tempfile::tempdir().unwrap();
    let doc_path = dir.path().join("schedule.json");
    let result_path = dir.path().join("result.txt");

    let doc = serde_json::json!({
        "scheduleName": "doc-run",
        "policyWhenError": "continue",
        "dbType": "sqlite",
        "dbUrl": "sqlite::memory:",
        "taskList": [
            { "taskName": "setup", "sqlList": ["CREATE TABLE t (id INTEGER)"] },
            { "taskName": "probe", "sqlList": ["SELECT id FROM t"] }
        ]
    });
    std::fs::write(&doc_path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();

    let schedule = Schedule::from_json_file(&doc_path).await.unwrap();
    let recorder = Arc::new(FileOutcomeRecorder::new(&result_path));
    let runner = ScheduleRunner::new(SqlxConnectionProvider::new(), recorder);

    let report = runner.run(&schedule).await.unwrap();
    assert!(report.succeeded());

    let trail = std::fs::read_to_string(&result_path).unwrap();
    assert!(trail.starts_with("SQL Execution Results - "));
    assert!(trail.contains("parse success"));
    assert!(trail.contains("Total rows: 0"));
}
