//! Append-only outcome trail: the sole audit surface for schedule runs.
//!
//! The recorder is an explicit instance handed to the orchestrator at
//! construction, scoped to one run, so concurrent callers and tests
//! never share hidden global state.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use parking_lot::Mutex;

const SEPARATOR: &str = "===============================================================";
const MAX_SQL_CHARS: usize = 100;

/// Pipeline phase a statement outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomePhase {
    Parse,
    Execute,
}

/// Result of one statement in its phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeResult {
    Success,
    Fail,
}

/// One per-statement record in the trail, ordered by occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub schedule: String,
    pub task: String,
    pub sql: String,
    pub phase: OutcomePhase,
    pub result: OutcomeResult,
    pub detail: Option<String>,
}

impl ExecutionOutcome {
    pub fn parse_success(schedule: &str, task: &str, sql: &str) -> Self {
        Self::new(schedule, task, sql, OutcomePhase::Parse, OutcomeResult::Success, None)
    }

    pub fn parse_fail(schedule: &str, task: &str, sql: &str, detail: impl Into<String>) -> Self {
        Self::new(
            schedule,
            task,
            sql,
            OutcomePhase::Parse,
            OutcomeResult::Fail,
            Some(detail.into()),
        )
    }

    /// `rows_affected` is reported for effect statements; read queries
    /// carry their rows separately via the query-result record.
    pub fn execute_success(
        schedule: &str,
        task: &str,
        sql: &str,
        rows_affected: Option<u64>,
    ) -> Self {
        Self::new(
            schedule,
            task,
            sql,
            OutcomePhase::Execute,
            OutcomeResult::Success,
            rows_affected.map(|count| format!("rows affected: {count}")),
        )
    }

    pub fn execute_fail(schedule: &str, task: &str, sql: &str, detail: impl Into<String>) -> Self {
        Self::new(
            schedule,
            task,
            sql,
            OutcomePhase::Execute,
            OutcomeResult::Fail,
            Some(detail.into()),
        )
    }

    fn new(
        schedule: &str,
        task: &str,
        sql: &str,
        phase: OutcomePhase,
        result: OutcomeResult,
        detail: Option<String>,
    ) -> Self {
        Self {
            schedule: schedule.to_owned(),
            task: task.to_owned(),
            sql: sql.to_owned(),
            phase,
            result,
            detail,
        }
    }

    fn verdict_line(&self) -> String {
        match (self.phase, self.result) {
            (OutcomePhase::Parse, OutcomeResult::Success) => "parse success".to_owned(),
            (OutcomePhase::Parse, OutcomeResult::Fail) => format!(
                "parse fail: {}",
                self.detail.as_deref().unwrap_or("invalid SQL syntax")
            ),
            (OutcomePhase::Execute, OutcomeResult::Success) => match &self.detail {
                Some(detail) => format!("execution success - {detail}"),
                None => "execution success".to_owned(),
            },
            (OutcomePhase::Execute, OutcomeResult::Fail) => format!(
                "execution fail: {}",
                self.detail.as_deref().unwrap_or("statement failed")
            ),
        }
    }
}

/// Sink for the outcome trail. Implementations append and flush; the
/// core never reads the sink back.
pub trait OutcomeRecorder: Send + Sync {
    /// Prepares the sink. Idempotent per instance: the first call writes
    /// a dated header (fresh sink) or a run-boundary marker (sink
    /// already has content); later calls do nothing.
    fn init(&self) -> Result<()>;

    /// Appends one line, flushed before returning.
    fn record(&self, line: &str) -> Result<()>;

    /// Appends a two-line record for one statement outcome.
    fn record_outcome(&self, outcome: &ExecutionOutcome) -> Result<()> {
        self.record(&format!(
            "{}-{}-{}",
            outcome.schedule,
            outcome.task,
            truncate_sql(&outcome.sql)
        ))?;
        self.record(&outcome.verdict_line())
    }

    /// Appends the column names and stringified rows of a read query.
    fn record_query_result(&self, columns: &[String], rows: &[Vec<String>]) -> Result<()> {
        self.record(&format!("Query Results - Columns: {}", columns.join(", ")))?;
        for (idx, row) in rows.iter().enumerate() {
            self.record(&format!("Row {}: {}", idx + 1, row.join(", ")))?;
        }
        self.record(&format!("Total rows: {}", rows.len()))
    }
}

/// Shortens long SQL for trail readability. Char-based so multibyte
/// text never splits.
pub fn truncate_sql(sql: &str) -> String {
    if sql.chars().count() <= MAX_SQL_CHARS {
        sql.to_owned()
    } else {
        let mut out: String = sql.chars().take(MAX_SQL_CHARS).collect();
        out.push_str("...");
        out
    }
}

/// Production recorder: an append-only text file, `result.txt` by
/// default at the caller's discretion.
#[derive(Debug)]
pub struct FileOutcomeRecorder {
    path: PathBuf,
    state: Mutex<RecorderState>,
}

#[derive(Debug)]
struct RecorderState {
    file: Option<File>,
}

impl FileOutcomeRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(RecorderState { file: None }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutcomeRecorder for FileOutcomeRecorder {
    fn init(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.file.is_some() {
            return Ok(());
        }

        if let Some(parent) = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating result directory {}", parent.display()))?;
        }

        let has_content = std::fs::metadata(&self.path)
            .map(|meta| meta.len() > 0)
            .unwrap_or(false);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening result file {}", self.path.display()))?;

        let now = Utc::now().format("%Y-%m-%dT%H:%M:%S");
        if has_content {
            writeln!(file)?;
            writeln!(file, "{SEPARATOR}")?;
            writeln!(file, "New Execution - {now}")?;
            writeln!(file, "{SEPARATOR}")?;
        } else {
            writeln!(file, "SQL Execution Results - {now}")?;
            writeln!(file, "{SEPARATOR}")?;
        }
        file.flush().context("flushing result file header")?;

        state.file = Some(file);
        Ok(())
    }

    fn record(&self, line: &str) -> Result<()> {
        let mut state = self.state.lock();
        let file = state
            .file
            .as_mut()
            .ok_or_else(|| anyhow!("outcome recorder used before init"))?;
        writeln!(file, "{line}")
            .with_context(|| format!("writing to result file {}", self.path.display()))?;
        file.flush()
            .with_context(|| format!("flushing result file {}", self.path.display()))
    }
}

/// In-memory recorder for tests and embedding callers that want the
/// trail without a file on disk.
#[derive(Debug, Default)]
pub struct MemoryOutcomeRecorder {
    lines: Mutex<Vec<String>>,
}

impl MemoryOutcomeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl OutcomeRecorder for MemoryOutcomeRecorder {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn record(&self, line: &str) -> Result<()> {
        self.lines.lock().push(line.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fresh_sink_gets_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("result.txt");
        let recorder = FileOutcomeRecorder::new(&path);

        recorder.init().unwrap();
        recorder.init().unwrap();
        recorder.record("first line").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents
                .lines()
                .filter(|line| line.starts_with("SQL Execution Results"))
                .count(),
            1
        );
        assert!(contents.contains("first line"));
    }

    #[test]
    fn existing_sink_gets_run_boundary_marker() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("result.txt");
        std::fs::write(&path, "previous run\n").unwrap();

        let recorder = FileOutcomeRecorder::new(&path);
        recorder.init().unwrap();
        recorder.record("second run line").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("previous run"));
        assert!(contents.contains("New Execution - "));
        assert!(contents.contains("second run line"));
    }

    #[test]
    fn record_before_init_is_an_error() {
        let dir = tempdir().unwrap();
        let recorder = FileOutcomeRecorder::new(dir.path().join("result.txt"));
        assert!(recorder.record("too early").is_err());
    }

    #[test]
    fn outcome_renders_two_lines() {
        let recorder = MemoryOutcomeRecorder::new();
        recorder
            .record_outcome(&ExecutionOutcome::parse_success("s", "t", "SELECT 1"))
            .unwrap();
        recorder
            .record_outcome(&ExecutionOutcome::execute_success(
                "s",
                "t",
                "DELETE FROM t",
                Some(3),
            ))
            .unwrap();
        recorder
            .record_outcome(&ExecutionOutcome::execute_fail(
                "s",
                "t",
                "DROP TABLE missing",
                "no such table",
            ))
            .unwrap();

        let lines = recorder.lines();
        assert_eq!(lines[0], "s-t-SELECT 1");
        assert_eq!(lines[1], "parse success");
        assert_eq!(lines[3], "execution success - rows affected: 3");
        assert_eq!(lines[5], "execution fail: no such table");
    }

    #[test]
    fn query_results_render_columns_rows_and_count() {
        let recorder = MemoryOutcomeRecorder::new();
        recorder
            .record_query_result(
                &["id".to_owned(), "name".to_owned()],
                &[
                    vec!["1".to_owned(), "alice".to_owned()],
                    vec!["2".to_owned(), "bob".to_owned()],
                ],
            )
            .unwrap();

        let lines = recorder.lines();
        assert_eq!(lines[0], "Query Results - Columns: id, name");
        assert_eq!(lines[1], "Row 1: 1, alice");
        assert_eq!(lines[2], "Row 2: 2, bob");
        assert_eq!(lines[3], "Total rows: 2");
    }

    #[test]
    fn long_sql_truncates_on_char_boundary() {
        let long = "S".repeat(150);
        let truncated = truncate_sql(&long);
        assert_eq!(truncated.chars().count(), 103);
        assert!(truncated.ends_with("..."));

        let short = "SELECT 1";
        assert_eq!(truncate_sql(short), short);
    }
}
