//! Two-phase schedule orchestration.
//!
//! Phase 1 validates every statement of every task without touching the
//! database; phase 2 opens a single connection and executes validated
//! statements task by task inside per-task transactions. Failure
//! cascades are policy-driven: the task's effective policy governs
//! statement-level failures, the schedule's policy governs task-level
//! failures, and the two are resolved by the same
//! [`ErrorPolicy::resolve`] at both phases.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use sqlsched_sql::{extract_statements, validator, DbType, SqlCheckError};

use crate::connection::{ConnectionProvider, ScheduleConnection, StatementError, StatementOutput};
use crate::recorder::{ExecutionOutcome, OutcomeRecorder};
use crate::schedule::{ErrorPolicy, Schedule, Task};

/// Fatal configuration problems, detected before any database or file
/// I/O. Never retried, always surfaced to the caller.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("schedule '{0}' does not specify a database type")]
    MissingDialect(String),
    #[error("schedule '{0}' does not specify a database URL")]
    MissingDatabaseUrl(String),
}

/// Pipeline phase of a schedule run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Validating,
    Connecting,
    Executing,
}

/// Why a run aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunFailure {
    /// A statement failed validation under a `stop` policy.
    Validation { task: String },
    /// The run connection could not be opened.
    Connection { detail: String },
    /// A task failed during execution and the schedule policy is `stop`.
    TaskExecution { task: String },
    /// Transaction control itself failed; fatal regardless of policy.
    Transaction { task: String, detail: String },
    /// A task had no validated statements and the runner is configured
    /// to treat that as a failure.
    EmptyTask { task: String },
}

/// Final verdict of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunVerdict {
    /// Every task was attempted and no `stop`-policy abort occurred.
    /// Individual statements may still have failed under `continue`.
    Completed,
    Failed {
        phase: RunPhase,
        failure: RunFailure,
    },
}

/// Verdict plus counters for one schedule run. Granular per-statement
/// outcomes live only in the recorder trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub verdict: RunVerdict,
    pub tasks_attempted: usize,
    pub statements_executed: usize,
    pub statements_failed: usize,
    pub statements_rejected: usize,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.verdict, RunVerdict::Completed)
    }
}

/// Tunables for schedule runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerOptions {
    /// Treat a task whose statements were all dropped during validation
    /// as a failed task (subject to the schedule policy) instead of a
    /// silent no-op.
    pub fail_on_empty_task: bool,
}

/// A statement that passed syntax validation, ready for execution.
/// The original text goes to the driver; the normalized form is what
/// the grammar accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedStatement {
    text: String,
    normalized: String,
}

impl ValidatedStatement {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }
}

#[derive(Debug, Default)]
struct RunStats {
    tasks_attempted: usize,
    statements_executed: usize,
    statements_failed: usize,
    statements_rejected: usize,
}

impl RunStats {
    fn into_report(self, run_id: Uuid, verdict: RunVerdict) -> RunReport {
        RunReport {
            run_id,
            verdict,
            tasks_attempted: self.tasks_attempted,
            statements_executed: self.statements_executed,
            statements_failed: self.statements_failed,
            statements_rejected: self.statements_rejected,
        }
    }
}

enum TaskValidation {
    Statements(Vec<ValidatedStatement>),
    Abort,
}

enum StatementCheck {
    Valid(ValidatedStatement),
    Dropped,
    Abort,
}

enum TaskOutcome {
    Completed,
    Failed,
}

/// Drives schedules through the validate/connect/execute pipeline.
pub struct ScheduleRunner<P> {
    provider: P,
    recorder: Arc<dyn OutcomeRecorder>,
    options: RunnerOptions,
}

impl<P> ScheduleRunner<P>
where
    P: ConnectionProvider,
{
    pub fn new(provider: P, recorder: Arc<dyn OutcomeRecorder>) -> Self {
        Self {
            provider,
            recorder,
            options: RunnerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the schedule to a single success/failure verdict.
    ///
    /// Configuration errors surface as `Err` before any I/O happens;
    /// everything else, including connection failures and policy-driven
    /// aborts, is reported through the returned [`RunReport`].
    #[instrument(skip(self, schedule), fields(schedule = %schedule.schedule_name))]
    pub async fn run(&self, schedule: &Schedule) -> Result<RunReport, ScheduleError> {
        let run_id = Uuid::new_v4();

        let db_type = schedule
            .db_type
            .ok_or_else(|| ScheduleError::MissingDialect(schedule.schedule_name.clone()))?;
        let db_url = schedule
            .db_url
            .as_deref()
            .ok_or_else(|| ScheduleError::MissingDatabaseUrl(schedule.schedule_name.clone()))?;

        if let Err(err) = self.recorder.init() {
            warn!(error = %err, "failed to initialize outcome recorder");
        }

        let mut stats = RunStats::default();

        if schedule.task_list.is_empty() {
            warn!(%run_id, "schedule has no tasks");
            self.note(&format!(
                "Schedule: {} - No tasks found",
                schedule.schedule_name
            ));
            return Ok(stats.into_report(run_id, RunVerdict::Completed));
        }

        info!(%run_id, tasks = schedule.task_list.len(), "validating schedule");
        self.note(&format!(
            "Schedule: {} - Starting SQL validation",
            schedule.schedule_name
        ));

        let mut validated: Vec<Vec<ValidatedStatement>> =
            Vec::with_capacity(schedule.task_list.len());
        for task in &schedule.task_list {
            match self.validate_task(schedule, task, db_type, &mut stats).await? {
                TaskValidation::Statements(statements) => validated.push(statements),
                TaskValidation::Abort => {
                    self.note(&format!(
                        "Schedule: {} - Execution stopped due to validation failures",
                        schedule.schedule_name
                    ));
                    return Ok(stats.into_report(
                        run_id,
                        RunVerdict::Failed {
                            phase: RunPhase::Validating,
                            failure: RunFailure::Validation {
                                task: task.task_name.clone(),
                            },
                        },
                    ));
                }
            }
        }

        info!(%run_id, "validation complete; connecting");
        self.note(&format!(
            "Schedule: {} - SQL validation completed. Connecting to database...",
            schedule.schedule_name
        ));

        let mut conn = match self
            .provider
            .open(
                db_type,
                db_url,
                schedule.db_user.as_deref(),
                schedule.db_password.as_deref(),
            )
            .await
        {
            Ok(conn) => conn,
            Err(err) => {
                warn!(%run_id, error = %err, "database connection failed");
                self.note(&format!(
                    "Schedule: {} - Database connection error: {err}",
                    schedule.schedule_name
                ));
                return Ok(stats.into_report(
                    run_id,
                    RunVerdict::Failed {
                        phase: RunPhase::Connecting,
                        failure: RunFailure::Connection {
                            detail: err.to_string(),
                        },
                    },
                ));
            }
        };

        let mut verdict = RunVerdict::Completed;
        for (task, statements) in schedule.task_list.iter().zip(validated.iter()) {
            stats.tasks_attempted += 1;

            if statements.is_empty() {
                if self.options.fail_on_empty_task {
                    warn!(task = %task.task_name, "task has no validated statements");
                    self.note(&format!(
                        "Schedule: {} - Task: {} - No validated statements; task reported as failed",
                        schedule.schedule_name, task.task_name
                    ));
                    if schedule.policy_when_error == ErrorPolicy::Stop {
                        verdict = RunVerdict::Failed {
                            phase: RunPhase::Executing,
                            failure: RunFailure::EmptyTask {
                                task: task.task_name.clone(),
                            },
                        };
                        break;
                    }
                } else {
                    self.note(&format!(
                        "Schedule: {} - Task: {} - No validated statements; skipping",
                        schedule.schedule_name, task.task_name
                    ));
                }
                continue;
            }

            match self
                .execute_task(schedule, task, statements, conn.as_mut(), &mut stats)
                .await
            {
                Ok(TaskOutcome::Completed) => {}
                Ok(TaskOutcome::Failed) => {
                    if schedule.policy_when_error == ErrorPolicy::Stop {
                        self.note(&format!(
                            "Schedule: {} - Execution stopped due to task execution failure",
                            schedule.schedule_name
                        ));
                        verdict = RunVerdict::Failed {
                            phase: RunPhase::Executing,
                            failure: RunFailure::TaskExecution {
                                task: task.task_name.clone(),
                            },
                        };
                        break;
                    }
                }
                Err(err) => {
                    verdict = RunVerdict::Failed {
                        phase: RunPhase::Executing,
                        failure: RunFailure::Transaction {
                            task: task.task_name.clone(),
                            detail: err.to_string(),
                        },
                    };
                    break;
                }
            }
        }

        if let Err(err) = conn.close().await {
            warn!(%run_id, error = %err, "failed to close run connection");
        }

        if verdict == RunVerdict::Completed {
            info!(%run_id, "schedule execution completed");
            self.note(&format!(
                "Schedule: {} - Execution completed successfully",
                schedule.schedule_name
            ));
        }

        Ok(stats.into_report(run_id, verdict))
    }

    /// Resolves every entry of one task into validated statements.
    /// `Abort` means a failure hit under a `stop` effective policy.
    async fn validate_task(
        &self,
        schedule: &Schedule,
        task: &Task,
        db_type: DbType,
        stats: &mut RunStats,
    ) -> Result<TaskValidation, ScheduleError> {
        let policy = task.effective_policy(schedule);
        self.note(&format!(
            "Schedule: {} - Task: {} - Starting validation",
            schedule.schedule_name, task.task_name
        ));

        let mut statements = Vec::new();
        for entry in &task.sql_list {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }

            if entry.to_ascii_lowercase().ends_with(".sql") {
                self.note(&format!(
                    "Schedule: {} - Task: {} - Reading SQL file: {entry}",
                    schedule.schedule_name, task.task_name
                ));
                match tokio::fs::read_to_string(entry).await {
                    Ok(contents) => {
                        for stmt in extract_statements(&contents, db_type) {
                            match self.check_statement(
                                schedule, task, &stmt, db_type, policy, stats,
                            )? {
                                StatementCheck::Valid(validated) => statements.push(validated),
                                StatementCheck::Dropped => {}
                                StatementCheck::Abort => return Ok(TaskValidation::Abort),
                            }
                        }
                    }
                    Err(err) => {
                        // A missing or unreadable file follows the same
                        // policy path as a statement that fails to parse.
                        warn!(task = %task.task_name, file = entry, error = %err, "failed to read SQL file");
                        self.record_outcome(ExecutionOutcome::parse_fail(
                            &schedule.schedule_name,
                            &task.task_name,
                            entry,
                            format!("failed to read SQL file: {err}"),
                        ));
                        stats.statements_rejected += 1;
                        if policy == ErrorPolicy::Stop {
                            return Ok(TaskValidation::Abort);
                        }
                    }
                }
            } else {
                match self.check_statement(schedule, task, entry, db_type, policy, stats)? {
                    StatementCheck::Valid(validated) => statements.push(validated),
                    StatementCheck::Dropped => {}
                    StatementCheck::Abort => return Ok(TaskValidation::Abort),
                }
            }
        }

        self.note(&format!(
            "Schedule: {} - Task: {} - Validation completed with {} valid statements",
            schedule.schedule_name,
            task.task_name,
            statements.len()
        ));
        Ok(TaskValidation::Statements(statements))
    }

    fn check_statement(
        &self,
        schedule: &Schedule,
        task: &Task,
        stmt: &str,
        db_type: DbType,
        policy: ErrorPolicy,
        stats: &mut RunStats,
    ) -> Result<StatementCheck, ScheduleError> {
        let stmt = stmt.trim();
        match validator::is_valid(stmt, Some(db_type)) {
            Ok(true) => {
                self.record_outcome(ExecutionOutcome::parse_success(
                    &schedule.schedule_name,
                    &task.task_name,
                    stmt,
                ));
                Ok(StatementCheck::Valid(ValidatedStatement {
                    text: stmt.to_owned(),
                    normalized: db_type.normalize(stmt),
                }))
            }
            Ok(false) => {
                warn!(task = %task.task_name, statement = stmt, "statement failed validation");
                self.record_outcome(ExecutionOutcome::parse_fail(
                    &schedule.schedule_name,
                    &task.task_name,
                    stmt,
                    "invalid SQL syntax",
                ));
                stats.statements_rejected += 1;
                if policy == ErrorPolicy::Stop {
                    Ok(StatementCheck::Abort)
                } else {
                    Ok(StatementCheck::Dropped)
                }
            }
            Err(SqlCheckError::MissingDialect) => Err(ScheduleError::MissingDialect(
                schedule.schedule_name.clone(),
            )),
        }
    }

    /// Executes one task inside a transaction. `Ok(Failed)` is a
    /// policy-visible task failure; `Err` is a transaction-control
    /// failure and fatal to the run.
    async fn execute_task(
        &self,
        schedule: &Schedule,
        task: &Task,
        statements: &[ValidatedStatement],
        conn: &mut dyn ScheduleConnection,
        stats: &mut RunStats,
    ) -> Result<TaskOutcome, StatementError> {
        let policy = task.effective_policy(schedule);
        info!(task = %task.task_name, statements = statements.len(), policy = policy.as_str(), "executing task");
        self.note(&format!(
            "Schedule: {} - Task: {} - Starting execution",
            schedule.schedule_name, task.task_name
        ));

        conn.begin().await?;

        for statement in statements {
            match conn.execute(statement.text()).await {
                Ok(StatementOutput::Rows { columns, rows }) => {
                    stats.statements_executed += 1;
                    self.record_outcome(ExecutionOutcome::execute_success(
                        &schedule.schedule_name,
                        &task.task_name,
                        statement.text(),
                        None,
                    ));
                    if let Err(err) = self.recorder.record_query_result(&columns, &rows) {
                        warn!(error = %err, "failed to append query results");
                    }
                }
                Ok(StatementOutput::RowsAffected(count)) => {
                    stats.statements_executed += 1;
                    self.record_outcome(ExecutionOutcome::execute_success(
                        &schedule.schedule_name,
                        &task.task_name,
                        statement.text(),
                        Some(count),
                    ));
                }
                Err(err) => {
                    stats.statements_failed += 1;
                    warn!(task = %task.task_name, error = %err, "statement execution failed");
                    self.record_outcome(ExecutionOutcome::execute_fail(
                        &schedule.schedule_name,
                        &task.task_name,
                        statement.text(),
                        err.to_string(),
                    ));
                    if policy == ErrorPolicy::Stop {
                        self.try_rollback(schedule, task, conn).await;
                        return Ok(TaskOutcome::Failed);
                    }
                }
            }
        }

        match conn.commit().await {
            Ok(()) => {
                self.note(&format!(
                    "Schedule: {} - Task: {} - Execution completed successfully",
                    schedule.schedule_name, task.task_name
                ));
                Ok(TaskOutcome::Completed)
            }
            Err(err) => {
                self.note(&format!(
                    "Schedule: {} - Task: {} - Transaction error: {err}",
                    schedule.schedule_name, task.task_name
                ));
                self.try_rollback(schedule, task, conn).await;
                Err(err)
            }
        }
    }

    /// Best-effort rollback: its own failure is recorded but never
    /// masks the error that triggered it.
    async fn try_rollback(&self, schedule: &Schedule, task: &Task, conn: &mut dyn ScheduleConnection) {
        if let Err(err) = conn.rollback().await {
            warn!(task = %task.task_name, error = %err, "rollback failed");
            self.note(&format!(
                "Schedule: {} - Task: {} - Rollback error: {err}",
                schedule.schedule_name, task.task_name
            ));
        }
    }

    fn note(&self, line: &str) {
        if let Err(err) = self.recorder.record(line) {
            warn!(error = %err, "failed to append outcome line");
        }
    }

    fn record_outcome(&self, outcome: ExecutionOutcome) {
        if let Err(err) = self.recorder.record_outcome(&outcome) {
            warn!(error = %err, "failed to append outcome record");
        }
    }
}
