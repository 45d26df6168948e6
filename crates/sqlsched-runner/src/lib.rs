//! Schedule orchestration for sqlsched.
//!
//! Consumes a schedule document (one database target, many tasks, each
//! an ordered list of SQL entries), validates every statement before a
//! connection is opened, then executes task by task inside per-task
//! transactions while appending a structured outcome trail. Failure
//! handling cascades through three policy scopes: statement, task and
//! schedule.

pub mod connection;
pub mod executor;
pub mod recorder;
pub mod schedule;

pub use connection::{
    ConnectError, ConnectionProvider, ScheduleConnection, SqlxConnectionProvider, StatementError,
    StatementOutput,
};
pub use executor::{
    RunFailure, RunPhase, RunReport, RunVerdict, RunnerOptions, ScheduleError, ScheduleRunner,
    ValidatedStatement,
};
pub use recorder::{
    ExecutionOutcome, FileOutcomeRecorder, MemoryOutcomeRecorder, OutcomeRecorder,
};
pub use schedule::{ErrorPolicy, Schedule, Task};
pub use sqlsched_sql::DbType;
