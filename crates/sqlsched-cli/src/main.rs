use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use sqlsched_runner::{
    FileOutcomeRecorder, RunReport, RunnerOptions, Schedule, ScheduleRunner,
    SqlxConnectionProvider,
};

mod telemetry;

/// Runs a SQL schedule document against its configured database.
#[derive(Debug, Parser)]
#[command(name = "sqlsched", version, about)]
struct Cli {
    /// Path to the schedule JSON document.
    schedule: PathBuf,

    /// Where the outcome trail is written. A `resultFilePath` in the
    /// document takes precedence.
    #[arg(long, default_value = "result.txt")]
    result_file: PathBuf,

    /// Treat tasks whose statements were all rejected during validation
    /// as failed tasks.
    #[arg(long)]
    fail_on_empty_task: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(report) if report.succeeded() => ExitCode::SUCCESS,
        Ok(report) => {
            error!(run_id = %report.run_id, verdict = ?report.verdict, "schedule run failed");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(error = %err, "schedule run aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<RunReport> {
    let schedule = Schedule::from_json_file(&cli.schedule).await?;

    let result_path = schedule
        .result_file_path
        .clone()
        .unwrap_or(cli.result_file);
    let recorder = Arc::new(FileOutcomeRecorder::new(&result_path));

    let runner = ScheduleRunner::new(SqlxConnectionProvider::new(), recorder).with_options(
        RunnerOptions {
            fail_on_empty_task: cli.fail_on_empty_task,
        },
    );

    let report = runner
        .run(&schedule)
        .await
        .with_context(|| format!("running schedule '{}'", schedule.schedule_name))?;

    info!(
        run_id = %report.run_id,
        tasks = report.tasks_attempted,
        executed = report.statements_executed,
        failed = report.statements_failed,
        rejected = report.statements_rejected,
        result_file = %result_path.display(),
        "schedule run finished"
    );
    Ok(report)
}
