mod args;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use mssql_tasks::prelude::*;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

use crate::args::{Args, Task, TaskFiles};

#[derive(Debug, Error)]
enum CliError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Task(#[from] SqlTaskError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(tracing::Level::from(args.log_level))
        .init();

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            interrupt.cancel();
        }
    });

    match run(args.task, &token).await {
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "task failed");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(task: Task, token: &CancellationToken) -> Result<JsonValue, CliError> {
    let tasks = SqlTasks::mssql();
    let value = match task {
        Task::Query(files) => {
            let input: QueryInput = read_json(&files.input)?;
            let options = execution_options(&files)?;
            tasks.execute_query(&input, &options, token).await?
        }
        Task::Procedure(files) => {
            let input: ProcedureInput = read_json(&files.input)?;
            let options = execution_options(&files)?;
            tasks.execute_procedure(&input, &options, token).await?
        }
        Task::Batch(files) => {
            let input: BatchInput = read_json(&files.input)?;
            let options = execution_options(&files)?;
            JsonValue::from(tasks.batch_operation(&input, &options, token).await?)
        }
        Task::Bulk(files) => {
            let input: BulkInsertInput = read_json(&files.input)?;
            let mut options: BulkInsertOptions = match &files.options {
                Some(path) => read_json(path)?,
                None => BulkInsertOptions::default(),
            };
            if let Some(level) = files.isolation_level {
                options.execution.isolation_level = level;
            }
            JsonValue::from(tasks.bulk_insert(&input, &options, token).await?)
        }
    };
    Ok(value)
}

fn execution_options(files: &TaskFiles) -> Result<Options, CliError> {
    let mut options: Options = match &files.options {
        Some(path) => read_json(path)?,
        None => Options::default(),
    };
    if let Some(level) = files.isolation_level {
        options.isolation_level = level;
    }
    Ok(options)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
