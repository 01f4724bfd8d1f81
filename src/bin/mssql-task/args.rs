use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use mssql_tasks::IsolationLevel;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run one transactional SQL Server task")]
pub(crate) struct Args {
    #[command(subcommand)]
    pub(crate) task: Task,
    /// Most verbose level written to stderr
    #[arg(long, global = true, value_enum, default_value = "warn")]
    pub(crate) log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Task {
    /// Execute a query and print its first result
    Query(TaskFiles),
    /// Execute a stored procedure and print its first result
    Procedure(TaskFiles),
    /// Execute a statement once per object of `inputJson`
    Batch(TaskFiles),
    /// Bulk copy `inputData` into `tableName`
    Bulk(TaskFiles),
}

#[derive(clap::Args, Debug)]
pub(crate) struct TaskFiles {
    /// JSON request (`query`/`execute`/`inputJson`/`inputData` plus `connectionString`)
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// JSON options; defaults apply when omitted
    #[arg(long)]
    pub(crate) options: Option<PathBuf>,
    /// Override the isolation level from the options file
    #[arg(long, value_enum)]
    pub(crate) isolation_level: Option<IsolationLevel>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}
