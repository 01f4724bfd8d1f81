use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use crate::binder::{Record, parse_records};
use crate::bulk::BulkWork;
use crate::coordinator::{BatchWork, QueryWork, TransactionCoordinator};
use crate::credentials::{Impersonator, PlatformImpersonator, run_as};
use crate::driver::{Command, Connector};
use crate::error::SqlTaskError;
use crate::model::{BatchInput, BulkInsertInput, BulkInsertOptions, Options, ProcedureInput, QueryInput};
use crate::mssql::TiberiusConnector;

/// The four SQL operations offered to a workflow host.
///
/// Each call opens and owns one connection, optionally wraps the work in a
/// transaction, and runs under alternate credentials when the options ask for
/// it:
/// ```rust,no_run
/// use mssql_tasks::prelude::*;
///
/// # async fn demo() -> Result<(), SqlTaskError> {
/// let tasks = SqlTasks::mssql();
/// let rows = tasks
///     .execute_query(
///         &QueryInput {
///             query: "SELECT * FROM TestTable WHERE LastName = @name".into(),
///             parameters: vec![Parameter::new("name", "Last")],
///             connection_string: "Server=tcp:localhost,1433;User Id=sa;Password=...;".into(),
///         },
///         &Options::default(),
///         &CancellationToken::new(),
///     )
///     .await?;
/// # let _ = rows;
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct SqlTasks<C = TiberiusConnector, I = PlatformImpersonator> {
    connector: C,
    impersonator: I,
}

impl SqlTasks {
    /// Tasks backed by tiberius and the platform impersonator.
    #[must_use]
    pub fn mssql() -> Self {
        Self::new(TiberiusConnector, PlatformImpersonator)
    }
}

impl Default for SqlTasks {
    fn default() -> Self {
        Self::mssql()
    }
}

impl<C: Connector, I: Impersonator> SqlTasks<C, I> {
    pub fn new(connector: C, impersonator: I) -> Self {
        Self {
            connector,
            impersonator,
        }
    }

    #[must_use]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Execute a query and return its first result as a JSON array of objects.
    ///
    /// # Errors
    /// See [`SqlTaskError`]; cleanup has always run when an error is returned.
    pub async fn execute_query(
        &self,
        input: &QueryInput,
        options: &Options,
        token: &CancellationToken,
    ) -> Result<JsonValue, SqlTaskError> {
        let span = info_span!("execute_query", isolation = %options.isolation_level);
        let work = async {
            let params = Record::from_parameters(&input.parameters)?;
            let command = Command::text(&input.query, &params);
            self.coordinator(options, token)
                .execute(&input.connection_string, QueryWork { command })
                .await
        };
        let result = run_as(&self.impersonator, options.alternate_credentials(), work)
            .instrument(span.clone())
            .await;
        span.in_scope(|| report_rows(&result));
        result
    }

    /// Execute a stored procedure and return its first result as a JSON array.
    ///
    /// # Errors
    /// See [`SqlTaskError`]; cleanup has always run when an error is returned.
    pub async fn execute_procedure(
        &self,
        input: &ProcedureInput,
        options: &Options,
        token: &CancellationToken,
    ) -> Result<JsonValue, SqlTaskError> {
        let span = info_span!(
            "execute_procedure",
            procedure = %input.execute,
            isolation = %options.isolation_level
        );
        let work = async {
            if input.execute.trim().is_empty() {
                return Err(SqlTaskError::ConfigError(
                    "a stored procedure name is required".to_string(),
                ));
            }
            let params = Record::from_parameters(&input.parameters)?;
            let command = Command::procedure(input.execute.trim(), &params);
            self.coordinator(options, token)
                .execute(&input.connection_string, QueryWork { command })
                .await
        };
        let result = run_as(&self.impersonator, options.alternate_credentials(), work)
            .instrument(span.clone())
            .await;
        span.in_scope(|| report_rows(&result));
        result
    }

    /// Execute one statement per object of `input_json`; returns the total
    /// number of rows affected.
    ///
    /// Under `IsolationLevel::None` a failure keeps the rows written by the
    /// statements before it.
    ///
    /// # Errors
    /// See [`SqlTaskError`]; cleanup has always run when an error is returned.
    pub async fn batch_operation(
        &self,
        input: &BatchInput,
        options: &Options,
        token: &CancellationToken,
    ) -> Result<u64, SqlTaskError> {
        let span = info_span!("batch_operation", isolation = %options.isolation_level);
        let work = async {
            let records = parse_records(&input.input_json)?;
            let batch = BatchWork {
                query: &input.query,
                records: &records,
            };
            self.coordinator(options, token)
                .execute(&input.connection_string, batch)
                .await
        };
        let result = run_as(&self.impersonator, options.alternate_credentials(), work)
            .instrument(span.clone())
            .await;
        span.in_scope(|| report_count(&result));
        result
    }

    /// Bulk copy `input_data` into `table_name`; returns the rows copied.
    ///
    /// # Errors
    /// See [`SqlTaskError`]; cleanup has always run when an error is returned.
    pub async fn bulk_insert(
        &self,
        input: &BulkInsertInput,
        options: &BulkInsertOptions,
        token: &CancellationToken,
    ) -> Result<u64, SqlTaskError> {
        let span = info_span!(
            "bulk_insert",
            table = %input.table_name,
            isolation = %options.execution.isolation_level
        );
        let work = async {
            let bulk = BulkWork::prepare(input, options)?;
            self.coordinator(&options.execution, token)
                .execute(&input.connection_string, bulk)
                .await
        };
        let result = run_as(
            &self.impersonator,
            options.execution.alternate_credentials(),
            work,
        )
        .instrument(span.clone())
        .await;
        span.in_scope(|| report_count(&result));
        result
    }

    fn coordinator<'a>(
        &'a self,
        options: &Options,
        token: &'a CancellationToken,
    ) -> TransactionCoordinator<'a, C> {
        TransactionCoordinator::new(
            &self.connector,
            options.isolation_level,
            token,
            options.command_timeout(),
        )
    }
}

fn report_rows(result: &Result<JsonValue, SqlTaskError>) {
    match result {
        Ok(value) => info!(rows = value.as_array().map_or(0, Vec::len), "operation succeeded"),
        Err(err) => warn!(error = %err, "operation failed"),
    }
}

fn report_count(result: &Result<u64, SqlTaskError>) {
    match result {
        Ok(rows) => info!(rows, "operation succeeded"),
        Err(err) => warn!(error = %err, "operation failed"),
    }
}
