//! Transactional SQL Server tasks for workflow hosts.
//!
//! Four operations share one lifecycle: open a connection, optionally begin a
//! transaction at the requested isolation level, do the work, commit, and
//! always close. See [`SqlTasks`] for the entry points; the free functions
//! below run them against SQL Server with the default impersonator.

pub mod binder;
pub mod bulk;
pub mod coordinator;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod model;
pub mod mssql;
pub mod prelude;
pub mod results;
pub mod table;
pub mod tasks;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

pub use error::SqlTaskError;
pub use model::{
    BatchInput, BulkInsertInput, BulkInsertOptions, Options, Parameter, ProcedureInput, QueryInput,
};
pub use results::ResultSet;
pub use tasks::SqlTasks;
pub use types::{IsolationLevel, SqlValue};

/// Execute a query on SQL Server and return its first result as JSON.
///
/// # Errors
/// See [`SqlTasks::execute_query`].
pub async fn execute_query(
    input: &QueryInput,
    options: &Options,
    token: &CancellationToken,
) -> Result<JsonValue, SqlTaskError> {
    SqlTasks::mssql().execute_query(input, options, token).await
}

/// Execute a stored procedure on SQL Server and return its first result as JSON.
///
/// # Errors
/// See [`SqlTasks::execute_procedure`].
pub async fn execute_procedure(
    input: &ProcedureInput,
    options: &Options,
    token: &CancellationToken,
) -> Result<JsonValue, SqlTaskError> {
    SqlTasks::mssql().execute_procedure(input, options, token).await
}

/// Execute one statement per input object on SQL Server.
///
/// # Errors
/// See [`SqlTasks::batch_operation`].
pub async fn batch_operation(
    input: &BatchInput,
    options: &Options,
    token: &CancellationToken,
) -> Result<u64, SqlTaskError> {
    SqlTasks::mssql().batch_operation(input, options, token).await
}

/// Bulk copy rows into a SQL Server table.
///
/// # Errors
/// See [`SqlTasks::bulk_insert`].
pub async fn bulk_insert(
    input: &BulkInsertInput,
    options: &BulkInsertOptions,
    token: &CancellationToken,
) -> Result<u64, SqlTaskError> {
    SqlTasks::mssql().bulk_insert(input, options, token).await
}
