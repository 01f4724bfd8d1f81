//! The boundary between the transactional core and a SQL engine.
//!
//! The core only needs an open/close lifecycle, named-parameter execution,
//! transactions with an isolation level, and a bulk row copy. The tiberius
//! driver in [`crate::mssql`] is the production implementation.

use async_trait::async_trait;

use crate::binder::Record;
use crate::error::SqlTaskError;
use crate::results::ResultSet;
use crate::table::DataTable;
use crate::types::{BulkCopyOptions, CommandKind, IsolationLevel};

/// A statement or procedure call with its named parameters.
#[derive(Debug, Clone)]
pub struct Command<'a> {
    /// SQL text for [`CommandKind::Text`], procedure name otherwise
    pub text: &'a str,
    pub kind: CommandKind,
    pub params: &'a Record,
}

impl<'a> Command<'a> {
    #[must_use]
    pub fn text(text: &'a str, params: &'a Record) -> Self {
        Self {
            text,
            kind: CommandKind::Text,
            params,
        }
    }

    #[must_use]
    pub fn procedure(name: &'a str, params: &'a Record) -> Self {
        Self {
            text: name,
            kind: CommandKind::StoredProcedure,
            params,
        }
    }
}

/// Opens connections from a connection string.
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    /// Open a new connection owned by a single operation call.
    ///
    /// # Errors
    /// Returns `SqlTaskError::ConnectionError` if the server cannot be reached
    /// or refuses the login.
    async fn connect(&self, connection_string: &str) -> Result<Self::Conn, SqlTaskError>;
}

/// One open connection.
///
/// There is no rollback: a transaction that was begun but not
/// committed is discarded by the server when the connection is closed or
/// dropped.
#[async_trait]
pub trait Connection: Send {
    /// Begin a transaction. `IsolationLevel::Default` keeps the session's
    /// isolation; `IsolationLevel::None` is never passed here.
    async fn begin(&mut self, level: IsolationLevel) -> Result<(), SqlTaskError>;

    async fn commit(&mut self) -> Result<(), SqlTaskError>;

    /// Execute and read the first result fully.
    async fn query(&mut self, command: &Command<'_>) -> Result<ResultSet, SqlTaskError>;

    /// Execute and return the number of rows affected.
    async fn execute(&mut self, command: &Command<'_>) -> Result<u64, SqlTaskError>;

    /// Copy `data` into `table` and return the number of rows copied.
    async fn bulk_insert(
        &mut self,
        table: &str,
        data: &DataTable,
        options: BulkCopyOptions,
    ) -> Result<u64, SqlTaskError>;

    /// Release the connection.
    async fn close(self) -> Result<(), SqlTaskError>;
}
