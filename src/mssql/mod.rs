// MSSQL module - the SQL Server driver behind the task operations, via tiberius
//
// - client: connection string parsing and client creation
// - placeholders: `@Name` to `@Pn` rewriting
// - params: binding values onto tiberius queries
// - query: statement/procedure execution and result extraction
// - transaction: BEGIN/COMMIT with isolation
// - bulk: destination metadata and the two bulk load paths

pub mod bulk;
pub mod client;
pub mod params;
pub mod placeholders;
pub mod query;
pub mod transaction;

use async_trait::async_trait;
use tracing::debug;

use crate::driver::{Command, Connection, Connector};
use crate::error::SqlTaskError;
use crate::results::ResultSet;
use crate::table::DataTable;
use crate::types::{BulkCopyOptions, IsolationLevel};

pub use client::{MssqlClient, create_mssql_client};
pub use query::build_result_set;

/// Opens one tiberius client per operation call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiberiusConnector;

#[async_trait]
impl Connector for TiberiusConnector {
    type Conn = MssqlConnection;

    async fn connect(&self, connection_string: &str) -> Result<MssqlConnection, SqlTaskError> {
        let client = create_mssql_client(connection_string).await?;
        debug!("SQL Server connection established");
        Ok(MssqlConnection { client })
    }
}

/// An open SQL Server connection.
///
/// Dropping it without [`Connection::close`] closes the socket, which also
/// discards any uncommitted transaction on the server.
pub struct MssqlConnection {
    client: MssqlClient,
}

#[async_trait]
impl Connection for MssqlConnection {
    async fn begin(&mut self, level: IsolationLevel) -> Result<(), SqlTaskError> {
        transaction::begin_transaction(&mut self.client, level).await
    }

    async fn commit(&mut self) -> Result<(), SqlTaskError> {
        transaction::commit_transaction(&mut self.client).await
    }

    async fn query(&mut self, command: &Command<'_>) -> Result<ResultSet, SqlTaskError> {
        build_result_set(&mut self.client, command).await
    }

    async fn execute(&mut self, command: &Command<'_>) -> Result<u64, SqlTaskError> {
        query::execute(&mut self.client, command).await
    }

    async fn bulk_insert(
        &mut self,
        table: &str,
        data: &DataTable,
        options: BulkCopyOptions,
    ) -> Result<u64, SqlTaskError> {
        bulk::bulk_insert(&mut self.client, table, data, options).await
    }

    async fn close(self) -> Result<(), SqlTaskError> {
        self.client.close().await?;
        Ok(())
    }
}
