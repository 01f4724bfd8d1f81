//! Transaction control runs as plain SQL batches (`simple_query`), never through
//! `sp_executesql`: a `SET` issued inside an RPC is reverted when the RPC returns.

use tracing::debug;

use super::client::MssqlClient;
use crate::error::SqlTaskError;
use crate::types::IsolationLevel;

const COMMIT_SQL: &str = "COMMIT TRANSACTION";

/// The batch that sets the session isolation (for explicit levels) and opens
/// the transaction.
#[must_use]
pub fn begin_batch(level: IsolationLevel) -> String {
    match level.as_sql() {
        Some(set) => format!("{set}; BEGIN TRANSACTION"),
        None => "BEGIN TRANSACTION".to_string(),
    }
}

/// Set the session isolation and begin a transaction in one batch.
///
/// # Errors
/// Returns `SqlTaskError` if the server rejects the batch.
pub async fn begin_transaction(
    client: &mut MssqlClient,
    level: IsolationLevel,
) -> Result<(), SqlTaskError> {
    client.simple_query(begin_batch(level)).await?.into_results().await?;
    debug!(%level, "transaction begun");
    Ok(())
}

/// Commit the open transaction.
///
/// # Errors
/// Returns `SqlTaskError` if the commit fails.
pub async fn commit_transaction(client: &mut MssqlClient) -> Result<(), SqlTaskError> {
    client.simple_query(COMMIT_SQL).await?.into_results().await?;
    Ok(())
}
