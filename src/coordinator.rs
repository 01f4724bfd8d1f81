//! Connection and transaction lifecycle shared by every operation.
//!
//! Per call: `Idle -> ConnectionOpen -> (TransactionOpen) -> Executing ->
//! Committed | Abandoned -> Closed`.
//!
//! Under [`IsolationLevel::None`] each statement auto-commits, so a batch that
//! fails halfway keeps the rows written before the failure. Under any other
//! level the work runs in one transaction that is committed only after the
//! work succeeds; on failure it is abandoned and the server discards it when
//! the connection closes.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::binder::Record;
use crate::driver::{Command, Connection, Connector};
use crate::error::SqlTaskError;
use crate::types::IsolationLevel;

/// Cancellation and timeout policy for the suspension points of one call.
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    token: &'a CancellationToken,
    timeout: Option<Duration>,
}

impl<'a> Step<'a> {
    #[must_use]
    pub fn new(token: &'a CancellationToken, timeout: Option<Duration>) -> Self {
        Self { token, timeout }
    }

    /// Fail fast if cancellation was already requested.
    ///
    /// # Errors
    /// Returns `SqlTaskError::Cancelled` naming `step`.
    pub fn check(&self, step: &str) -> Result<(), SqlTaskError> {
        if self.token.is_cancelled() {
            debug!(step, "cancellation observed before I/O");
            return Err(SqlTaskError::Cancelled(step.to_string()));
        }
        Ok(())
    }

    /// Run a server command: checked first, raced against cancellation, and
    /// bounded by the command timeout.
    ///
    /// # Errors
    /// Returns `SqlTaskError::Cancelled`, `SqlTaskError::Timeout`, or the
    /// command's own error.
    pub async fn command<T, F>(&self, step: &str, fut: F) -> Result<T, SqlTaskError>
    where
        F: Future<Output = Result<T, SqlTaskError>>,
    {
        self.run(step, self.timeout, fut).await
    }

    /// Like [`Step::command`] but without the command timeout; used for
    /// connection open, which is bounded by the connection string instead.
    ///
    /// # Errors
    /// Returns `SqlTaskError::Cancelled` or the future's own error.
    pub async fn untimed<T, F>(&self, step: &str, fut: F) -> Result<T, SqlTaskError>
    where
        F: Future<Output = Result<T, SqlTaskError>>,
    {
        self.run(step, None, fut).await
    }

    async fn run<T, F>(
        &self,
        step: &str,
        timeout: Option<Duration>,
        fut: F,
    ) -> Result<T, SqlTaskError>
    where
        F: Future<Output = Result<T, SqlTaskError>>,
    {
        self.check(step)?;
        let bounded = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(SqlTaskError::Timeout {
                        step: step.to_string(),
                        limit,
                    }),
                },
                None => fut.await,
            }
        };
        tokio::select! {
            biased;
            () = self.token.cancelled() => {
                debug!(step, "cancelled while in flight");
                Err(SqlTaskError::Cancelled(step.to_string()))
            }
            result = bounded => result,
        }
    }
}

/// The work executed between connection open and commit.
#[async_trait]
pub trait UnitOfWork<C: Connection>: Send {
    type Output: Send;

    async fn run(self, conn: &mut C, step: &Step<'_>) -> Result<Self::Output, SqlTaskError>;
}

/// Opens a connection, wraps a unit of work in the requested transaction,
/// and always closes the connection afterwards.
pub struct TransactionCoordinator<'a, C: Connector> {
    connector: &'a C,
    isolation: IsolationLevel,
    step: Step<'a>,
}

impl<'a, C: Connector> TransactionCoordinator<'a, C> {
    #[must_use]
    pub fn new(
        connector: &'a C,
        isolation: IsolationLevel,
        token: &'a CancellationToken,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            connector,
            isolation,
            step: Step::new(token, timeout),
        }
    }

    /// Run `work` on a fresh connection.
    ///
    /// # Errors
    /// Returns the first error raised while opening, executing, or
    /// committing. The connection is closed on every path.
    pub async fn execute<W>(
        &self,
        connection_string: &str,
        work: W,
    ) -> Result<W::Output, SqlTaskError>
    where
        W: UnitOfWork<C::Conn>,
    {
        let mut conn = self
            .step
            .untimed("connection open", self.connector.connect(connection_string))
            .await?;
        debug!(isolation = %self.isolation, "connection open");

        let outcome = match self.step.check("execution") {
            Ok(()) => self.run_scoped(&mut conn, work).await,
            Err(err) => Err(err),
        };

        if let Err(err) = conn.close().await {
            warn!(error = %err, "closing connection failed");
        }
        debug!(succeeded = outcome.is_ok(), "connection closed");
        outcome
    }

    async fn run_scoped<W>(&self, conn: &mut C::Conn, work: W) -> Result<W::Output, SqlTaskError>
    where
        W: UnitOfWork<C::Conn>,
    {
        if !self.isolation.uses_transaction() {
            return work.run(conn, &self.step).await;
        }

        self.step
            .command("begin transaction", conn.begin(self.isolation))
            .await?;
        debug!(isolation = %self.isolation, "transaction open");

        // On error the transaction is left open; closing the connection discards it.
        let output = work.run(conn, &self.step).await?;

        self.step.command("commit", conn.commit()).await?;
        debug!("transaction committed");
        Ok(output)
    }
}

/// A query or procedure call whose first result is materialized as JSON.
pub struct QueryWork<'a> {
    pub command: Command<'a>,
}

#[async_trait]
impl<'a, C: Connection> UnitOfWork<C> for QueryWork<'a> {
    type Output = JsonValue;

    async fn run(self, conn: &mut C, step: &Step<'_>) -> Result<JsonValue, SqlTaskError> {
        let result_set = step.command("execute command", conn.query(&self.command)).await?;
        debug!(rows = result_set.len(), "result materialized");
        Ok(result_set.to_json())
    }
}

/// One statement executed once per record, on a single connection.
pub struct BatchWork<'a> {
    pub query: &'a str,
    pub records: &'a [Record],
}

#[async_trait]
impl<'a, C: Connection> UnitOfWork<C> for BatchWork<'a> {
    type Output = u64;

    async fn run(self, conn: &mut C, step: &Step<'_>) -> Result<u64, SqlTaskError> {
        let mut affected = 0u64;
        for (idx, record) in self.records.iter().enumerate() {
            let command = Command::text(self.query, record);
            let rows = step
                .command("execute batch statement", conn.execute(&command))
                .await
                .inspect_err(|err| debug!(index = idx, error = %err, "batch statement failed"))?;
            affected += rows;
        }
        Ok(affected)
    }
}
