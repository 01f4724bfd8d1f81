use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::binder::Record;
use crate::driver::{Command, Connection, Connector};
use crate::error::SqlTaskError;
use crate::results::ResultSet;
use crate::table::DataTable;
use crate::types::{BulkCopyOptions, CommandKind, IsolationLevel, SqlValue};

/// What a scripted statement produced.
#[derive(Debug, Clone)]
pub enum StatementOutput {
    Rows(ResultSet),
    Affected(u64),
}

type Handler =
    Arc<dyn Fn(&mut Tables, &Command<'_>) -> Result<StatementOutput, SqlTaskError> + Send + Sync>;

/// One in-memory table.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    columns: Vec<String>,
    identity: Option<usize>,
    primary_key: Option<usize>,
    next_identity: i64,
    rows: Vec<Vec<SqlValue>>,
}

impl MemoryTable {
    #[must_use]
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            next_identity: 1,
            ..Self::default()
        }
    }

    /// Mark `column` as an identity column (server-assigned, starting at 1).
    #[must_use]
    pub fn with_identity(mut self, column: &str) -> Self {
        self.identity = self.column_index(column);
        self
    }

    /// Reject inserts that repeat a value of `column`.
    #[must_use]
    pub fn with_primary_key(mut self, column: &str) -> Self {
        self.primary_key = self.column_index(column);
        self
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Insert one row from named values, the way an `INSERT` statement would.
    ///
    /// # Errors
    /// Returns `SqlTaskError::DataError` for unknown columns, an explicit
    /// identity value, or a duplicate primary key.
    pub fn insert_record(&mut self, record: &Record) -> Result<u64, SqlTaskError> {
        let mut row = vec![SqlValue::Null; self.columns.len()];
        for (name, value) in record.iter() {
            let idx = self.column_index(name).ok_or_else(|| {
                SqlTaskError::DataError(format!("Invalid column name '{name}'"))
            })?;
            if Some(idx) == self.identity {
                return Err(SqlTaskError::DataError(format!(
                    "Cannot insert explicit value for identity column '{name}'"
                )));
            }
            row[idx] = value.clone();
        }
        self.push_row(row, false)?;
        Ok(1)
    }

    fn push_row(&mut self, mut row: Vec<SqlValue>, keep_identity: bool) -> Result<(), SqlTaskError> {
        if let Some(idx) = self.identity {
            match row[idx].as_int() {
                Some(explicit) if keep_identity => {
                    self.next_identity = self.next_identity.max(explicit + 1);
                }
                _ => {
                    row[idx] = SqlValue::Int(self.next_identity);
                    self.next_identity += 1;
                }
            }
        }
        if let Some(pk) = self.primary_key {
            if self.rows.iter().any(|existing| existing[pk] == row[pk]) {
                return Err(SqlTaskError::DataError(format!(
                    "Violation of PRIMARY KEY constraint: duplicate key {:?}",
                    row[pk]
                )));
            }
        }
        self.rows.push(row);
        Ok(())
    }

    /// All rows as a result set.
    #[must_use]
    pub fn select_all(&self) -> ResultSet {
        self.select(|_| true)
    }

    /// Rows whose `column` equals `value` (text compared ignoring case).
    #[must_use]
    pub fn select_where(&self, column: &str, value: &SqlValue) -> ResultSet {
        let Some(idx) = self.column_index(column) else {
            return ResultSet::with_columns(self.columns.clone());
        };
        self.select(|row| values_match(&row[idx], value))
    }

    fn select(&self, keep: impl Fn(&[SqlValue]) -> bool) -> ResultSet {
        let mut result_set = ResultSet::with_columns(self.columns.clone());
        for row in self.rows.iter().filter(|row| keep(row)) {
            result_set.add_row_values(row.clone());
        }
        result_set
    }

    fn bulk_load(&mut self, data: &DataTable, options: BulkCopyOptions) -> Result<u64, SqlTaskError> {
        let mapping = data
            .columns()
            .iter()
            .map(|name| {
                self.column_index(name).ok_or_else(|| {
                    SqlTaskError::DataError(format!("column {name} does not exist in the destination"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let keep_identity = options.contains(BulkCopyOptions::KEEP_IDENTITY);
        for input in data.rows() {
            let mut row = vec![SqlValue::Null; self.columns.len()];
            for (value, &idx) in input.iter().zip(&mapping) {
                row[idx] = value.clone();
            }
            self.push_row(row, keep_identity)?;
        }
        Ok(data.len() as u64)
    }
}

// Numbers read back from JSON text parameters arrive as strings.
fn values_match(stored: &SqlValue, wanted: &SqlValue) -> bool {
    match (stored, wanted) {
        (SqlValue::Text(a), SqlValue::Text(b)) => a.eq_ignore_ascii_case(b),
        (SqlValue::Int(a), SqlValue::Text(b)) | (SqlValue::Text(b), SqlValue::Int(a)) => {
            b.trim().parse::<i64>().is_ok_and(|b| b == *a)
        }
        (a, b) => a == b,
    }
}

/// The engine's tables, keyed by name ignoring case.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    tables: HashMap<String, MemoryTable>,
}

impl Tables {
    pub fn create(&mut self, name: &str, table: MemoryTable) {
        self.tables.insert(name.to_ascii_lowercase(), table);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    /// # Errors
    /// Returns `SqlTaskError::DataError` when the table does not exist.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut MemoryTable, SqlTaskError> {
        self.tables
            .get_mut(&name.to_ascii_lowercase())
            .ok_or_else(|| SqlTaskError::DataError(format!("Invalid object name '{name}'")))
    }
}

/// Counters of every call the engine has served.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallCounts {
    pub connects: usize,
    pub commands: usize,
    pub begins: usize,
    pub commits: usize,
    pub closes: usize,
    pub bulk_loads: usize,
    pub isolation_levels: Vec<IsolationLevel>,
    pub last_bulk_options: Option<BulkCopyOptions>,
}

#[derive(Default)]
struct EngineState {
    committed: Tables,
    statements: HashMap<String, Handler>,
    procedures: HashMap<String, Handler>,
    counts: CallCounts,
    latency: Option<Duration>,
    fail_connect: bool,
    fail_commit: bool,
}

/// An in-memory SQL engine with snapshot transactions.
///
/// Outside a transaction every statement applies to the committed tables
/// atomically. Inside one, statements work on a private copy that replaces
/// the committed tables on commit and is dropped otherwise.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<EngineState>>,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("counts", &self.counts())
            .finish_non_exhaustive()
    }
}

impl MemoryEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_table(&self, name: &str, table: MemoryTable) {
        self.lock().committed.create(name, table);
    }

    /// A copy of the committed state of `name`.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.lock().committed.get(name).cloned()
    }

    /// Route a SQL text (compared trimmed and ignoring case) to `handler`.
    pub fn on_statement<F>(&self, sql: &str, handler: F)
    where
        F: Fn(&mut Tables, &Command<'_>) -> Result<StatementOutput, SqlTaskError>
            + Send
            + Sync
            + 'static,
    {
        self.lock().statements.insert(route_key(sql), Arc::new(handler));
    }

    /// Route a stored procedure name to `handler`.
    pub fn on_procedure<F>(&self, name: &str, handler: F)
    where
        F: Fn(&mut Tables, &Command<'_>) -> Result<StatementOutput, SqlTaskError>
            + Send
            + Sync
            + 'static,
    {
        self.lock().procedures.insert(route_key(name), Arc::new(handler));
    }

    /// Delay every connect and command by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    pub fn set_fail_commit(&self, fail: bool) {
        self.lock().fail_commit = fail;
    }

    #[must_use]
    pub fn counts(&self) -> CallCounts {
        self.lock().counts.clone()
    }

    async fn delay(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn handler(&self, command: &Command<'_>) -> Result<Handler, SqlTaskError> {
        let state = self.lock();
        let routes = match command.kind {
            CommandKind::Text => &state.statements,
            CommandKind::StoredProcedure => &state.procedures,
        };
        routes.get(&route_key(command.text)).cloned().ok_or_else(|| {
            SqlTaskError::DataError(format!("no handler registered for: {}", command.text))
        })
    }

    /// Apply `change` to the committed tables, keeping them untouched on error.
    fn autocommit<T>(
        &self,
        change: impl FnOnce(&mut Tables) -> Result<T, SqlTaskError>,
    ) -> Result<T, SqlTaskError> {
        let mut state = self.lock();
        let mut working = state.committed.clone();
        let out = change(&mut working)?;
        state.committed = working;
        Ok(out)
    }
}

fn route_key(text: &str) -> String {
    text.trim().to_ascii_lowercase()
}

#[async_trait]
impl Connector for MemoryEngine {
    type Conn = MemoryConnection;

    async fn connect(&self, _connection_string: &str) -> Result<MemoryConnection, SqlTaskError> {
        self.delay().await;
        let mut state = self.lock();
        state.counts.connects += 1;
        if state.fail_connect {
            return Err(SqlTaskError::ConnectionError(
                "A network-related error occurred while establishing a connection".to_string(),
            ));
        }
        Ok(MemoryConnection {
            engine: self.clone(),
            transaction: None,
        })
    }
}

/// A connection to a [`MemoryEngine`]; an open transaction is a private copy
/// of the tables.
pub struct MemoryConnection {
    engine: MemoryEngine,
    transaction: Option<Tables>,
}

impl MemoryConnection {
    async fn run(&mut self, command: &Command<'_>) -> Result<StatementOutput, SqlTaskError> {
        self.engine.delay().await;
        self.engine.lock().counts.commands += 1;
        let handler = self.engine.handler(command)?;
        match self.transaction.as_mut() {
            Some(tables) => handler(tables, command),
            None => self.engine.autocommit(|tables| handler(tables, command)),
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn begin(&mut self, level: IsolationLevel) -> Result<(), SqlTaskError> {
        self.engine.delay().await;
        let mut state = self.engine.lock();
        state.counts.begins += 1;
        state.counts.isolation_levels.push(level);
        self.transaction = Some(state.committed.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlTaskError> {
        self.engine.delay().await;
        let mut state = self.engine.lock();
        if state.fail_commit {
            return Err(SqlTaskError::DataError(
                "The transaction was aborted by the server".to_string(),
            ));
        }
        let tables = self.transaction.take().ok_or_else(|| {
            SqlTaskError::DataError("COMMIT without a matching BEGIN TRANSACTION".to_string())
        })?;
        state.committed = tables;
        state.counts.commits += 1;
        Ok(())
    }

    async fn query(&mut self, command: &Command<'_>) -> Result<ResultSet, SqlTaskError> {
        match self.run(command).await? {
            StatementOutput::Rows(result_set) => Ok(result_set),
            StatementOutput::Affected(_) => Ok(ResultSet::with_columns(Vec::new())),
        }
    }

    async fn execute(&mut self, command: &Command<'_>) -> Result<u64, SqlTaskError> {
        match self.run(command).await? {
            StatementOutput::Rows(result_set) => Ok(result_set.len() as u64),
            StatementOutput::Affected(rows) => Ok(rows),
        }
    }

    async fn bulk_insert(
        &mut self,
        table: &str,
        data: &DataTable,
        options: BulkCopyOptions,
    ) -> Result<u64, SqlTaskError> {
        self.engine.delay().await;
        {
            let mut state = self.engine.lock();
            state.counts.bulk_loads += 1;
            state.counts.last_bulk_options = Some(options);
        }
        let load = |tables: &mut Tables| tables.get_mut(table)?.bulk_load(data, options);
        match self.transaction.as_mut() {
            Some(tables) => load(tables),
            None => self.engine.autocommit(load),
        }
    }

    async fn close(self) -> Result<(), SqlTaskError> {
        if self.transaction.is_some() {
            debug!("discarding uncommitted transaction");
        }
        self.engine.lock().counts.closes += 1;
        Ok(())
    }
}
