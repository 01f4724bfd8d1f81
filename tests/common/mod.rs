#![allow(dead_code)]

use mssql_tasks::driver::Command;
use mssql_tasks::test_utils::{MemoryEngine, MemoryTable, StatementOutput, Tables};
use mssql_tasks::{SqlTaskError, SqlValue};

pub const CONN: &str = "Server=tcp:memory,1433;Database=Test;User Id=sa;Password=secret";

pub const INSERT_SQL: &str =
    "INSERT INTO TestTable (Id, FirstName, LastName) VALUES (@Id, @FirstName, @LastName)";
pub const SELECT_BY_ID_SQL: &str = "SELECT * FROM TestTable WHERE Id = @Id";
pub const SELECT_BY_LAST_NAME_SQL: &str = "SELECT * FROM TestTable WHERE LastName = @name";

fn insert(tables: &mut Tables, command: &Command<'_>) -> Result<StatementOutput, SqlTaskError> {
    let rows = tables.get_mut("TestTable")?.insert_record(command.params)?;
    Ok(StatementOutput::Affected(rows))
}

fn select_where(
    column: &'static str,
    param: &'static str,
) -> impl Fn(&mut Tables, &Command<'_>) -> Result<StatementOutput, SqlTaskError> + Send + Sync + 'static
{
    move |tables, command| {
        let wanted = command.params.get(param).cloned().unwrap_or(SqlValue::Null);
        let table = tables.get_mut("TestTable")?;
        Ok(StatementOutput::Rows(table.select_where(column, &wanted)))
    }
}

/// An engine with `TestTable (Id PK, FirstName, LastName)`, the statements
/// the tests use, and a `TestProcedure` that inserts one row.
pub fn engine() -> MemoryEngine {
    let engine = MemoryEngine::new();
    engine.create_table(
        "TestTable",
        MemoryTable::new(&["Id", "FirstName", "LastName"]).with_primary_key("Id"),
    );
    engine.on_statement(INSERT_SQL, insert);
    engine.on_statement(SELECT_BY_ID_SQL, select_where("Id", "Id"));
    engine.on_statement(SELECT_BY_LAST_NAME_SQL, select_where("LastName", "name"));
    engine.on_procedure("TestProcedure", insert);
    engine
}

pub fn row_count(engine: &MemoryEngine) -> usize {
    engine.table("TestTable").map_or(0, |t| t.len())
}
