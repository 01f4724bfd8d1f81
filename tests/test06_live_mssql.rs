//! Runs against a real SQL Server when `MSSQL_TASKS_TEST_CONN` holds an
//! ADO.NET connection string; otherwise every test returns immediately.

use mssql_tasks::prelude::*;
use serde_json::json;

const TABLE: &str = "dbo.MssqlTasksLive";
const PROCEDURE: &str = "dbo.MssqlTasksLiveInsert";

fn connection_string() -> Option<String> {
    std::env::var("MSSQL_TASKS_TEST_CONN").ok().filter(|s| !s.trim().is_empty())
}

async fn run_sql(conn: &str, sql: &str) -> Result<serde_json::Value, SqlTaskError> {
    mssql_tasks::execute_query(
        &QueryInput {
            query: sql.into(),
            parameters: Vec::new(),
            connection_string: conn.into(),
        },
        &Options::default().with_isolation_level(IsolationLevel::None),
        &CancellationToken::new(),
    )
    .await
}

async fn reset(conn: &str) -> Result<(), SqlTaskError> {
    run_sql(
        conn,
        &format!(
            "IF OBJECT_ID('{TABLE}') IS NOT NULL DROP TABLE {TABLE}; \
             CREATE TABLE {TABLE} (Id int PRIMARY KEY, FirstName nvarchar(50) NULL, LastName nvarchar(50) NULL)"
        ),
    )
    .await?;
    Ok(())
}

async fn count(conn: &str) -> Result<i64, SqlTaskError> {
    let rows = run_sql(conn, &format!("SELECT COUNT(*) AS cnt FROM {TABLE}")).await?;
    Ok(rows[0]["cnt"].as_i64().unwrap_or(-1))
}

fn insert_batch(conn: &str, input_json: &str) -> BatchInput {
    BatchInput {
        query: format!(
            "INSERT INTO {TABLE} (Id, FirstName, LastName) VALUES (@Id, @FirstName, @LastName)"
        ),
        input_json: input_json.into(),
        connection_string: conn.into(),
    }
}

#[tokio::test]
async fn live_round_trip_and_atomicity() -> Result<(), SqlTaskError> {
    let Some(conn) = connection_string() else {
        return Ok(());
    };
    reset(&conn).await?;
    let token = CancellationToken::new();

    let inserted = mssql_tasks::batch_operation(
        &insert_batch(
            &conn,
            r#"[{"Id":1,"FirstName":"First","LastName":"Last"},{"Id":2,"FirstName":"Second","LastName":"Other"}]"#,
        ),
        &Options::default(),
        &token,
    )
    .await?;
    assert_eq!(inserted, 2);

    let rows = mssql_tasks::execute_query(
        &QueryInput {
            query: format!("SELECT Id, FirstName FROM {TABLE} WHERE Id = @Id"),
            parameters: vec![Parameter::new("id", "2")],
            connection_string: conn.clone(),
        },
        &Options::default(),
        &token,
    )
    .await?;
    assert_eq!(rows, json!([{"Id": 2, "FirstName": "Second"}]));

    let failing = r#"[{"Id":3,"FirstName":"a","LastName":"b"},{"Id":1,"FirstName":"dup","LastName":"dup"}]"#;
    let err = mssql_tasks::batch_operation(
        &insert_batch(&conn, failing),
        &Options::default().with_isolation_level(IsolationLevel::Serializable),
        &token,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SqlTaskError::DataError(_)));
    assert_eq!(count(&conn).await?, 2);

    let err = mssql_tasks::batch_operation(
        &insert_batch(&conn, failing),
        &Options::default().with_isolation_level(IsolationLevel::None),
        &token,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SqlTaskError::DataError(_)));
    assert_eq!(count(&conn).await?, 3);
    Ok(())
}

#[tokio::test]
async fn live_bulk_insert_and_procedure() -> Result<(), SqlTaskError> {
    let Some(conn) = connection_string() else {
        return Ok(());
    };
    reset(&conn).await?;
    let token = CancellationToken::new();

    let copied = mssql_tasks::bulk_insert(
        &BulkInsertInput {
            input_data: r#"[{"Id":10,"FirstName":"","LastName":"Bulk"}]"#.into(),
            table_name: TABLE.into(),
            connection_string: conn.clone(),
        },
        &BulkInsertOptions {
            convert_empty_strings_to_null: true,
            ..BulkInsertOptions::default()
        },
        &token,
    )
    .await?;
    assert_eq!(copied, 1);
    let rows = run_sql(&conn, &format!("SELECT FirstName FROM {TABLE} WHERE Id = 10")).await?;
    assert_eq!(rows, json!([{"FirstName": null}]));

    run_sql(
        &conn,
        &format!("IF OBJECT_ID('{PROCEDURE}') IS NOT NULL DROP PROCEDURE {PROCEDURE}"),
    )
    .await?;
    run_sql(
        &conn,
        &format!(
            "CREATE PROCEDURE {PROCEDURE} @Id int, @FirstName nvarchar(50), @LastName nvarchar(50) AS \
             INSERT INTO {TABLE} (Id, FirstName, LastName) VALUES (@Id, @FirstName, @LastName)"
        ),
    )
    .await?;

    let rows = mssql_tasks::execute_procedure(
        &ProcedureInput {
            execute: PROCEDURE.into(),
            parameters: vec![
                Parameter::new("Id", "11"),
                Parameter::new("FirstName", "Proc"),
                Parameter::new("LastName", "Edure"),
            ],
            connection_string: conn.clone(),
        },
        &Options::default(),
        &token,
    )
    .await?;
    assert_eq!(rows, json!([]));
    assert_eq!(count(&conn).await?, 2);
    Ok(())
}
