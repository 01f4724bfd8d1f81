mod common;

use mssql_tasks::prelude::*;
use mssql_tasks::test_utils::memory_tasks;
use serde_json::json;

use common::{CONN, SELECT_BY_ID_SQL, SELECT_BY_LAST_NAME_SQL, engine, row_count};

#[tokio::test]
async fn batch_then_query_round_trip() -> Result<(), SqlTaskError> {
    let engine = engine();
    let tasks = memory_tasks(&engine);
    let token = CancellationToken::new();

    let inserted = tasks
        .batch_operation(
            &BatchInput {
                query: common::INSERT_SQL.into(),
                input_json: r#"[{"Id":1,"FirstName":"Etu","LastName":"Suku"},
                                {"Id":2,"FirstName":"First","LastName":"Last"},
                                {"Id":3,"FirstName":"Some","LastName":"Name"}]"#
                    .into(),
                connection_string: CONN.into(),
            },
            &Options::default(),
            &token,
        )
        .await?;
    assert_eq!(inserted, 3);

    let rows = tasks
        .execute_query(
            &QueryInput {
                query: SELECT_BY_LAST_NAME_SQL.into(),
                parameters: vec![Parameter::new("name", "Last")],
                connection_string: CONN.into(),
            },
            &Options::default(),
            &token,
        )
        .await?;
    assert_eq!(
        rows,
        json!([{"Id": 2, "FirstName": "First", "LastName": "Last"}])
    );

    let rows = tasks
        .execute_query(
            &QueryInput {
                query: SELECT_BY_ID_SQL.into(),
                parameters: vec![Parameter::new("Id", "3")],
                connection_string: CONN.into(),
            },
            &Options::default(),
            &token,
        )
        .await?;
    assert_eq!(rows[0]["LastName"], json!("Name"));
    Ok(())
}

#[tokio::test]
async fn parameter_names_match_ignoring_case() -> Result<(), SqlTaskError> {
    let engine = engine();
    let tasks = memory_tasks(&engine);
    let token = CancellationToken::new();
    tasks
        .batch_operation(
            &BatchInput {
                query: common::INSERT_SQL.into(),
                input_json: r#"[{"Id":1,"FirstName":"First","LastName":"Last"}]"#.into(),
                connection_string: CONN.into(),
            },
            &Options::default(),
            &token,
        )
        .await?;

    let rows = tasks
        .execute_query(
            &QueryInput {
                query: SELECT_BY_LAST_NAME_SQL.into(),
                parameters: vec![Parameter::new("Name", "last")],
                connection_string: CONN.into(),
            },
            &Options::default(),
            &token,
        )
        .await?;
    assert_eq!(rows.as_array().map(Vec::len), Some(1));
    assert_eq!(rows[0]["FirstName"], json!("First"));
    Ok(())
}

#[tokio::test]
async fn query_with_no_matches_returns_empty_array() -> Result<(), SqlTaskError> {
    let engine = engine();
    let rows = memory_tasks(&engine)
        .execute_query(
            &QueryInput {
                query: SELECT_BY_ID_SQL.into(),
                parameters: vec![Parameter::new("Id", "42")],
                connection_string: CONN.into(),
            },
            &Options::default(),
            &CancellationToken::new(),
        )
        .await?;
    assert_eq!(rows, json!([]));
    Ok(())
}

#[tokio::test]
async fn procedure_inserts_and_returns_empty_result() -> Result<(), SqlTaskError> {
    let engine = engine();
    let rows = memory_tasks(&engine)
        .execute_procedure(
            &ProcedureInput {
                execute: "TestProcedure".into(),
                parameters: vec![
                    Parameter::new("Id", "7"),
                    Parameter::new("FirstName", "Proc"),
                    Parameter::new("LastName", "Edure"),
                ],
                connection_string: CONN.into(),
            },
            &Options::default().with_isolation_level(IsolationLevel::ReadCommitted),
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(rows, json!([]));
    assert_eq!(row_count(&engine), 1);
    let counts = engine.counts();
    assert_eq!(counts.commits, 1);
    assert_eq!(counts.isolation_levels, vec![IsolationLevel::ReadCommitted]);
    Ok(())
}

#[tokio::test]
async fn blank_procedure_name_is_a_config_error() {
    let engine = engine();
    let err = memory_tasks(&engine)
        .execute_procedure(
            &ProcedureInput {
                execute: "  ".into(),
                parameters: Vec::new(),
                connection_string: CONN.into(),
            },
            &Options::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SqlTaskError::ConfigError(_)));
    assert_eq!(engine.counts().connects, 0);
}

#[tokio::test]
async fn duplicate_parameters_are_rejected_before_connecting() {
    let engine = engine();
    let err = memory_tasks(&engine)
        .execute_query(
            &QueryInput {
                query: SELECT_BY_ID_SQL.into(),
                parameters: vec![Parameter::new("Id", "1"), Parameter::new("id", "2")],
                connection_string: CONN.into(),
            },
            &Options::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SqlTaskError::MalformedInput(_)));
    assert_eq!(engine.counts().connects, 0);
}

#[tokio::test]
async fn connection_failure_is_reported_and_nothing_runs() {
    let engine = engine();
    engine.set_fail_connect(true);
    let err = memory_tasks(&engine)
        .execute_query(
            &QueryInput {
                query: SELECT_BY_ID_SQL.into(),
                parameters: vec![Parameter::new("Id", "1")],
                connection_string: CONN.into(),
            },
            &Options::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SqlTaskError::ConnectionError(_)));
    let counts = engine.counts();
    assert_eq!(counts.commands, 0);
    assert_eq!(counts.closes, 0);
}
