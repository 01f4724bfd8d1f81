mod common;

use std::time::Duration;

use mssql_tasks::prelude::*;
use mssql_tasks::test_utils::memory_tasks;

use common::{CONN, INSERT_SQL, SELECT_BY_ID_SQL, engine, row_count};

fn select_input() -> QueryInput {
    QueryInput {
        query: SELECT_BY_ID_SQL.into(),
        parameters: vec![Parameter::new("Id", "1")],
        connection_string: CONN.into(),
    }
}

fn batch_input() -> BatchInput {
    BatchInput {
        query: INSERT_SQL.into(),
        input_json: r#"[{"Id":1,"FirstName":"a","LastName":"x"},
                        {"Id":2,"FirstName":"b","LastName":"y"},
                        {"Id":3,"FirstName":"c","LastName":"z"}]"#
            .into(),
        connection_string: CONN.into(),
    }
}

fn cancel_after(token: &CancellationToken, delay: Duration) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
    });
}

#[tokio::test]
async fn precancelled_token_performs_no_io() {
    let engine = engine();
    let token = CancellationToken::new();
    token.cancel();

    let err = memory_tasks(&engine)
        .execute_query(&select_input(), &Options::default(), &token)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    let counts = engine.counts();
    assert_eq!(counts.connects, 0);
    assert_eq!(counts.commands, 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_open_stops_before_any_command() {
    let engine = engine();
    engine.set_latency(Some(Duration::from_millis(100)));
    let token = CancellationToken::new();
    cancel_after(&token, Duration::from_millis(50));

    let err = memory_tasks(&engine)
        .execute_query(&select_input(), &Options::default(), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlTaskError::Cancelled(ref step) if step == "connection open"));
    assert_eq!(engine.counts().commands, 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_batch_rolls_back_the_transaction() {
    let engine = engine();
    engine.set_latency(Some(Duration::from_millis(100)));
    let token = CancellationToken::new();
    // open at 100ms, begin at 200ms, first insert at 300ms, second in flight
    cancel_after(&token, Duration::from_millis(350));

    let err = memory_tasks(&engine)
        .batch_operation(
            &batch_input(),
            &Options::default().with_isolation_level(IsolationLevel::ReadCommitted),
            &token,
        )
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(row_count(&engine), 0);

    let counts = engine.counts();
    assert_eq!(counts.commits, 0);
    assert_eq!(counts.closes, 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_batch_without_transaction_keeps_finished_rows() {
    let engine = engine();
    engine.set_latency(Some(Duration::from_millis(100)));
    let token = CancellationToken::new();
    // open at 100ms, first insert at 200ms, second in flight
    cancel_after(&token, Duration::from_millis(250));

    let err = memory_tasks(&engine)
        .batch_operation(
            &batch_input(),
            &Options::default().with_isolation_level(IsolationLevel::None),
            &token,
        )
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(row_count(&engine), 1);
    assert_eq!(engine.counts().closes, 1);
}

#[tokio::test(start_paused = true)]
async fn slow_command_times_out() {
    let engine = engine();
    engine.set_latency(Some(Duration::from_secs(5)));

    let err = memory_tasks(&engine)
        .execute_query(
            &select_input(),
            &Options::default()
                .with_isolation_level(IsolationLevel::None)
                .with_timeout_seconds(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert!(
        matches!(err, SqlTaskError::Timeout { ref step, limit } if step == "execute command" && limit == Duration::from_secs(1))
    );
    assert_eq!(engine.counts().closes, 1);
}

#[tokio::test(start_paused = true)]
async fn zero_timeout_waits_for_slow_commands() -> Result<(), SqlTaskError> {
    let engine = engine();
    engine.set_latency(Some(Duration::from_secs(120)));

    let rows = memory_tasks(&engine)
        .execute_query(
            &select_input(),
            &Options::default().with_timeout_seconds(0),
            &CancellationToken::new(),
        )
        .await?;
    assert_eq!(rows, serde_json::json!([]));
    Ok(())
}
