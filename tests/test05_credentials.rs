mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mssql_tasks::prelude::*;
use mssql_tasks::test_utils::memory_tasks;

use common::{CONN, SELECT_BY_ID_SQL, engine};

fn select_input() -> QueryInput {
    QueryInput {
        query: SELECT_BY_ID_SQL.into(),
        parameters: vec![Parameter::new("Id", "1")],
        connection_string: CONN.into(),
    }
}

#[derive(Default)]
struct RecordingImpersonator {
    restored: Arc<AtomicUsize>,
}

impl Impersonator for RecordingImpersonator {
    fn impersonate(
        &self,
        account: &DomainAccount,
        _password: &str,
    ) -> Result<ImpersonationGuard, SqlTaskError> {
        assert_eq!(account.domain, "corp");
        assert_eq!(account.username, "svc");
        let restored = Arc::clone(&self.restored);
        Ok(ImpersonationGuard::new(move || {
            restored.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

#[tokio::test]
async fn malformed_username_fails_before_connecting() {
    let engine = engine();
    let err = memory_tasks(&engine)
        .execute_query(
            &select_input(),
            &Options::default().with_credentials("notadomainuser", "pw"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SqlTaskError::ConfigError(_)), "{err}");
    assert_eq!(engine.counts().connects, 0);
}

#[tokio::test]
async fn platform_impersonator_refuses_well_formed_accounts() {
    let engine = engine();
    let err = memory_tasks(&engine)
        .execute_query(
            &select_input(),
            &Options::default().with_credentials("corp\\svc", "pw"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SqlTaskError::PlatformUnsupported(_)));
    assert_eq!(engine.counts().connects, 0);
}

#[tokio::test]
async fn custom_impersonator_wraps_the_whole_operation() -> Result<(), SqlTaskError> {
    let engine = engine();
    let impersonator = RecordingImpersonator::default();
    let restored = Arc::clone(&impersonator.restored);
    let tasks = SqlTasks::new(engine.clone(), impersonator);

    tasks
        .execute_query(
            &select_input(),
            &Options::default().with_credentials("corp\\svc", "pw"),
            &CancellationToken::new(),
        )
        .await?;
    assert_eq!(restored.load(Ordering::SeqCst), 1);
    assert_eq!(engine.counts().closes, 1);

    // Without alternate credentials the impersonator is not consulted.
    tasks
        .execute_query(&select_input(), &Options::default(), &CancellationToken::new())
        .await?;
    assert_eq!(restored.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn identity_is_restored_when_the_operation_fails() {
    let engine = engine();
    engine.set_fail_connect(true);
    let impersonator = RecordingImpersonator::default();
    let restored = Arc::clone(&impersonator.restored);

    let err = SqlTasks::new(engine, impersonator)
        .execute_query(
            &select_input(),
            &Options::default().with_credentials("corp\\svc", "pw"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SqlTaskError::ConnectionError(_)));
    assert_eq!(restored.load(Ordering::SeqCst), 1);
}
