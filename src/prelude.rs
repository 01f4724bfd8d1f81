//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use tokio_util::sync::CancellationToken;

pub use crate::credentials::{DomainAccount, ImpersonationGuard, Impersonator, PlatformImpersonator};
pub use crate::driver::{Command, Connection, Connector};
pub use crate::error::SqlTaskError;
pub use crate::model::{
    BatchInput, BulkInsertInput, BulkInsertOptions, Options, Parameter, ProcedureInput, QueryInput,
};
pub use crate::mssql::TiberiusConnector;
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::tasks::SqlTasks;
pub use crate::types::{BulkCopyOptions, CommandKind, IsolationLevel, SqlValue};
