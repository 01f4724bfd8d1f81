//! Test doubles for exercising the task operations without a SQL Server.
//!
//! [`MemoryEngine`] implements [`crate::driver::Connector`] over in-memory
//! tables. Statements are not parsed; each command text or procedure name is
//! routed to a handler registered by the test.

pub mod memory;

pub use memory::{
    CallCounts, MemoryConnection, MemoryEngine, MemoryTable, StatementOutput, Tables,
};

use crate::credentials::PlatformImpersonator;
use crate::tasks::SqlTasks;

/// Task operations backed by `engine` and the platform impersonator.
#[must_use]
pub fn memory_tasks(engine: &MemoryEngine) -> SqlTasks<MemoryEngine, PlatformImpersonator> {
    SqlTasks::new(engine.clone(), PlatformImpersonator)
}
