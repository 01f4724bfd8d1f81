//! Load a JSON array of rows into a table through the engine's bulk copy.

use async_trait::async_trait;
use tracing::debug;

use crate::coordinator::{Step, UnitOfWork};
use crate::driver::Connection;
use crate::error::SqlTaskError;
use crate::model::{BulkInsertInput, BulkInsertOptions};
use crate::table::DataTable;
use crate::types::BulkCopyOptions;

/// A parsed bulk load, ready to run inside a [`crate::coordinator::TransactionCoordinator`].
#[derive(Debug)]
pub struct BulkWork<'a> {
    pub table_name: &'a str,
    pub data: DataTable,
    pub options: BulkCopyOptions,
}

impl<'a> BulkWork<'a> {
    /// Parse and shape the input before any connection is opened.
    ///
    /// # Errors
    /// Returns `SqlTaskError::ConfigError` for a blank table name and
    /// `SqlTaskError::MalformedInput` for input that is not an array of objects.
    pub fn prepare(
        input: &'a BulkInsertInput,
        options: &BulkInsertOptions,
    ) -> Result<Self, SqlTaskError> {
        let table_name = input.table_name.trim();
        if table_name.is_empty() {
            return Err(SqlTaskError::ConfigError(
                "a destination table name is required".to_string(),
            ));
        }

        let mut data = DataTable::from_json(&input.input_data)?;
        if options.convert_empty_strings_to_null {
            data.convert_empty_strings_to_null();
        }

        Ok(Self {
            table_name,
            data,
            options: options.copy_options(),
        })
    }
}

#[async_trait]
impl<'a, C: Connection> UnitOfWork<C> for BulkWork<'a> {
    type Output = u64;

    async fn run(self, conn: &mut C, step: &Step<'_>) -> Result<u64, SqlTaskError> {
        if self.data.is_empty() {
            debug!(table = self.table_name, "no rows to copy");
            return Ok(0);
        }
        let copied = step
            .command(
                "bulk copy",
                conn.bulk_insert(self.table_name, &self.data, self.options),
            )
            .await?;
        debug!(table = self.table_name, copied, "bulk copy finished");
        Ok(copied)
    }
}
