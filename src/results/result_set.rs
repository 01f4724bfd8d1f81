use std::collections::HashMap;
use std::sync::Arc;

use super::row::CustomDbRow;
use crate::types::SqlValue;

/// A result set from a database query
///
/// Holds the rows of the first result returned by a statement. A statement
/// that returns no result (an `INSERT`, or a procedure without a `SELECT`)
/// yields a result set with no columns and no rows.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<CustomDbRow>,
    /// Column names shared by all rows, in server order
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
}

impl ResultSet {
    /// Create an empty result set with the given columns.
    ///
    /// Blank names (e.g. `SELECT COUNT(*)`) become `Column1`, `Column2`, ...
    /// by position, and repeated names get a numeric suffix so every column
    /// stays addressable.
    #[must_use]
    pub fn with_columns(column_names: Vec<String>) -> ResultSet {
        let mut seen: HashMap<String, usize> = HashMap::with_capacity(column_names.len());
        let mut unique = Vec::with_capacity(column_names.len());
        for (idx, name) in column_names.into_iter().enumerate() {
            let base = if name.trim().is_empty() {
                format!("Column{}", idx + 1)
            } else {
                name
            };
            let mut candidate = base.clone();
            let mut suffix = 1;
            while seen.contains_key(&candidate.to_ascii_lowercase()) {
                candidate = format!("{base}{suffix}");
                suffix += 1;
            }
            seen.insert(candidate.to_ascii_lowercase(), idx);
            unique.push(candidate);
        }

        let column_index = unique
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        ResultSet {
            results: Vec::new(),
            column_names: Arc::new(unique),
            column_index: Arc::new(column_index),
        }
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Add a row to the result set
    ///
    /// Short rows are padded with NULL so every row lines up with the columns.
    pub fn add_row_values(&mut self, mut row_values: Vec<SqlValue>) {
        row_values.resize(self.column_names.len(), SqlValue::Null);
        self.results.push(CustomDbRow::with_index(
            Arc::clone(&self.column_names),
            row_values,
            Arc::clone(&self.column_index),
        ));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
