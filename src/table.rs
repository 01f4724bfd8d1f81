use crate::binder::parse_object_array;
use crate::error::SqlTaskError;
use crate::types::SqlValue;

/// Rows to bulk load, shaped as a single table.
///
/// Columns come from the first object's keys in order. Later objects may omit
/// keys (loaded as NULL) but may not introduce new ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

impl DataTable {
    /// Parse a JSON array of objects.
    ///
    /// # Errors
    /// Returns `SqlTaskError::MalformedInput` when the input is not an array of
    /// flat objects, the first object has no properties, or a later object has
    /// a property the first one lacks.
    pub fn from_json(json: &str) -> Result<Self, SqlTaskError> {
        let objects = parse_object_array(json)?;
        let Some(first) = objects.first() else {
            return Ok(Self::default());
        };
        if first.is_empty() {
            return Err(SqlTaskError::MalformedInput(
                "the first row has no properties to map to columns".to_string(),
            ));
        }

        let columns: Vec<String> = first.keys().cloned().collect();
        let mut rows = Vec::with_capacity(objects.len());
        for (row_idx, object) in objects.iter().enumerate() {
            let mut row = vec![SqlValue::Null; columns.len()];
            for (key, value) in object {
                let col = columns
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(key))
                    .ok_or_else(|| {
                        SqlTaskError::MalformedInput(format!(
                            "row {row_idx} has property {key} which is not in the first row"
                        ))
                    })?;
                row[col] = SqlValue::from_json(value)?;
            }
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    /// Replace every empty string cell with NULL.
    pub fn convert_empty_strings_to_null(&mut self) {
        for cell in self.rows.iter_mut().flatten() {
            if cell.is_empty_text() {
                *cell = SqlValue::Null;
            }
        }
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
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
