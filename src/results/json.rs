use serde_json::{Map, Value as JsonValue};

use super::ResultSet;

impl ResultSet {
    /// Serialize as a JSON array with one object per row.
    ///
    /// Keys follow column order and values keep their native JSON types. An
    /// empty result is an empty array, never `null`.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let rows = self
            .results
            .iter()
            .map(|row| {
                let mut object = Map::with_capacity(row.values.len());
                for (name, value) in row.column_names.iter().zip(&row.values) {
                    object.insert(name.clone(), value.to_json());
                }
                JsonValue::Object(object)
            })
            .collect();
        JsonValue::Array(rows)
    }
}
