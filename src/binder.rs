//! Turn host inputs into named parameter sets.
//!
//! Query and procedure calls supply a flat `Parameter` list; batch calls supply a
//! JSON array of objects, each becoming one parameter set. Names are matched
//! case-insensitively, the same way SQL Server resolves `@Name` references.

use serde_json::Value as JsonValue;

use crate::error::SqlTaskError;
use crate::model::Parameter;
use crate::types::SqlValue;

/// An ordered set of named values. Names are unique ignoring ASCII case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, SqlValue)>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field.
    ///
    /// # Errors
    /// Returns `SqlTaskError::MalformedInput` if the name is empty or already present.
    pub fn insert(&mut self, name: &str, value: SqlValue) -> Result<(), SqlTaskError> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(SqlTaskError::MalformedInput(
                "parameter names must not be empty".to_string(),
            ));
        }
        if self.position(name).is_some() {
            return Err(SqlTaskError::MalformedInput(format!(
                "duplicate parameter name: {name}"
            )));
        }
        self.fields.push((name.to_string(), value));
        Ok(())
    }

    /// Look up a value by name, ignoring case and a leading `@`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.position(normalize_name(name)).map(|idx| &self.fields[idx].1)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build the parameter set for a query or procedure call.
    ///
    /// Duplicate names are rejected rather than silently overwritten.
    ///
    /// # Errors
    /// Returns `SqlTaskError::MalformedInput` on empty or duplicate names.
    pub fn from_parameters(parameters: &[Parameter]) -> Result<Self, SqlTaskError> {
        let mut record = Record {
            fields: Vec::with_capacity(parameters.len()),
        };
        for p in parameters {
            let value = p
                .value
                .as_ref()
                .map_or(SqlValue::Null, |v| SqlValue::Text(v.clone()));
            record.insert(&p.name, value)?;
        }
        Ok(record)
    }

    /// Build a record from one JSON object.
    ///
    /// # Errors
    /// Returns `SqlTaskError::MalformedInput` for nested values or names that
    /// collide ignoring case.
    pub fn from_json_object(
        object: &serde_json::Map<String, JsonValue>,
    ) -> Result<Self, SqlTaskError> {
        let mut record = Record {
            fields: Vec::with_capacity(object.len()),
        };
        for (key, value) in object {
            let value = SqlValue::from_json(value).map_err(|e| match e {
                SqlTaskError::MalformedInput(msg) => {
                    SqlTaskError::MalformedInput(format!("property {key}: {msg}"))
                }
                other => other,
            })?;
            record.insert(key, value)?;
        }
        Ok(record)
    }
}

fn normalize_name(name: &str) -> &str {
    name.trim().trim_start_matches('@')
}

/// Parse a JSON array of objects, one record per object.
///
/// # Errors
/// Returns `SqlTaskError::MalformedInput` if the text is not valid JSON, is not an
/// array, or contains anything other than flat objects.
pub fn parse_records(json: &str) -> Result<Vec<Record>, SqlTaskError> {
    let items = parse_object_array(json)?;
    items.iter().map(Record::from_json_object).collect()
}

/// Parse text that must be a JSON array whose elements are all objects.
pub(crate) fn parse_object_array(
    json: &str,
) -> Result<Vec<serde_json::Map<String, JsonValue>>, SqlTaskError> {
    let value: JsonValue = serde_json::from_str(json)?;
    let JsonValue::Array(items) = value else {
        return Err(SqlTaskError::MalformedInput(
            "input must be a JSON array of objects".to_string(),
        ));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            JsonValue::Object(map) => Ok(map),
            other => Err(SqlTaskError::MalformedInput(format!(
                "element {idx} is {}, expected an object",
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_bind_as_text_and_lookup_ignores_case() {
        let record = Record::from_parameters(&[
            Parameter::new("Name", "Last"),
            Parameter::null("@Id"),
        ])
        .unwrap();
        assert_eq!(record.get("@name"), Some(&SqlValue::Text("Last".into())));
        assert_eq!(record.get("ID"), Some(&SqlValue::Null));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        let err = Record::from_parameters(&[
            Parameter::new("Name", "a"),
            Parameter::new("name", "b"),
        ])
        .unwrap_err();
        assert!(matches!(err, SqlTaskError::MalformedInput(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn records_keep_json_key_order_and_types() {
        let records =
            parse_records(r#"[{"Id":1,"FirstName":"Etu","Active":true,"Score":null}]"#).unwrap();
        assert_eq!(records.len(), 1);
        let names: Vec<&str> = records[0].iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["Id", "FirstName", "Active", "Score"]);
        assert_eq!(records[0].get("id"), Some(&SqlValue::Int(1)));
        assert_eq!(records[0].get("active"), Some(&SqlValue::Bool(true)));
    }

    #[test]
    fn non_array_input_is_malformed() {
        for bad in [r#"{"Id":1}"#, "[1, 2]", "[{\"a\":[1]}]", "not json"] {
            assert!(
                matches!(parse_records(bad), Err(SqlTaskError::MalformedInput(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn empty_array_yields_no_records() {
        assert!(parse_records("[]").unwrap().is_empty());
    }
}
