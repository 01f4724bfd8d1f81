use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::SqlTaskError;

/// Values that can be bound as statement parameters or loaded as bulk rows.
///
/// Built once per JSON parse and then projected into the driver's own
/// parameter or row representation:
/// ```rust
/// use mssql_tasks::prelude::*;
///
/// let v = SqlValue::from_json(&serde_json::json!(42)).unwrap();
/// assert_eq!(v, SqlValue::Int(42));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Binary value; only produced when reading results
    Blob(Vec<u8>),
    /// NULL value
    Null,
}

impl SqlValue {
    /// Convert a scalar JSON value.
    ///
    /// # Errors
    /// Returns `SqlTaskError::MalformedInput` for nested arrays and objects, which
    /// have no flat parameter or column representation.
    pub fn from_json(value: &JsonValue) -> Result<Self, SqlTaskError> {
        match value {
            JsonValue::Null => Ok(SqlValue::Null),
            JsonValue::Bool(b) => Ok(SqlValue::Bool(*b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(SqlValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(SqlValue::Float(f))
                } else {
                    Err(SqlTaskError::MalformedInput(format!(
                        "number {n} is out of range"
                    )))
                }
            }
            JsonValue::String(s) => Ok(SqlValue::Text(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => Err(SqlTaskError::MalformedInput(
                "nested arrays and objects cannot be bound as values".to_string(),
            )),
        }
    }

    /// Project back into JSON for the materialized result.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Int(i) => JsonValue::from(*i),
            SqlValue::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number)
            }
            SqlValue::Text(s) => JsonValue::String(s.clone()),
            SqlValue::Bool(b) => JsonValue::Bool(*b),
            SqlValue::Blob(bytes) => bytes.iter().copied().map(JsonValue::from).collect(),
            SqlValue::Null => JsonValue::Null,
        }
    }

    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn is_empty_text(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let SqlValue::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let SqlValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

/// Transaction isolation requested for an operation.
///
/// `None` runs without an explicit transaction (each statement auto-commits);
/// `Default` begins a transaction with whatever isolation the server session has.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum,
)]
pub enum IsolationLevel {
    #[default]
    Default,
    ReadCommitted,
    None,
    Serializable,
    ReadUncommitted,
    RepeatableRead,
    Snapshot,
}

impl IsolationLevel {
    /// Whether an explicit transaction wraps the unit of work.
    #[must_use]
    pub fn uses_transaction(self) -> bool {
        !matches!(self, Self::None)
    }

    /// The `SET TRANSACTION ISOLATION LEVEL` statement for explicit levels.
    #[must_use]
    pub fn as_sql(self) -> Option<&'static str> {
        match self {
            Self::Default | Self::None => None,
            Self::ReadUncommitted => Some("SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED"),
            Self::ReadCommitted => Some("SET TRANSACTION ISOLATION LEVEL READ COMMITTED"),
            Self::RepeatableRead => Some("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ"),
            Self::Serializable => Some("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"),
            Self::Snapshot => Some("SET TRANSACTION ISOLATION LEVEL SNAPSHOT"),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "Default",
            Self::ReadCommitted => "ReadCommitted",
            Self::None => "None",
            Self::Serializable => "Serializable",
            Self::ReadUncommitted => "ReadUncommitted",
            Self::RepeatableRead => "RepeatableRead",
            Self::Snapshot => "Snapshot",
        };
        f.write_str(name)
    }
}

/// How the command text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// A literal SQL batch
    Text,
    /// The name of a stored procedure
    StoredProcedure,
}

/// Options applied to a bulk load, combined from the host's boolean switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BulkCopyOptions(u8);

impl BulkCopyOptions {
    /// No options: triggers do not fire and identity values are server-assigned.
    pub const NONE: Self = Self(0);
    /// Fire the destination's insert triggers.
    pub const FIRE_TRIGGERS: Self = Self(1);
    /// Keep identity values supplied by the input instead of server-assigned ones.
    pub const KEEP_IDENTITY: Self = Self(1 << 1);

    /// Include `flag` when `enabled` is set.
    #[must_use]
    pub fn with_if(self, flag: Self, enabled: bool) -> Self {
        if enabled { self | flag } else { self }
    }

    #[must_use]
    pub fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for BulkCopyOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for BulkCopyOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_scalars_map_to_tagged_values() {
        assert_eq!(SqlValue::from_json(&json!(null)).unwrap(), SqlValue::Null);
        assert_eq!(SqlValue::from_json(&json!(true)).unwrap(), SqlValue::Bool(true));
        assert_eq!(SqlValue::from_json(&json!(7)).unwrap(), SqlValue::Int(7));
        assert_eq!(SqlValue::from_json(&json!(1.5)).unwrap(), SqlValue::Float(1.5));
        assert_eq!(
            SqlValue::from_json(&json!("x")).unwrap(),
            SqlValue::Text("x".into())
        );
    }

    #[test]
    fn nested_json_is_rejected() {
        assert!(matches!(
            SqlValue::from_json(&json!({"a": 1})),
            Err(SqlTaskError::MalformedInput(_))
        ));
        assert!(SqlValue::from_json(&json!([1])).is_err());
    }

    #[test]
    fn nan_and_blobs_project_to_json() {
        assert_eq!(SqlValue::Float(f64::NAN).to_json(), JsonValue::Null);
        assert_eq!(SqlValue::Blob(vec![0, 255]).to_json(), json!([0, 255]));
    }

    #[test]
    fn isolation_level_wire_names() {
        let level: IsolationLevel = serde_json::from_str("\"RepeatableRead\"").unwrap();
        assert_eq!(level, IsolationLevel::RepeatableRead);
        assert_eq!(IsolationLevel::default(), IsolationLevel::Default);
        assert!(!IsolationLevel::None.uses_transaction());
        assert!(IsolationLevel::Default.uses_transaction());
        assert_eq!(IsolationLevel::Default.as_sql(), None);
        assert_eq!(
            IsolationLevel::Snapshot.as_sql(),
            Some("SET TRANSACTION ISOLATION LEVEL SNAPSHOT")
        );
    }

    #[test]
    fn bulk_options_combine_from_switches() {
        let opts = BulkCopyOptions::NONE
            .with_if(BulkCopyOptions::FIRE_TRIGGERS, true)
            .with_if(BulkCopyOptions::KEEP_IDENTITY, false);
        assert!(opts.contains(BulkCopyOptions::FIRE_TRIGGERS));
        assert!(!opts.contains(BulkCopyOptions::KEEP_IDENTITY));
        assert!(!opts.is_empty());
        assert!(BulkCopyOptions::default().is_empty());
    }
}
