use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{BulkCopyOptions, IsolationLevel};

const REDACTED: &str = "<redacted>";

fn default_timeout_seconds() -> u64 {
    60
}

/// A named statement parameter. Values arrive as text and are bound as such.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn null(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

/// Input for `execute_query`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryInput {
    /// Query text; parameters are referenced as `@Name`.
    pub query: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    pub connection_string: String,
}

/// Input for `execute_procedure`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureInput {
    /// Name of the stored procedure to execute.
    pub execute: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    pub connection_string: String,
}

/// Input for `batch_operation`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInput {
    /// Statement executed once per object in `input_json`.
    pub query: String,
    /// JSON array of objects whose keys match the statement's `@Name` placeholders.
    pub input_json: String,
    pub connection_string: String,
}

/// Input for `bulk_insert`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkInsertInput {
    /// JSON array of objects whose keys match the destination column names.
    pub input_data: String,
    /// Destination table name.
    pub table_name: String,
    pub connection_string: String,
}

/// Execution options shared by every operation.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Per-command limit in seconds; `0` waits indefinitely.
    #[serde(default = "default_timeout_seconds")]
    pub command_timeout_seconds: u64,
    pub isolation_level: IsolationLevel,
    /// Run the operation under `username`/`password` instead of the process identity.
    pub use_alternate_credentials: bool,
    /// Account in `domain\username` form.
    pub username: String,
    pub password: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            command_timeout_seconds: default_timeout_seconds(),
            isolation_level: IsolationLevel::Default,
            use_alternate_credentials: false,
            username: String::new(),
            password: String::new(),
        }
    }
}

impl Options {
    #[must_use]
    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.command_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.use_alternate_credentials = true;
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// The command timeout, or `None` when it is disabled.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_seconds > 0).then(|| Duration::from_secs(self.command_timeout_seconds))
    }

    /// Username and password when alternate credentials were requested.
    #[must_use]
    pub fn alternate_credentials(&self) -> Option<(&str, &str)> {
        self.use_alternate_credentials
            .then_some((self.username.as_str(), self.password.as_str()))
    }
}

/// Options for `bulk_insert`: the shared options plus load switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulkInsertOptions {
    #[serde(flatten)]
    pub execution: Options,
    /// Fire the destination table's insert triggers.
    pub fire_triggers: bool,
    /// Preserve identity values from the input; otherwise the server assigns them.
    pub keep_identity: bool,
    /// Load `""` as NULL so typed (non-text) columns accept empty inputs.
    pub convert_empty_strings_to_null: bool,
}

impl BulkInsertOptions {
    #[must_use]
    pub fn copy_options(&self) -> BulkCopyOptions {
        BulkCopyOptions::NONE
            .with_if(BulkCopyOptions::FIRE_TRIGGERS, self.fire_triggers)
            .with_if(BulkCopyOptions::KEEP_IDENTITY, self.keep_identity)
    }
}

// Manual Debug implementations keep connection strings and passwords out of logs.
impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("command_timeout_seconds", &self.command_timeout_seconds)
            .field("isolation_level", &self.isolation_level)
            .field("use_alternate_credentials", &self.use_alternate_credentials)
            .field("username", &self.username)
            .field("password", &REDACTED)
            .finish()
    }
}

impl fmt::Debug for QueryInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryInput")
            .field("query", &self.query)
            .field("parameters", &self.parameters)
            .field("connection_string", &REDACTED)
            .finish()
    }
}

impl fmt::Debug for ProcedureInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureInput")
            .field("execute", &self.execute)
            .field("parameters", &self.parameters)
            .field("connection_string", &REDACTED)
            .finish()
    }
}

impl fmt::Debug for BatchInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchInput")
            .field("query", &self.query)
            .field("input_json_len", &self.input_json.len())
            .field("connection_string", &REDACTED)
            .finish()
    }
}

impl fmt::Debug for BulkInsertInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkInsertInput")
            .field("table_name", &self.table_name)
            .field("input_data_len", &self.input_data.len())
            .field("connection_string", &REDACTED)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults_follow_wire_format() {
        let opts: Options = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.command_timeout_seconds, 60);
        assert_eq!(opts.isolation_level, IsolationLevel::Default);
        assert!(opts.alternate_credentials().is_none());
        assert_eq!(opts.command_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn zero_timeout_disables_limit() {
        let opts = Options::default().with_timeout_seconds(0);
        assert_eq!(opts.command_timeout(), None);
    }

    #[test]
    fn bulk_options_flatten_shared_options() {
        let opts: BulkInsertOptions = serde_json::from_str(
            r#"{"commandTimeoutSeconds": 5, "isolationLevel": "None", "fireTriggers": true,
                "convertEmptyStringsToNull": true}"#,
        )
        .unwrap();
        assert_eq!(opts.execution.command_timeout_seconds, 5);
        assert_eq!(opts.execution.isolation_level, IsolationLevel::None);
        assert!(opts.convert_empty_strings_to_null);
        assert!(opts.copy_options().contains(BulkCopyOptions::FIRE_TRIGGERS));
        assert!(!opts.copy_options().contains(BulkCopyOptions::KEEP_IDENTITY));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let opts = Options::default().with_credentials("corp\\svc", "hunter2");
        let input = QueryInput {
            query: "select 1".into(),
            parameters: vec![],
            connection_string: "Server=db;Password=hunter2".into(),
        };
        let rendered = format!("{opts:?} {input:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("corp\\\\svc"));
    }

    #[test]
    fn parameters_accept_null_values() {
        let p: Parameter = serde_json::from_str(r#"{"name": "Id", "value": null}"#).unwrap();
        assert_eq!(p, Parameter::null("Id"));
    }
}
