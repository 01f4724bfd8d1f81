use std::time::Duration;

use thiserror::Error;

/// Every failure an operation can surface to the host.
///
/// Nothing is retried internally; cleanup of the connection and any open
/// transaction runs before the error reaches the caller.
#[derive(Debug, Error)]
pub enum SqlTaskError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Platform not supported: {0}")]
    PlatformUnsupported(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    DataError(String),

    #[error("Operation cancelled during {0}")]
    Cancelled(String),

    #[error("{step} exceeded the command timeout of {}s", .limit.as_secs())]
    Timeout { step: String, limit: Duration },
}

impl SqlTaskError {
    /// True when the error came from the cancellation token rather than the server.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for SqlTaskError {
    fn from(err: serde_json::Error) -> Self {
        SqlTaskError::MalformedInput(format!("invalid JSON: {err}"))
    }
}

/// Sort tiberius failures into data errors (the server or the value encoder
/// rejected the statement) and connection errors (everything on the wire).
impl From<tiberius::error::Error> for SqlTaskError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error;
        match err {
            Error::Server(token) => SqlTaskError::DataError(format!(
                "SQL Server error {}: {}",
                token.code(),
                token.message()
            )),
            Error::Conversion(_) | Error::Encoding(_) | Error::BulkInput(_) | Error::ParseInt(_) => {
                SqlTaskError::DataError(err.to_string())
            }
            other => SqlTaskError::ConnectionError(other.to_string()),
        }
    }
}
