use tiberius::{Client, Config, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::error::SqlTaskError;

/// Type alias for SQL Server client
pub type MssqlClient = Client<Compat<TcpStream>>;

/// Parse an ADO.NET style connection string.
///
/// # Errors
/// Returns `SqlTaskError::ConfigError` when the string cannot be parsed.
pub fn parse_connection_string(connection_string: &str) -> Result<Config, SqlTaskError> {
    Config::from_ado_string(connection_string)
        .map_err(|e| SqlTaskError::ConfigError(format!("invalid connection string: {e}")))
}

/// Open a client, resolving named instances through SQL Browser and
/// following one server redirect.
///
/// # Errors
/// Returns `SqlTaskError::ConfigError` for an unparsable connection string and
/// `SqlTaskError::ConnectionError` for network or login failures.
pub async fn create_mssql_client(connection_string: &str) -> Result<MssqlClient, SqlTaskError> {
    let config = parse_connection_string(connection_string)?;

    let tcp = TcpStream::connect_named(&config)
        .await
        .map_err(|e| SqlTaskError::ConnectionError(format!("TCP connection error: {e}")))?;
    tcp.set_nodelay(true)
        .map_err(|e| SqlTaskError::ConnectionError(format!("TCP configuration error: {e}")))?;

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        Err(tiberius::error::Error::Routing { host, port }) => {
            debug!(%host, port, "server redirected the connection");
            let mut config = config;
            config.host(&host);
            config.port(port);
            let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
                SqlTaskError::ConnectionError(format!("TCP connection error after redirect: {e}"))
            })?;
            tcp.set_nodelay(true).map_err(|e| {
                SqlTaskError::ConnectionError(format!("TCP configuration error: {e}"))
            })?;
            Client::connect(config, tcp.compat_write()).await.map_err(|e| {
                SqlTaskError::ConnectionError(format!("SQL Server connection error: {e}"))
            })
        }
        Err(e) => Err(SqlTaskError::ConnectionError(format!(
            "SQL Server connection error: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_parses() {
        let config = parse_connection_string(
            "Server=tcp:db.example.com,1433;Database=Test;User Id=sa;Password=pw;TrustServerCertificate=true",
        )
        .unwrap();
        assert_eq!(config.get_addr(), "db.example.com:1433");
    }

    #[test]
    fn garbage_connection_string_is_a_config_error() {
        let err = parse_connection_string("Server=tcp:host,notaport").unwrap_err();
        assert!(matches!(err, SqlTaskError::ConfigError(_)));
    }
}
