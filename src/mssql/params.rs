use tiberius::Query;

use crate::binder::Record;
use crate::error::SqlTaskError;
use crate::types::SqlValue;

use super::placeholders::translate_named;

/// Bind one value onto the query.
pub fn bind_value(query: &mut Query<'_>, value: &SqlValue) {
    match value {
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Blob(bytes) => query.bind(bytes.clone()),
        SqlValue::Null => query.bind(Option::<String>::None),
    }
}

/// Rewrite named references and return a query with the values bound in
/// position order.
///
/// # Errors
/// Returns `SqlTaskError::ConfigError` when the text cannot be rewritten safely.
pub fn bind_query_params<'a>(sql: &str, params: &Record) -> Result<Query<'a>, SqlTaskError> {
    let translated = translate_named(sql, params)?;
    let mut query = Query::new(translated.sql);
    for value in translated.values {
        bind_value(&mut query, value);
    }
    Ok(query)
}
