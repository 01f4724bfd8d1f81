use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures_util::TryStreamExt;
use tiberius::numeric::Numeric;
use tiberius::{ColumnData, FromSql, Query};

use super::client::MssqlClient;
use super::params::{bind_query_params, bind_value};
use crate::driver::Command;
use crate::error::SqlTaskError;
use crate::results::ResultSet;
use crate::types::{CommandKind, SqlValue};

/// Build the tiberius query for a statement or procedure call.
///
/// # Errors
/// Returns `SqlTaskError::ConfigError` for a procedure parameter name that is
/// not a plain identifier, or statement text whose locals collide with the
/// positional parameter names.
pub fn build_query<'a>(command: &Command<'_>) -> Result<Query<'a>, SqlTaskError> {
    match command.kind {
        CommandKind::Text => bind_query_params(command.text, command.params),
        CommandKind::StoredProcedure => {
            let mut sql = format!("EXEC {}", quote_object_name(command.text));
            let mut values = Vec::with_capacity(command.params.len());
            for (position, (name, value)) in command.params.iter().enumerate() {
                if !is_identifier(name) {
                    return Err(SqlTaskError::ConfigError(format!(
                        "invalid procedure parameter name: {name}"
                    )));
                }
                sql.push_str(if position == 0 { " " } else { ", " });
                sql.push_str(&format!("@{name} = @P{}", position + 1));
                values.push(value);
            }
            let mut query = Query::new(sql);
            for value in values {
                bind_value(&mut query, value);
            }
            Ok(query)
        }
    }
}

/// Execute and read the first result set fully.
///
/// # Errors
/// Returns `SqlTaskError::DataError` if the server rejects the command or a
/// value cannot be read.
pub async fn build_result_set(
    client: &mut MssqlClient,
    command: &Command<'_>,
) -> Result<ResultSet, SqlTaskError> {
    let query = build_query(command)?;
    let mut stream = query.query(client).await?;

    let column_names: Vec<String> = match stream.columns().await? {
        Some(columns) => columns.iter().map(|col| col.name().to_string()).collect(),
        None => Vec::new(),
    };
    let mut result_set = ResultSet::with_columns(column_names);

    // Later result sets are drained so the connection stays usable.
    let mut rows = stream.into_row_stream();
    while let Some(row) = rows.try_next().await? {
        if row.result_index() != 0 {
            continue;
        }
        let values = row
            .into_iter()
            .map(column_value)
            .collect::<Result<Vec<_>, _>>()?;
        result_set.add_row_values(values);
    }

    Ok(result_set)
}

/// Execute and sum the rows affected by every statement in the command.
///
/// # Errors
/// Returns `SqlTaskError::DataError` if the server rejects the command.
pub async fn execute(client: &mut MssqlClient, command: &Command<'_>) -> Result<u64, SqlTaskError> {
    let query = build_query(command)?;
    let result = query.execute(client).await?;
    Ok(result.rows_affected().iter().sum())
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn column_value(data: ColumnData<'static>) -> Result<SqlValue, SqlTaskError> {
    let value = match &data {
        ColumnData::U8(v) => v.map(|v| SqlValue::Int(i64::from(v))),
        ColumnData::I16(v) => v.map(|v| SqlValue::Int(i64::from(v))),
        ColumnData::I32(v) => v.map(|v| SqlValue::Int(i64::from(v))),
        ColumnData::I64(v) => v.map(SqlValue::Int),
        ColumnData::F32(v) => v.map(|v| SqlValue::Float(f64::from(v))),
        ColumnData::F64(v) => v.map(SqlValue::Float),
        ColumnData::Bit(v) => v.map(SqlValue::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| SqlValue::Text(s.to_string())),
        ColumnData::Guid(v) => v.as_ref().map(|g| SqlValue::Text(g.to_string())),
        ColumnData::Numeric(v) => v.as_ref().map(numeric_value),
        ColumnData::Binary(v) => v.as_ref().map(|b| SqlValue::Blob(b.to_vec())),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| SqlValue::Text(x.clone().into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(&data)?
                .map(|dt| SqlValue::Text(dt.format(TIMESTAMP_FORMAT).to_string()))
        }
        ColumnData::Date(_) => NaiveDate::from_sql(&data)?.map(|d| SqlValue::Text(d.to_string())),
        ColumnData::Time(_) => NaiveTime::from_sql(&data)?.map(|t| SqlValue::Text(t.to_string())),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(&data)?
            .map(|dt| SqlValue::Text(dt.to_rfc3339())),
        #[allow(unreachable_patterns)]
        other => {
            return Err(SqlTaskError::DataError(format!(
                "unsupported column type: {other:?}"
            )));
        }
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

/// Significant digits an `f64` reproduces exactly when printed back.
const F64_EXACT_DIGITS: u32 = 15;
/// Powers of ten up to this are exact in an `f64`.
const F64_EXACT_SCALE: u8 = 22;

/// A decimal becomes a number when `f64` keeps every digit, otherwise text.
fn numeric_value(n: &Numeric) -> SqlValue {
    let (mantissa, scale) = (n.value(), n.scale());
    if scale == 0 {
        if let Ok(int) = i64::try_from(mantissa) {
            return SqlValue::Int(int);
        }
    } else if scale <= F64_EXACT_SCALE && mantissa.unsigned_abs() < 10u128.pow(F64_EXACT_DIGITS) {
        #[allow(clippy::cast_precision_loss)]
        let value = mantissa as f64 / 10f64.powi(i32::from(scale));
        return SqlValue::Float(value);
    }
    SqlValue::Text(n.to_string())
}

/// Bracket-quote each dot-separated part of an object name.
///
/// Parts already in brackets are kept; empty parts (as in `db..table`) stay
/// empty so the server applies its default schema.
#[must_use]
pub fn quote_object_name(name: &str) -> String {
    name.split('.')
        .map(|part| {
            let part = part.trim();
            if part.is_empty() || (part.starts_with('[') && part.ends_with(']') && part.len() > 1) {
                part.to_string()
            } else {
                format!("[{}]", part.replace(']', "]]"))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Bracket-quote a single column or object part.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '#' | '$' | '@'))
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;

    #[test]
    fn object_names_are_quoted_per_part() {
        assert_eq!(quote_object_name("dbo.TestProc"), "[dbo].[TestProc]");
        assert_eq!(quote_object_name("[dbo].Odd]Name"), "[dbo].[Odd]]Name]");
        assert_eq!(quote_object_name("tempdb..#load"), "[tempdb]..[#load]");
    }

    #[test]
    fn procedure_parameter_names_must_be_identifiers() {
        assert!(is_identifier("FirstName"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a; DROP TABLE t"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn scalar_columns_convert() {
        assert_eq!(column_value(ColumnData::I32(Some(7))).unwrap(), SqlValue::Int(7));
        assert_eq!(column_value(ColumnData::Bit(Some(true))).unwrap(), SqlValue::Bool(true));
        assert_eq!(
            column_value(ColumnData::String(Some(Cow::Owned("x".into())))).unwrap(),
            SqlValue::Text("x".into())
        );
        assert_eq!(column_value(ColumnData::I64(None)).unwrap(), SqlValue::Null);
        assert_eq!(
            column_value(ColumnData::Binary(Some(Cow::Owned(vec![1, 2])))).unwrap(),
            SqlValue::Blob(vec![1, 2])
        );
    }

    #[test]
    fn decimals_become_numbers_when_exact() {
        let decimal = |value, scale| {
            column_value(ColumnData::Numeric(Some(Numeric::new_with_scale(value, scale))))
        };
        assert_eq!(decimal(1250, 2).unwrap(), SqlValue::Float(12.5));
        assert_eq!(decimal(-42, 0).unwrap(), SqlValue::Int(-42));
        assert_eq!(decimal(1, 3).unwrap(), SqlValue::Float(0.001));
        assert!(matches!(
            decimal(12_345_678_901_234_567, 2).unwrap(),
            SqlValue::Text(_)
        ));
        assert_eq!(column_value(ColumnData::Numeric(None)).unwrap(), SqlValue::Null);
    }
}
