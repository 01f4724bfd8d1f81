//! Bulk load into SQL Server.
//!
//! Two paths share the destination's column metadata:
//! - the native TDS bulk load, used when no copy options are set and every
//!   writable column is present in the input with a type the row encoder
//!   handles directly;
//! - chunked multi-row `INSERT` statements otherwise. These can keep identity
//!   values through `SET IDENTITY_INSERT` and always fire insert triggers, so
//!   they refuse a table with insert triggers unless `FIRE_TRIGGERS` is set.

use std::borrow::Cow;

use futures_util::TryStreamExt;
use tiberius::{ColumnData, Query, TokenRow};
use tracing::debug;

use super::client::MssqlClient;
use super::params::bind_value;
use super::query::{quote_identifier, quote_object_name};
use crate::error::SqlTaskError;
use crate::table::DataTable;
use crate::types::{BulkCopyOptions, SqlValue};

/// Parameters per request stay well under the server's limit of 2100.
const MAX_PARAMS_PER_STATEMENT: usize = 2000;
/// SQL Server accepts at most 1000 row constructors in one `VALUES` list.
const MAX_ROWS_PER_STATEMENT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationColumn {
    pub name: String,
    pub type_name: String,
    pub is_identity: bool,
    pub is_computed: bool,
}

impl DestinationColumn {
    fn is_writable(&self) -> bool {
        !self.is_computed && !self.type_name.eq_ignore_ascii_case("timestamp")
    }

    fn native_kind(&self) -> Option<NativeKind> {
        let kind = match self.type_name.to_ascii_lowercase().as_str() {
            "tinyint" => NativeKind::U8,
            "smallint" => NativeKind::I16,
            "int" => NativeKind::I32,
            "bigint" => NativeKind::I64,
            "bit" => NativeKind::Bit,
            "real" => NativeKind::F32,
            "float" => NativeKind::F64,
            "char" | "varchar" | "nchar" | "nvarchar" => NativeKind::String,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeKind {
    U8,
    I16,
    I32,
    I64,
    Bit,
    F32,
    F64,
    String,
}

/// Copy `data` into `table` on the caller's connection (and transaction).
///
/// # Errors
/// Returns `SqlTaskError::DataError` when the table does not exist, an input
/// column has no destination counterpart, or the server rejects a row.
pub async fn bulk_insert(
    client: &mut MssqlClient,
    table: &str,
    data: &DataTable,
    options: BulkCopyOptions,
) -> Result<u64, SqlTaskError> {
    let destination = load_destination_columns(client, table).await?;
    let mapping = map_columns(table, data, &destination)?;
    let quoted_table = quote_object_name(table);

    if let Some(layout) = native_layout(&destination, &mapping, options) {
        debug!(table, columns = layout.len(), "using native bulk load");
        return native_bulk_load(client, &quoted_table, data, &layout).await;
    }

    if !options.contains(BulkCopyOptions::FIRE_TRIGGERS) {
        let has_trigger = has_insert_trigger(client, table).await?;
        check_trigger_policy(table, options, has_trigger)?;
    }
    statement_bulk_load(client, &quoted_table, data, &destination, &mapping, options).await
}

/// Read `sys.columns` for the destination, including `#temp` tables.
///
/// # Errors
/// Returns `SqlTaskError::DataError` when the table does not exist.
pub async fn load_destination_columns(
    client: &mut MssqlClient,
    table: &str,
) -> Result<Vec<DestinationColumn>, SqlTaskError> {
    let (catalog, object) = object_lookup(table);
    let sql = format!(
        "SELECT c.name, TYPE_NAME(c.system_type_id), c.is_identity, c.is_computed \
         FROM {catalog}sys.columns c WHERE c.object_id = OBJECT_ID(@P1) ORDER BY c.column_id"
    );
    let mut query = Query::new(sql);
    query.bind(object);

    let mut rows = query.query(client).await?.into_row_stream();
    let mut columns = Vec::new();
    while let Some(row) = rows.try_next().await? {
        columns.push(DestinationColumn {
            name: row.try_get::<&str, _>(0)?.unwrap_or_default().to_string(),
            type_name: row.try_get::<&str, _>(1)?.unwrap_or_default().to_string(),
            is_identity: row.try_get::<bool, _>(2)?.unwrap_or(false),
            is_computed: row.try_get::<bool, _>(3)?.unwrap_or(false),
        });
    }

    if columns.is_empty() {
        return Err(SqlTaskError::DataError(format!(
            "destination table {table} does not exist"
        )));
    }
    Ok(columns)
}

fn object_lookup(table: &str) -> (&'static str, String) {
    let last_part = table.rsplit('.').next().unwrap_or(table).trim();
    if last_part.trim_start_matches('[').starts_with('#') {
        ("tempdb.", format!("tempdb..{last_part}"))
    } else {
        ("", table.to_string())
    }
}

async fn has_insert_trigger(client: &mut MssqlClient, table: &str) -> Result<bool, SqlTaskError> {
    let (_, object) = object_lookup(table);
    let mut query = Query::new("SELECT OBJECTPROPERTY(OBJECT_ID(@P1), 'HasInsertTrigger')");
    query.bind(object);
    let row = query.query(client).await?.into_row().await?;
    Ok(row.and_then(|r| r.try_get::<i32, _>(0).ok().flatten()) == Some(1))
}

/// Statement loads cannot suppress insert triggers.
fn check_trigger_policy(
    table: &str,
    options: BulkCopyOptions,
    has_insert_trigger: bool,
) -> Result<(), SqlTaskError> {
    if has_insert_trigger && !options.contains(BulkCopyOptions::FIRE_TRIGGERS) {
        return Err(SqlTaskError::ConfigError(format!(
            "table {table} has insert triggers that this load would fire; set fireTriggers to allow it"
        )));
    }
    Ok(())
}

/// For each input column, the index of its destination column.
fn map_columns(
    table: &str,
    data: &DataTable,
    destination: &[DestinationColumn],
) -> Result<Vec<usize>, SqlTaskError> {
    data.columns()
        .iter()
        .map(|name| {
            let idx = destination
                .iter()
                .position(|col| col.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    SqlTaskError::DataError(format!(
                        "column {name} does not exist in table {table}"
                    ))
                })?;
            if destination[idx].is_writable() {
                Ok(idx)
            } else {
                Err(SqlTaskError::DataError(format!(
                    "column {name} in table {table} cannot be written"
                )))
            }
        })
        .collect()
}

/// The row layout for a native load: one `(input column, kind)` per writable,
/// non-identity destination column in table order.
fn native_layout(
    destination: &[DestinationColumn],
    mapping: &[usize],
    options: BulkCopyOptions,
) -> Option<Vec<(usize, NativeKind)>> {
    if !options.is_empty() {
        return None;
    }
    destination
        .iter()
        .enumerate()
        .filter(|(_, col)| col.is_writable() && !col.is_identity)
        .map(|(dest_idx, col)| {
            let input_idx = mapping.iter().position(|&m| m == dest_idx)?;
            Some((input_idx, col.native_kind()?))
        })
        .collect::<Option<Vec<_>>>()
        .filter(|layout| !layout.is_empty())
}

async fn native_bulk_load(
    client: &mut MssqlClient,
    quoted_table: &str,
    data: &DataTable,
    layout: &[(usize, NativeKind)],
) -> Result<u64, SqlTaskError> {
    let mut request = client.bulk_insert(quoted_table).await?;
    for (row_idx, row) in data.rows().iter().enumerate() {
        let mut token_row = TokenRow::new();
        for &(input_idx, kind) in layout {
            let value = encode_native(&row[input_idx], kind).map_err(|msg| {
                SqlTaskError::DataError(format!(
                    "row {row_idx}, column {}: {msg}",
                    data.columns()[input_idx]
                ))
            })?;
            token_row.push(value);
        }
        request.send(token_row).await?;
    }
    let result = request.finalize().await?;
    Ok(result.total())
}

fn encode_native(value: &SqlValue, kind: NativeKind) -> Result<ColumnData<'static>, String> {
    if value.is_null() {
        return Ok(match kind {
            NativeKind::U8 => ColumnData::U8(None),
            NativeKind::I16 => ColumnData::I16(None),
            NativeKind::I32 => ColumnData::I32(None),
            NativeKind::I64 => ColumnData::I64(None),
            NativeKind::Bit => ColumnData::Bit(None),
            NativeKind::F32 => ColumnData::F32(None),
            NativeKind::F64 => ColumnData::F64(None),
            NativeKind::String => ColumnData::String(None),
        });
    }
    let out_of_range = |v: i64| format!("{v} is out of range");
    Ok(match kind {
        NativeKind::U8 => {
            let v = integer(value)?;
            ColumnData::U8(Some(u8::try_from(v).map_err(|_| out_of_range(v))?))
        }
        NativeKind::I16 => {
            let v = integer(value)?;
            ColumnData::I16(Some(i16::try_from(v).map_err(|_| out_of_range(v))?))
        }
        NativeKind::I32 => {
            let v = integer(value)?;
            ColumnData::I32(Some(i32::try_from(v).map_err(|_| out_of_range(v))?))
        }
        NativeKind::I64 => ColumnData::I64(Some(integer(value)?)),
        NativeKind::Bit => ColumnData::Bit(Some(boolean(value)?)),
        #[allow(clippy::cast_possible_truncation)]
        NativeKind::F32 => ColumnData::F32(Some(float(value)? as f32)),
        NativeKind::F64 => ColumnData::F64(Some(float(value)?)),
        NativeKind::String => ColumnData::String(Some(Cow::Owned(text(value)))),
    })
}

fn integer(value: &SqlValue) -> Result<i64, String> {
    match value {
        SqlValue::Int(i) => Ok(*i),
        SqlValue::Bool(b) => Ok(i64::from(*b)),
        SqlValue::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("'{s}' is not an integer")),
        other => Err(format!("{other:?} is not an integer")),
    }
}

fn boolean(value: &SqlValue) -> Result<bool, String> {
    match value {
        SqlValue::Bool(b) => Ok(*b),
        SqlValue::Int(0) => Ok(false),
        SqlValue::Int(1) => Ok(true),
        SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(format!("'{s}' is not a boolean")),
        },
        other => Err(format!("{other:?} is not a boolean")),
    }
}

fn float(value: &SqlValue) -> Result<f64, String> {
    match value {
        SqlValue::Float(f) => Ok(*f),
        #[allow(clippy::cast_precision_loss)]
        SqlValue::Int(i) => Ok(*i as f64),
        SqlValue::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("'{s}' is not a number")),
        other => Err(format!("{other:?} is not a number")),
    }
}

fn text(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(s) => s.clone(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Bool(b) => b.to_string(),
        SqlValue::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        SqlValue::Null => String::new(),
    }
}

async fn statement_bulk_load(
    client: &mut MssqlClient,
    quoted_table: &str,
    data: &DataTable,
    destination: &[DestinationColumn],
    mapping: &[usize],
    options: BulkCopyOptions,
) -> Result<u64, SqlTaskError> {
    let keep_identity = options.contains(BulkCopyOptions::KEEP_IDENTITY);
    let included: Vec<usize> = (0..mapping.len())
        .filter(|&input_idx| keep_identity || !destination[mapping[input_idx]].is_identity)
        .collect();
    if included.is_empty() {
        return Err(SqlTaskError::DataError(
            "no writable columns in the input".to_string(),
        ));
    }
    let inserts_identity = included
        .iter()
        .any(|&input_idx| destination[mapping[input_idx]].is_identity);

    let column_list = included
        .iter()
        .map(|&input_idx| quote_identifier(&destination[mapping[input_idx]].name))
        .collect::<Vec<_>>()
        .join(", ");
    let rows_per_statement = (MAX_PARAMS_PER_STATEMENT / included.len()).clamp(1, MAX_ROWS_PER_STATEMENT);

    let mut copied = 0u64;
    for chunk in data.rows().chunks(rows_per_statement) {
        let sql = chunk_insert_sql(
            quoted_table,
            &column_list,
            chunk.len(),
            included.len(),
            inserts_identity,
        );
        let mut query = Query::new(sql);
        for row in chunk {
            for &input_idx in &included {
                bind_value(&mut query, &row[input_idx]);
            }
        }
        let result = query.execute(&mut *client).await?;
        copied += result.rows_affected().iter().sum::<u64>();
    }

    debug!(copied, "statement bulk load finished");
    Ok(copied)
}

/// One multi-row `INSERT` with `@P1..` placeholders. `IDENTITY_INSERT` only
/// lasts for the `sp_executesql` call, so it is switched on inside the same text.
fn chunk_insert_sql(
    quoted_table: &str,
    column_list: &str,
    rows: usize,
    columns: usize,
    identity_insert: bool,
) -> String {
    let mut sql = String::new();
    if identity_insert {
        sql.push_str(&format!("SET IDENTITY_INSERT {quoted_table} ON; "));
    }
    sql.push_str(&format!("INSERT INTO {quoted_table} ({column_list}) VALUES "));
    let mut position = 0usize;
    for row_idx in 0..rows {
        if row_idx > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col in 0..columns {
            if col > 0 {
                sql.push_str(", ");
            }
            position += 1;
            sql.push_str(&format!("@P{position}"));
        }
        sql.push(')');
    }
    if identity_insert {
        sql.push_str(&format!("; SET IDENTITY_INSERT {quoted_table} OFF"));
    }
    sql
}
