//! Materialized query results.
//!
//! Rows are read fully off the wire into a [`ResultSet`] while the connection
//! (and transaction, if any) is still live, then serialized for the host with
//! [`ResultSet::to_json`].

mod json;
mod result_set;
mod row;

pub use result_set::ResultSet;
pub use row::CustomDbRow;
