//! SQL statement construction for key-based writes.
//!
//! Only INSERT, UPDATE-by-key and DELETE-by-key are synthesised here. Queries
//! are taken verbatim from the caller, see [`Select`].

use rusqlite::ToSql;

use crate::{
    descriptor::{RecordDescriptor, KEY_COLUMN},
    error::{Error, Result},
    mapper::encode,
    value::Value,
};

/// Upper bound on bound parameters per statement.
pub const MAX_BIND_PARAMS: usize = 32766;

/// A multi-row INSERT for records sharing the same column set.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub columns: Vec<String>,
    /// Positions, in the input slice, of the records this statement writes.
    pub rows: Vec<usize>,
    pub args: Vec<Value>,
    /// The key column was left out and is generated by the database.
    pub generated_key: bool,
}

impl InsertStatement {
    pub fn sql(&self, table: &str) -> String {
        let mut sql = if self.columns.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            let row = format!("({})", placeholders(self.columns.len()));
            let values = vec![row; self.rows.len()].join(", ");
            format!(
                "INSERT INTO {table} ({}) VALUES {values}",
                self.columns.join(", ")
            )
        };
        if self.generated_key {
            sql.push_str(" RETURNING ");
            sql.push_str(KEY_COLUMN);
        }
        sql
    }
}

/// Encode `records` and group them into INSERT statements.
///
/// Records whose key is zero have the key column left out so the database can
/// generate it. Records with identical column sets share one statement, in
/// order of first appearance; a group that would exceed [`MAX_BIND_PARAMS`] is
/// split. Returns no statements for an empty slice.
pub fn build_insert<R>(
    descriptor: &RecordDescriptor<R>,
    records: &[R],
) -> Result<Vec<InsertStatement>> {
    let key = descriptor.key().column();
    let mut statements: Vec<InsertStatement> = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        let mut encoded = encode(record, descriptor)?;
        let generated_key = match encoded.get(key).map(Value::is_zero) {
            Some(true) => {
                encoded.remove(key);
                true
            }
            Some(false) => false,
            None => true,
        };

        let columns: Vec<&str> = encoded.columns().collect();
        let width = columns.len().max(1);
        let group = statements.iter_mut().rev().find(|stmt| {
            !stmt.columns.is_empty()
                && stmt.generated_key == generated_key
                && stmt.columns == columns
                && stmt.args.len() + width <= MAX_BIND_PARAMS
        });

        match group {
            Some(stmt) => {
                stmt.rows.push(idx);
                stmt.args.extend(encoded.into_values());
            }
            None => statements.push(InsertStatement {
                columns: columns.into_iter().map(str::to_string).collect(),
                rows: vec![idx],
                args: encoded.into_values().collect(),
                generated_key,
            }),
        }
    }

    Ok(statements)
}

/// An UPDATE of one record, keyed by its primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub set_columns: Vec<String>,
    pub args: Vec<Value>,
    pub key: Value,
}

impl UpdateStatement {
    pub fn sql(&self, table: &str) -> String {
        let set = self
            .set_columns
            .iter()
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("UPDATE {table} SET {set} WHERE {KEY_COLUMN} = ?")
    }

    /// SET values followed by the key.
    pub fn bound_args(&self) -> impl Iterator<Item = &Value> {
        self.args.iter().chain(std::iter::once(&self.key))
    }

    /// True when no column is left to write.
    pub fn is_empty(&self) -> bool {
        self.set_columns.is_empty()
    }
}

pub fn build_update<R>(descriptor: &RecordDescriptor<R>, record: &R) -> Result<UpdateStatement> {
    let key_column = descriptor.key().column();
    let mut encoded = encode(record, descriptor)?;
    let key = encoded
        .remove(key_column)
        .ok_or_else(|| Error::encode(key_column, "primary key is required to update a record"))?;

    Ok(UpdateStatement {
        set_columns: encoded.columns().map(str::to_string).collect(),
        args: encoded.into_values().collect(),
        key,
    })
}

/// A DELETE of every row whose key is in the id list.
pub struct DeleteStatement<'k> {
    pub where_clause: String,
    pub args: Vec<&'k dyn ToSql>,
}

impl DeleteStatement<'_> {
    pub fn sql(&self, table: &str) -> String {
        format!("DELETE FROM {table} WHERE {}", self.where_clause)
    }
}

/// Returns `None` for an empty id list.
pub fn build_delete<K: ToSql>(ids: &[K]) -> Option<DeleteStatement<'_>> {
    if ids.is_empty() {
        return None;
    }
    Some(DeleteStatement {
        where_clause: format!("{KEY_COLUMN} IN ({})", placeholders(ids.len())),
        args: ids.iter().map(|id| id as &dyn ToSql).collect(),
    })
}

/// Caller-written query text and its positional parameters, passed through
/// to the driver unchanged.
#[derive(Debug, Clone)]
pub struct Select<'q, P> {
    pub sql: &'q str,
    pub params: P,
}

pub fn build_select<P>(sql: &str, params: P) -> Select<'_, P> {
    Select { sql, params }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
