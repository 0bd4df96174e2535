use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};

/// Core value types exchanged with SQLite
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

impl Value {
    /// True for the values an auto-generated key column starts out with.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Integer(v) => *v == 0,
            Value::Real(v) => *v == 0.0,
            Value::Text(v) => v.is_empty(),
            Value::Blob(v) => v.is_empty(),
            Value::Boolean(v) => !v,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Boolean(_) => "boolean",
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(&v[..])),
            Value::Boolean(v) => ToSqlOutput::Owned(SqlValue::Integer(*v as i64)),
        })
    }
}

impl TryFrom<ValueRef<'_>> for Value {
    type Error = std::str::Utf8Error;

    /// Fails on TEXT that is not valid UTF-8.
    fn try_from(value: ValueRef<'_>) -> Result<Self, Self::Error> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(v) => Value::Text(std::str::from_utf8(v)?.to_string()),
            ValueRef::Blob(v) => Value::Blob(v.to_vec()),
        })
    }
}
