//! Record encoding and row decoding.

use rusqlite::Row;

use crate::{
    codec::Slot,
    descriptor::RecordDescriptor,
    error::{Error, Result},
    value::Value,
};

/// Columns and values of one record, in descriptor order.
///
/// Absent [`Nullable`](crate::Nullable) fields are not present at all.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRecord<'d> {
    entries: Vec<(&'d str, Value)>,
}

impl<'d> EncodedRecord<'d> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &'d str> + '_ {
        self.entries.iter().map(|(column, _)| *column)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(name, _)| *name == column)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn into_values(self) -> impl Iterator<Item = Value> + 'd {
        self.entries.into_iter().map(|(_, value)| value)
    }
}

/// Encode `record` into its persisted columns.
pub fn encode<'d, R>(record: &R, descriptor: &'d RecordDescriptor<R>) -> Result<EncodedRecord<'d>> {
    let mut entries = Vec::with_capacity(descriptor.fields().len());
    for field in descriptor.fields() {
        match field.encode(record)? {
            Slot::Absent => {}
            Slot::Value(value) => entries.push((field.column(), value)),
        }
    }
    Ok(EncodedRecord { entries })
}

/// Assign each returned column onto the matching field of `dest`.
///
/// Columns with no matching field are skipped; fields with no matching column
/// are left as they are.
pub fn decode<'a, R>(
    columns: impl IntoIterator<Item = (&'a str, Value)>,
    dest: &mut R,
    descriptor: &RecordDescriptor<R>,
) -> Result<()> {
    for (column, value) in columns {
        if let Some(field) = descriptor.field(column) {
            field.decode(dest, value)?;
        }
    }
    Ok(())
}

pub(crate) fn decode_row<R>(
    row: &Row<'_>,
    names: &[String],
    dest: &mut R,
    descriptor: &RecordDescriptor<R>,
) -> Result<()> {
    for (idx, name) in names.iter().enumerate() {
        if let Some(field) = descriptor.field(name) {
            let value =
                Value::try_from(row.get_ref(idx)?).map_err(|err| Error::decode(name, err))?;
            field.decode(dest, value)?;
        }
    }
    Ok(())
}
