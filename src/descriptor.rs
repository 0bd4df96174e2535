//! Record descriptors and the process-wide descriptor cache.
//!
//! A descriptor is built the first time a record type is used and is kept for
//! the lifetime of the process; entries are never invalidated or evicted.
//! Each type has its own once-cell, so a slow build for one type does not hold
//! up lookups or builds for any other type, and concurrent first uses of the
//! same type run the build exactly once.

use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

use tracing::debug;

use crate::{
    codec::{Codec, Slot},
    error::{Error, MappingError, Result},
    record::{Access, Record},
    tag::parse_tag,
    value::Value,
};

/// Column holding the primary key of every mapped table.
pub const KEY_COLUMN: &str = "id";

pub struct FieldDescriptor<R> {
    column: String,
    name: &'static str,
    codec: Codec,
    primary_key: bool,
    access: Box<dyn Access<R>>,
}

impl<R> FieldDescriptor<R> {
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Name of the struct field this column is read from.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_json(&self) -> bool {
        self.codec == Codec::Json
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub(crate) fn encode(&self, record: &R) -> Result<Slot> {
        self.access
            .encode(record, self.codec)
            .map_err(|err| Error::encode(&self.column, err))
    }

    pub(crate) fn decode(&self, record: &mut R, value: Value) -> Result<()> {
        self.access
            .decode(record, self.codec, value)
            .map_err(|err| Error::decode(&self.column, err))
    }
}

impl<R> std::fmt::Debug for FieldDescriptor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("column", &self.column)
            .field("name", &self.name)
            .field("codec", &self.codec)
            .field("primary_key", &self.primary_key)
            .finish()
    }
}

/// Ordered persisted fields of one record type.
#[derive(Debug)]
pub struct RecordDescriptor<R> {
    record: &'static str,
    fields: Vec<FieldDescriptor<R>>,
    key: usize,
    by_column: HashMap<String, usize>,
}

impl<R> RecordDescriptor<R> {
    pub fn record_name(&self) -> &'static str {
        self.record
    }

    pub fn fields(&self) -> &[FieldDescriptor<R>] {
        &self.fields
    }

    pub fn key(&self) -> &FieldDescriptor<R> {
        &self.fields[self.key]
    }

    pub fn field(&self, column: &str) -> Option<&FieldDescriptor<R>> {
        self.by_column.get(column).map(|&idx| &self.fields[idx])
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(FieldDescriptor::column)
    }
}

type Built = std::result::Result<Arc<dyn Any + Send + Sync>, MappingError>;

fn cache() -> &'static RwLock<HashMap<TypeId, Arc<OnceLock<Built>>>> {
    static CACHE: OnceLock<RwLock<HashMap<TypeId, Arc<OnceLock<Built>>>>> = OnceLock::new();
    CACHE.get_or_init(Default::default)
}

/// Return the descriptor for `R`, building and caching it on first use.
///
/// A type that fails to map keeps failing with the same [`MappingError`].
pub fn describe<R: Record>() -> Result<Arc<RecordDescriptor<R>>> {
    let id = TypeId::of::<R>();

    let existing = cache()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .cloned();
    let cell = match existing {
        Some(cell) => cell,
        None => cache()
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .clone(),
    };

    let built = cell.get_or_init(|| {
        let descriptor = build::<R>()?;
        debug!(
            record = descriptor.record,
            columns = ?descriptor.columns().collect::<Vec<_>>(),
            "built record descriptor"
        );
        Ok(Arc::new(descriptor) as Arc<dyn Any + Send + Sync>)
    });

    match built {
        Ok(any) => any.clone().downcast::<RecordDescriptor<R>>().map_err(|_| {
            Error::Mapping(MappingError {
                record: type_name::<R>(),
                reason: "descriptor cache holds a different type".to_string(),
            })
        }),
        Err(err) => Err(Error::Mapping(err.clone())),
    }
}

fn build<R: Record>() -> std::result::Result<RecordDescriptor<R>, MappingError> {
    let record = type_name::<R>();
    let fail = |reason: String| MappingError { record, reason };

    let mut fields = Vec::new();
    let mut by_column = HashMap::new();
    let mut key = None;

    for field in R::fields() {
        let tag = parse_tag(field.tag).map_err(|err| fail(format!("field `{}`: {err}", field.name)))?;

        let idx = fields.len();
        if by_column.insert(tag.column.clone(), idx).is_some() {
            return Err(fail(format!(
                "column `{}` is mapped by more than one field",
                tag.column
            )));
        }

        let primary_key = tag.column == KEY_COLUMN;
        if primary_key {
            if tag.json {
                return Err(fail(format!("primary key `{KEY_COLUMN}` cannot be a JSON column")));
            }
            key = Some(idx);
        }

        fields.push(FieldDescriptor {
            column: tag.column,
            name: field.name,
            codec: if tag.json { Codec::Json } else { Codec::Scalar },
            primary_key,
            access: field.access,
        });
    }

    let key = key.ok_or_else(|| fail(format!("no field maps to the `{KEY_COLUMN}` primary key column")))?;

    Ok(RecordDescriptor {
        record,
        fields,
        key,
        by_column,
    })
}
