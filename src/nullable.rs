//! Optional values for partial-update record shapes.
//!
//! A [`Nullable`] field that is [`Nullable::Absent`] is left out of the encoded
//! record entirely, so an update never touches its column. This is different
//! from `Option<T>`, where `None` writes SQL `NULL`.

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};

/// Marker the scalar codec recognises as "leave this column out".
pub(crate) const ABSENT: &str = "$rust_sqlite_orm::Absent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nullable<T> {
    Absent,
    Present(T),
}

impl<T> Default for Nullable<T> {
    fn default() -> Self {
        Nullable::Absent
    }
}

impl<T> Nullable<T> {
    pub fn present(value: T) -> Self {
        Nullable::Present(value)
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Nullable::Present(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Nullable::Absent => None,
            Nullable::Present(v) => Some(v),
        }
    }
}

impl<T> From<Option<T>> for Nullable<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Nullable::Absent, Nullable::Present)
    }
}

impl<T: Serialize> Serialize for Nullable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Nullable::Absent => serializer.serialize_unit_struct(ABSENT),
            Nullable::Present(v) => v.serialize(serializer),
        }
    }
}

/// `null` (and a NULL column) reads back as [`Nullable::Absent`].
impl<'de, T: DeserializeOwned> Deserialize<'de> for Nullable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Nullable::from)
    }
}

pub fn int(v: i32) -> Nullable<i32> {
    Nullable::Present(v)
}

pub fn int64(v: i64) -> Nullable<i64> {
    Nullable::Present(v)
}

pub fn uint(v: u32) -> Nullable<u32> {
    Nullable::Present(v)
}

pub fn float64(v: f64) -> Nullable<f64> {
    Nullable::Present(v)
}

pub fn string(v: impl Into<String>) -> Nullable<String> {
    Nullable::Present(v.into())
}

pub fn bool(v: bool) -> Nullable<bool> {
    Nullable::Present(v)
}
