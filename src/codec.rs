//! Field codecs.
//!
//! Every persisted field goes through one of two codecs, picked once when the
//! record descriptor is built:
//!
//! - [`Codec::Scalar`] maps the field onto a single SQLite value using a small
//!   serde serializer/deserializer pair. Composite shapes (structs, maps,
//!   tuples) are rejected.
//! - [`Codec::Json`] serializes the whole field to a JSON payload stored as a
//!   blob, and parses it back on read.

use std::fmt::Display;

use serde::{
    de::{self, value::SeqDeserializer, DeserializeOwned, IntoDeserializer, Visitor},
    ser::{self, Impossible, Serialize},
};

use crate::{nullable::ABSENT, value::Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Scalar,
    Json,
}

/// One encoded field: either left out of the statement or a concrete value.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Absent,
    Value(Value),
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CodecError(String);

impl ser::Error for CodecError {
    fn custom<T: Display>(msg: T) -> Self {
        CodecError(msg.to_string())
    }
}

impl de::Error for CodecError {
    fn custom<T: Display>(msg: T) -> Self {
        CodecError(msg.to_string())
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError(err.to_string())
    }
}

impl Codec {
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Slot, CodecError> {
        match self {
            Codec::Scalar => value.serialize(ScalarSerializer),
            Codec::Json if is_absent(value) => Ok(Slot::Absent),
            Codec::Json => Ok(Slot::Value(Value::Blob(serde_json::to_vec(value)?))),
        }
    }

    pub fn decode<T: DeserializeOwned>(self, value: Value) -> Result<T, CodecError> {
        match self {
            Codec::Scalar => T::deserialize(ValueDeserializer(value)),
            Codec::Json => match value {
                Value::Blob(payload) => Ok(serde_json::from_slice(&payload)?),
                Value::Text(payload) => Ok(serde_json::from_str(&payload)?),
                Value::Null => Ok(serde_json::from_slice(b"null")?),
                other => Err(CodecError(format!(
                    "expected a JSON payload, found {} value",
                    other.kind()
                ))),
            },
        }
    }
}

fn is_absent<T: Serialize + ?Sized>(value: &T) -> bool {
    // Composite values fail fast in the scalar serializer, so the probe is cheap.
    matches!(value.serialize(ScalarSerializer), Ok(Slot::Absent))
}

fn composite(shape: &str) -> CodecError {
    CodecError(format!(
        "{shape} cannot be stored in a single column; tag the field with `,json`"
    ))
}

struct ScalarSerializer;

impl ser::Serializer for ScalarSerializer {
    type Ok = Slot;
    type Error = CodecError;

    type SerializeSeq = BytesSerializer;
    type SerializeTuple = Impossible<Slot, CodecError>;
    type SerializeTupleStruct = Impossible<Slot, CodecError>;
    type SerializeTupleVariant = Impossible<Slot, CodecError>;
    type SerializeMap = Impossible<Slot, CodecError>;
    type SerializeStruct = Impossible<Slot, CodecError>;
    type SerializeStructVariant = Impossible<Slot, CodecError>;

    fn serialize_bool(self, v: bool) -> Result<Slot, CodecError> {
        Ok(Slot::Value(Value::Boolean(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<Slot, CodecError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> Result<Slot, CodecError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> Result<Slot, CodecError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> Result<Slot, CodecError> {
        Ok(Slot::Value(Value::Integer(v)))
    }

    fn serialize_u8(self, v: u8) -> Result<Slot, CodecError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u16(self, v: u16) -> Result<Slot, CodecError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u32(self, v: u32) -> Result<Slot, CodecError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u64(self, v: u64) -> Result<Slot, CodecError> {
        let v = i64::try_from(v)
            .map_err(|_| CodecError(format!("{v} does not fit in a 64-bit signed integer")))?;
        self.serialize_i64(v)
    }

    fn serialize_f32(self, v: f32) -> Result<Slot, CodecError> {
        self.serialize_f64(v as f64)
    }

    fn serialize_f64(self, v: f64) -> Result<Slot, CodecError> {
        Ok(Slot::Value(Value::Real(v)))
    }

    fn serialize_char(self, v: char) -> Result<Slot, CodecError> {
        Ok(Slot::Value(Value::Text(v.to_string())))
    }

    fn serialize_str(self, v: &str) -> Result<Slot, CodecError> {
        Ok(Slot::Value(Value::Text(v.to_string())))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Slot, CodecError> {
        Ok(Slot::Value(Value::Blob(v.to_vec())))
    }

    fn serialize_none(self) -> Result<Slot, CodecError> {
        Ok(Slot::Value(Value::Null))
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Slot, CodecError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Slot, CodecError> {
        Ok(Slot::Value(Value::Null))
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<Slot, CodecError> {
        if name == ABSENT {
            return Ok(Slot::Absent);
        }
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Slot, CodecError> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Slot, CodecError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Slot, CodecError> {
        Err(composite("an enum variant with data"))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<BytesSerializer, CodecError> {
        Ok(BytesSerializer {
            bytes: Vec::with_capacity(len.unwrap_or_default()),
        })
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, CodecError> {
        Err(composite("a tuple"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, CodecError> {
        Err(composite("a tuple struct"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, CodecError> {
        Err(composite("an enum variant with data"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, CodecError> {
        Err(composite("a map"))
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, CodecError> {
        Err(composite(&format!("struct `{name}`")))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, CodecError> {
        Err(composite("an enum variant with data"))
    }
}

/// Sequences are only accepted when every element is a byte, and become blobs.
struct BytesSerializer {
    bytes: Vec<u8>,
}

impl ser::SerializeSeq for BytesSerializer {
    type Ok = Slot;
    type Error = CodecError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CodecError> {
        match value.serialize(ScalarSerializer)? {
            Slot::Value(Value::Integer(byte)) => {
                let byte = u8::try_from(byte).map_err(|_| composite("a sequence"))?;
                self.bytes.push(byte);
                Ok(())
            }
            _ => Err(composite("a sequence")),
        }
    }

    fn end(self) -> Result<Slot, CodecError> {
        Ok(Slot::Value(Value::Blob(self.bytes)))
    }
}

struct ValueDeserializer(Value);

impl<'de> de::Deserializer<'de> for ValueDeserializer {
    type Error = CodecError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        match self.0 {
            Value::Null => visitor.visit_unit(),
            Value::Integer(v) => visitor.visit_i64(v),
            Value::Real(v) => visitor.visit_f64(v),
            Value::Text(v) => visitor.visit_string(v),
            Value::Blob(v) => visitor.visit_byte_buf(v),
            Value::Boolean(v) => visitor.visit_bool(v),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        match self.0 {
            Value::Integer(v) => visitor.visit_bool(v != 0),
            other => ValueDeserializer(other).deserialize_any(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        match self.0 {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(ValueDeserializer(other)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        match self.0 {
            Value::Blob(bytes) => visitor.visit_seq(SeqDeserializer::new(bytes.into_iter())),
            Value::Text(text) => {
                visitor.visit_seq(SeqDeserializer::new(text.into_bytes().into_iter()))
            }
            other => ValueDeserializer(other).deserialize_any(visitor),
        }
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        match self.0 {
            Value::Text(text) => visitor.visit_byte_buf(text.into_bytes()),
            other => ValueDeserializer(other).deserialize_any(visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        match self.0 {
            Value::Text(variant) => visitor.visit_enum(variant.into_deserializer()),
            other => Err(CodecError(format!(
                "expected an enum variant name, found {} value",
                other.kind()
            ))),
        }
    }

    serde::forward_to_deserialize_any! {
        i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        unit unit_struct tuple tuple_struct map struct identifier ignored_any
    }
}
