//! Record declaration.
//!
//! A record is a plain struct whose persisted fields are listed, in column
//! order, by [`Record::fields`]. Each [`Field`] pairs a raw column tag with a
//! typed accessor; the tag is parsed and the codec picked once, when the
//! record's descriptor is first built. Use the [`record!`](crate::record!)
//! macro rather than writing the impl by hand.

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    codec::{Codec, CodecError, Slot},
    value::Value,
};

pub trait Record: Default + Send + Sync + 'static {
    fn fields() -> Vec<Field<Self>>;
}

/// Typed read/write access to one field of `R`, erased over the field type.
pub trait Access<R>: Send + Sync {
    fn encode(&self, record: &R, codec: Codec) -> Result<Slot, CodecError>;
    fn decode(&self, record: &mut R, codec: Codec, value: Value) -> Result<(), CodecError>;
}

struct Accessor<R, T> {
    get: fn(&R) -> &T,
    get_mut: fn(&mut R) -> &mut T,
}

impl<R, T> Access<R> for Accessor<R, T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, record: &R, codec: Codec) -> Result<Slot, CodecError> {
        codec.encode((self.get)(record))
    }

    fn decode(&self, record: &mut R, codec: Codec, value: Value) -> Result<(), CodecError> {
        *(self.get_mut)(record) = codec.decode(value)?;
        Ok(())
    }
}

pub struct Field<R> {
    pub name: &'static str,
    pub tag: &'static str,
    pub(crate) access: Box<dyn Access<R>>,
}

impl<R: 'static> Field<R> {
    pub fn new<T>(
        name: &'static str,
        tag: &'static str,
        get: fn(&R) -> &T,
        get_mut: fn(&mut R) -> &mut T,
    ) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        Self {
            name,
            tag,
            access: Box::new(Accessor { get, get_mut }),
        }
    }
}

impl<R> std::fmt::Debug for Field<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .finish()
    }
}

/// Declare a struct and implement [`Record`] for it.
///
/// Fields carrying `#[column = "tag"]` are persisted, in declaration order.
/// Fields without it are transient and never read from or written to the
/// database.
///
/// ```ignore
/// record! {
///     #[derive(Debug, Default)]
///     pub struct User {
///         #[column = "id"]
///         pub id: i64,
///         #[column = "name"]
///         pub name: String,
///         #[column = "address,json"]
///         pub address: Address,
///         pub scratch: u32,
///     }
/// }
/// ```
#[macro_export]
macro_rules! record {
    (@field $fields:ident, $name:ident, $field:ident) => {};

    (@field $fields:ident, $name:ident, $field:ident, $tag:literal) => {
        $fields.push($crate::Field::new(
            ::std::stringify!($field),
            $tag,
            |record: &$name| &record.$field,
            |record: &mut $name| &mut record.$field,
        ));
    };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[column = $tag:literal])?
                $fvis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $($fvis $field: $ty,)*
        }

        impl $crate::Record for $name {
            fn fields() -> ::std::vec::Vec<$crate::Field<Self>> {
                #[allow(unused_mut)]
                let mut fields = ::std::vec::Vec::new();
                $($crate::record!(@field fields, $name, $field $(, $tag)?);)*
                fields
            }
        }
    };
}
