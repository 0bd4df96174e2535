//! Struct-to-row mapping over SQLite.
//!
//! # Intention
//!
//! - Map plain Rust structs onto the rows of one table: tagged fields become
//!   columns, `,json` fields are stored as JSON payloads, and
//!   [`Nullable`] fields allow partial updates.
//! - Build the INSERT / UPDATE / DELETE statements for those records, pass
//!   caller-written queries straight through, and decode result rows back.
//! - Stream large result sets row by row with [`ChunkParser`].
//!
//! # Architectural Boundaries
//!
//! - Only mapping and statement plumbing belongs here.
//! - No query planning, joins, eager loading or schema migrations; tables are
//!   created by the caller.

pub mod chunk;
pub mod codec;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod mapper;
pub mod nullable;
pub mod provider;
pub mod record;
pub mod sqlite;
pub mod statement;
pub mod tag;
pub mod value;

pub use chunk::ChunkParser;
pub use context::Context;
pub use descriptor::{describe, FieldDescriptor, RecordDescriptor, KEY_COLUMN};
pub use error::{Error, MappingError, Result};
pub use mapper::{decode, encode, EncodedRecord};
pub use nullable::Nullable;
pub use provider::Provider;
pub use record::{Field, Record};
pub use sqlite::{Config, Database, Tx};
pub use value::Value;

pub use rusqlite;
