//! cprval is a schema-driven binary codec for telemetry value trees.
//!
//! Messages are encoded against a [`Schema`], compiled from a declarative [`Definition`] tree.
//! Since both sides hold the schema, field names and types never go on the wire. On top of
//! that, the codec can:
//!
//! - Deduplicate repeated values into per-path pools, or into pools shared between paths
//! - Intern strings into a single per-message string table
//! - Write monotonic integers as differences from the last value at the same path
//! - Carry self-describing, free-form maps (e.g. attributes) where no schema applies
//! - Pack the finished message with zstd
//!
//! Each encode or decode call owns all of its dictionaries. Nothing is shared between messages,
//! and a `Schema` can be used from many threads at once.
//!
//! ```
//! # use cprval::*;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::new(Definition::object(vec![
//!     ("service", Definition::new(ValueType::String).pooled()),
//!     ("start", Definition::new(ValueType::Integer).diff_encode()),
//!     ("attributes", Definition::free_form().nullable()),
//! ]))?;
//!
//! let value = Value::object(vec![
//!     ("service", Value::from("checkout")),
//!     ("start", Value::from(1_700_000_000_000i64)),
//! ]);
//! let config = CodecConfig::default();
//! let message = schema.encode(&value, &config)?;
//! let packed = Compress::zstd(3).compress(&message)?;
//!
//! let decoded = schema.decode(&decompress(&packed)?, &config)?;
//! assert_eq!(decoded, Some(value));
//! # Ok(())
//! # }
//! ```
//!
//! See the [`format`] module for the wire format.

mod compress;
mod config;
mod decode;
mod definition;
mod encode;
mod error;
pub mod format;
mod pool;
mod schema;
mod value;
pub mod varint;

pub use self::compress::{decompress, Compress, CompressionError};
pub use self::config::CodecConfig;
pub use self::definition::Definition;
pub use self::error::{Error, Result};
pub use self::pool::{Pool, PoolEntry, StringInterner};
pub use self::schema::{PoolId, Schema, Segment, ITEM_SEGMENT};
pub use self::value::{Fields, Value, ValueType};
pub use self::varint::IntMode;

/// The literal bytes that start the data section of every message.
pub const MAGIC: &[u8; 6] = b"cprval";

/// The maximum nesting depth of free-form values.
pub const MAX_DEPTH: usize = 100;

/// The maximum size of a message, before post-compression, is 16 MiB. Larger messages can still
/// be encoded, but can't be packed or unpacked.
pub const MAX_MESSAGE_SIZE: usize = 1usize << 24; // 16 MiB

/// The default budget for the in-memory size of one decoded message, 256 MiB. Pooled values are
/// counted again at every reference to them. See [`Schema::decode_with_limit`].
pub const MAX_DECODED_SIZE: usize = 1usize << 28; // 256 MiB
