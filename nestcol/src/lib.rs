//! Columnar encoding of nested lists in Rust.
//!
//! Nested values such as `list<list<int>>` are stored in columnar files by
//! flattening every leaf field into its own column. Each column entry carries a
//! *repetition level*, telling at which list depth a new list starts, and a
//! *definition level*, telling how many of the optional and repeated levels above
//! the leaf are present. Together they allow the nested value to be rebuilt
//! without any explicit list lengths.
//!
//! Lists can be laid out in one of two ways, selected by [`ListConvention`]:
//!
//! * [`ListConvention::Legacy`]: the "2-level" layout where the repeated node is the
//!   element itself. Elements can never be null.
//! * [`ListConvention::Standard`]: the "3-level" layout with a repeated wrapper group
//!   around a possibly nullable `element` field.
//!
//! ## Encoding a record
//!
//! ```rust
//! use nestcol::{NestedListEncoder, ListConvention, NestcolResult};
//! use nestcol::schema::{Field, ListType, PrimitiveType, Schema, SchemaType};
//! use nestcol::value::Value;
//!
//! fn main() -> NestcolResult<()> {
//!     let schema = Schema::new(vec![
//!         Field::new_list(1, "a", true, Field::new(
//!             2,
//!             "element",
//!             true,
//!             SchemaType::List(ListType::new(3, true, SchemaType::Primitive(PrimitiveType::Int)))
//!         )),
//!     ])?;
//!
//!     let encoder = NestedListEncoder::new(schema, ListConvention::Legacy)?;
//!
//!     let record = Value::record([
//!         ("a", Value::List(vec![
//!             Value::List(vec![Value::Int(1), Value::Int(2)]),
//!             Value::List(vec![Value::Int(3), Value::Int(4)]),
//!         ])),
//!     ]);
//!
//!     let encoded = encoder.encode(&record)?;
//!     let decoded = encoder.decode(&encoded)?;
//!     assert_eq!(decoded, record);
//!     Ok(())
//! }
//! ```
mod convention;

pub mod schema;
pub mod value;
pub mod levels;
pub mod stream;
pub mod encoder;
pub mod writer;

pub use crate::convention::ListConvention;
pub use crate::encoder::{
    NestedListEncoder, NestedListEncoderBuilder, EncodedColumns, EncodedColumn,
    encode, decode
};

/// A result type returned by functions in this crate.
pub type NestcolResult<T> = Result<T, NestcolError>;

/// A nested list encoding error.
#[derive(thiserror::Error, Debug)]
pub enum NestcolError {
    /// The value does not have the shape required by the schema, or it holds
    /// something the selected list convention can't represent.
    #[error("Value does not match schema: {message}")]
    SchemaMismatch { message: String },

    /// A column stream violates the level protocol or the stream format.
    #[error("Corrupt encoding: {message}")]
    CorruptEncoding { message: String },

    /// An invalid schema was given or built.
    #[error("Schema error: {message}")]
    SchemaError { message: String },

    /// A configuration option could not be interpreted.
    #[error("Invalid value {value:?} for option {key}")]
    InvalidOption { key: String, value: String },

    /// Failed serializing the schema to json.
    #[error("Error serializing schema to json: {source}")]
    SerializeSchemaJson { source: serde_json::Error },

    /// Attempted to parse an invalid schema document.
    #[error("Error deserializing schema from json: {source}")]
    InvalidSchemaJson { source: serde_json::Error },

    /// An error related to the Parquet file format.
    #[error("Parquet error: {source}")]
    ParquetError {#[from] source: parquet::errors::ParquetError},

    /// A system I/O error
    #[error("I/O error: {source}")]
    IoError {#[from] source: std::io::Error},
}

impl NestcolError {
    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        NestcolError::SchemaMismatch { message: message.into() }
    }

    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        NestcolError::CorruptEncoding { message: message.into() }
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        NestcolError::SchemaError { message: message.into() }
    }
}
