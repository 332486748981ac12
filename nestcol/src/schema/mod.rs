//! Record schema implementation.
//!
//! This module provides [`Schema`] which describes the shape of the records being
//! encoded. A schema is a root struct made of [`Field`]s, each with an id, a name,
//! a `required` flag and a [`SchemaType`]: a primitive, a nested
//! [`SchemaType::Struct`] or a [`SchemaType::List`] of a single element type.
//!
//! Every primitive reachable from the root is a leaf column. [`Schema::columns`]
//! lists them together with the repetition and definition levels they get under a
//! [`ListConvention`](crate::ListConvention).
//!
//! ## Creating a schema with nested lists
//!
//! ```rust
//! use nestcol::schema::{Schema, Field, SchemaType, ListType, PrimitiveType};
//!
//! let schema = Schema::new(vec![
//!     Field::new_struct(1, "first", true, vec![
//!         Field::new_struct(2, "second", true, vec![
//!             Field::new(3, "a", true, SchemaType::List(ListType::new(
//!                 4,
//!                 true,
//!                 SchemaType::List(ListType::new(
//!                     5,
//!                     true,
//!                     SchemaType::Primitive(PrimitiveType::Int)
//!                 ))
//!             )))
//!         ])
//!     ])
//! ]).unwrap();
//!
//! assert_eq!(schema.list_depth(), 2);
//! ```
//!
//! ## Reading a schema from JSON
//!
//! ```rust
//! use nestcol::schema::Schema;
//!
//! let schema = Schema::from_json(r#"{
//!     "type": "struct",
//!     "fields": [{
//!         "id": 1,
//!         "name": "lol",
//!         "required": true,
//!         "type": {
//!             "type": "list",
//!             "element-id": 2,
//!             "element-required": true,
//!             "element": "string"
//!         }
//!     }]
//! }"#).unwrap();
//!
//! assert_eq!(schema.fields()[0].name(), "lol");
//! ```
mod schema;
mod columns;

pub use self::schema::{
    Schema, SchemaBuilder, Field, SchemaType, PrimitiveType, StructType, ListType
};

pub use self::columns::ColumnDescriptor;
