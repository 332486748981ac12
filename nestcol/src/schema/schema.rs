//! Implementation of schema data types.

use std::cell::RefCell;
use std::borrow::Cow;
use std::collections::HashSet;

use serde::{Serialize, Deserialize};

use crate::{NestcolResult, NestcolError};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
/// An enum of possible primitive field types.
pub enum PrimitiveType {
    /// True or False
    Boolean,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit IEEE 754 floating point.
    Float,
    /// 64-bit IEEE 754 floating point.
    Double,
    /// Arbitrary-length UTF-8 character sequences
    String,
    /// Arbitrary-length byte array.
    Binary,
}

impl PrimitiveType {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            PrimitiveType::Boolean => 0,
            PrimitiveType::Int => 1,
            PrimitiveType::Long => 2,
            PrimitiveType::Float => 3,
            PrimitiveType::Double => 4,
            PrimitiveType::String => 5,
            PrimitiveType::Binary => 6,
        }
    }

    /// Name and annotation of the Parquet physical type storing this primitive.
    pub(crate) fn parquet_type(&self) -> (&'static str, Option<&'static str>) {
        match self {
            PrimitiveType::Boolean => ("boolean", None),
            PrimitiveType::Int => ("int32", None),
            PrimitiveType::Long => ("int64", None),
            PrimitiveType::Float => ("float", None),
            PrimitiveType::Double => ("double", None),
            PrimitiveType::String => ("binary", Some("UTF8")),
            PrimitiveType::Binary => ("binary", None),
        }
    }
}

impl std::fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimitiveType::Boolean => write!(f, "boolean"),
            PrimitiveType::Int => write!(f, "int"),
            PrimitiveType::Long => write!(f, "long"),
            PrimitiveType::Float => write!(f, "float"),
            PrimitiveType::Double => write!(f, "double"),
            PrimitiveType::String => write!(f, "string"),
            PrimitiveType::Binary => write!(f, "binary"),
        }
    }
}

static STRUCT_TAG: &str = "struct";
static LIST_TAG: &str = "list";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// A complex field type that contains a tuple of nested fields.
///
/// Each nested field in the struct is named and has an integer id. Each field can be
/// either optional or required, meaning that values can (or cannot) be null. Nested
/// fields may be any type, including a [StructType].
pub struct StructType {
    /// Always set to "struct".
    pub r#type: Cow<'static, str>,
    /// The fields of the struct.
    pub fields: Vec<Field>,
}

impl StructType {
    pub fn new(fields: Vec<Field>) -> Self {
        let tag = Cow::Borrowed(STRUCT_TAG);
        Self { r#type: tag, fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Finds a nested field by its name.
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
/// A schema field.
pub struct Field {
    /// Unique Id
    pub id: i32,
    /// Field Name
    pub name: String,
    /// Optional or required, meaning that values can (or can not be null)
    pub required: bool,
    /// Field can have any type
    pub r#type: SchemaType,
}

impl Field {
    pub fn new(
        id: i32,
        name: &str,
        required: bool,
        r#type: SchemaType
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            required,
            r#type,
        }
    }

    /// Creates a new `Field` with type [`SchemaType::Primitive`]
    pub fn new_primitive(
        id: i32,
        name: &str,
        required: bool,
        primitive: PrimitiveType
    ) -> Self {
        Self::new(
            id, name, required, SchemaType::Primitive(primitive)
        )
    }

    /// Creates a new `Field` with type [`SchemaType::Struct`]
    pub fn new_struct(
        id: i32,
        name: &str,
        required: bool,
        fields: impl IntoIterator<Item = Field>
    ) -> Self {
        Self::new(
            id, name, required,
            SchemaType::Struct(StructType::new(Vec::from_iter(fields)))
        )
    }

    /// Creates a new `Field` with type [`SchemaType::List`]. The name of `field`
    /// is replaced by `element`.
    pub fn new_list(
        id: i32,
        name: &str,
        required: bool,
        field: Field,
    ) -> Self {
        Self::new(
            id, name, required,
            SchemaType::List(ListType::of_field(field))
        )
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn schema_type(&self) -> &SchemaType {
        &self.r#type
    }

}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(try_from = "ListTypeModel", into = "ListTypeModel")]
/// A field type that represents a list of identical elements.
pub struct ListType {
    field: Box<Field>
}

impl ListType {
    pub fn new(element_id: i32, element_required: bool, element: SchemaType) -> Self {
        Self {
            field: Box::new(Field::new(
                element_id,
                "element",
                element_required,
                element
            ))
        }
    }

    pub fn of_field(field: Field) -> Self {
        Self::new(field.id, field.required, field.r#type)
    }

    /// Returns a reference to the nested field element
    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn element_required(&self) -> bool {
        self.field.required
    }

    pub fn element_type(&self) -> &SchemaType {
        &self.field.r#type
    }
}

/// Serializable `ListType`
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
struct ListTypeModel {
    /// Always set to "list".
    r#type: Cow<'static, str>,
    /// Unique identifier for the element
    element_id: i32,
    /// If the element is mandatory.
    element_required: bool,
    /// The type of the element.
    element: SchemaType,
}

impl From<ListType> for ListTypeModel {
    fn from(l: ListType) -> Self {
        Self {
            r#type: Cow::Borrowed(LIST_TAG),
            element_id: l.field.id,
            element_required: l.field.required,
            element: l.field.r#type
        }
    }
}

impl TryFrom<ListTypeModel> for ListType {
    type Error = NestcolError;

    fn try_from(l: ListTypeModel) -> Result<Self, Self::Error> {
        if l.r#type != LIST_TAG {
            return Err(NestcolError::schema(format!(
                "expected list type tag \"{LIST_TAG}\", found \"{}\"", l.r#type
            )));
        }

        Ok(Self::new(
            l.element_id,
            l.element_required,
            l.element
        ))
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(untagged)]
/// Represents the type of a field in a schema.
pub enum SchemaType {
    /// A primitive field type.
    Primitive(PrimitiveType),
    /// A struct field type.
    Struct(StructType),
    /// A list field type.
    List(ListType),
}

impl SchemaType {
    /// The deepest number of lists nested inside this type, counting itself.
    pub fn list_depth(&self) -> usize {
        match self {
            SchemaType::Primitive(_) => 0,
            SchemaType::Struct(s) => {
                s.fields.iter()
                    .map(|field| field.r#type.list_depth())
                    .max()
                    .unwrap_or(0)
            },
            SchemaType::List(l) => 1 + l.element_type().list_depth(),
        }
    }
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SchemaType::Primitive(p) => write!(f, "{p}"),
            SchemaType::Struct(s) => {
                write!(f, "struct<")?;
                for (i, field) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.r#type)?;
                }
                write!(f, ">")
            },
            SchemaType::List(l) => write!(f, "list<{}>", l.element_type()),
        }
    }
}

/// A record schema: the root struct whose fields are written as columns.
///
/// A `Schema` is validated when created: field names are unique within each struct,
/// field ids are unique across the schema and structs are never empty.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(try_from = "StructType", into = "StructType")]
pub struct Schema {
    /// Must be of variant `SchemaType::Struct`
    schema: SchemaType,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> NestcolResult<Self> {
        Self::try_from(StructType::new(fields))
    }

    pub fn struct_type(&self) -> &StructType {
        match &self.schema {
            SchemaType::Struct(s) => s,
            _ => unreachable!("schema root is always a struct"),
        }
    }

    /// The root of the schema as a [`SchemaType::Struct`].
    pub fn as_type(&self) -> &SchemaType {
        &self.schema
    }

    /// Returns a shared slice of the top-level fields in the schema.
    pub fn fields(&self) -> &[Field] {
        &self.struct_type().fields
    }

    /// The deepest list nesting found in the schema. This is also the largest
    /// repetition level any column of the schema can have.
    pub fn list_depth(&self) -> usize {
        self.schema.list_depth()
    }

    pub fn encode(&self) -> NestcolResult<String> {
        serde_json::to_string(self)
            .map_err(|source| NestcolError::SerializeSchemaJson { source })
    }

    /// Parses and validates a schema from its JSON form.
    pub fn from_json(json: &str) -> NestcolResult<Self> {
        serde_json::from_str(json)
            .map_err(|source| NestcolError::InvalidSchemaJson { source })
    }
}

impl TryFrom<StructType> for Schema {
    type Error = NestcolError;

    fn try_from(root: StructType) -> Result<Self, Self::Error> {
        let mut ids = HashSet::new();
        validate_struct(&root, "", &mut ids)?;

        Ok(Self { schema: SchemaType::Struct(root) })
    }
}

impl From<Schema> for StructType {
    fn from(schema: Schema) -> Self {
        match schema.schema {
            SchemaType::Struct(s) => s,
            _ => unreachable!("schema root is always a struct"),
        }
    }
}

fn validate_struct(
    s: &StructType,
    path: &str,
    ids: &mut HashSet<i32>
) -> NestcolResult<()> {
    if s.r#type != STRUCT_TAG {
        return Err(NestcolError::schema(format!(
            "expected struct type tag \"{STRUCT_TAG}\" at '{}', found \"{}\"",
            display_path(path), s.r#type
        )));
    }
    if s.fields.is_empty() {
        return Err(NestcolError::schema(format!(
            "struct at '{}' has no fields", display_path(path)
        )));
    }

    let mut names = HashSet::new();
    for field in &s.fields {
        if field.name.is_empty() {
            return Err(NestcolError::schema(format!(
                "struct at '{}' has a field with an empty name", display_path(path)
            )));
        }
        if !names.insert(field.name.as_str()) {
            return Err(NestcolError::schema(format!(
                "duplicate field name '{}' in struct at '{}'",
                field.name, display_path(path)
            )));
        }
        let field_path = if path.is_empty() {
            field.name.clone()
        } else {
            format!("{path}.{}", field.name)
        };
        validate_field(field, &field_path, ids)?;
    }

    Ok(())
}

fn validate_field(field: &Field, path: &str, ids: &mut HashSet<i32>) -> NestcolResult<()> {
    if !ids.insert(field.id) {
        return Err(NestcolError::schema(format!(
            "duplicate field id {} at '{path}'", field.id
        )));
    }

    match &field.r#type {
        SchemaType::Primitive(_) => Ok(()),
        SchemaType::Struct(s) => validate_struct(s, path, ids),
        SchemaType::List(l) => validate_field(l.field(), &format!("{path}.element"), ids),
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "<root>" } else { path }
}

/// Provides an interface for building schemas with automatic field id assignment.
///
/// `SchemaBuilder` internally tracks field ids and automatically assigns the next id
/// to each new field, including list elements.
///
/// # Examples
///
/// ```rust
/// use nestcol::schema::{SchemaBuilder, PrimitiveType, SchemaType};
///
/// let mut builder = SchemaBuilder::new();
/// let inner = builder.new_list_type(SchemaType::Primitive(PrimitiveType::Int));
/// builder.add_fields(vec![
///     builder.new_struct_field("first", vec![
///         builder.new_struct_field("second", vec![
///             builder.new_list_field("a", inner)
///         ])
///     ])
/// ]);
/// let schema = builder.build().unwrap();
/// assert_eq!(schema.list_depth(), 2);
/// ```
pub struct SchemaBuilder {
    next_field_id: RefCell<i32>,
    fields: Vec<Field>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            next_field_id: RefCell::new(1),
            fields: Vec::new(),
        }
    }

    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn add_fields(&mut self, fields: Vec<Field>) {
        self.fields.extend(fields);
    }

    fn next_field_id(&self) -> i32 {
        self.next_field_id.replace_with(|&mut old| old + 1)
    }

    /// Creates a required primitive field.
    pub fn new_primitive_field(
        &self,
        name: &str,
        r#type: PrimitiveType
    ) -> Field {
        Field::new(
            self.next_field_id(),
            name,
            true,
            SchemaType::Primitive(r#type)
        )
    }

    /// Creates a list type with required elements, to be nested in another list.
    pub fn new_list_type(&self, subtype: SchemaType) -> SchemaType {
        SchemaType::List(ListType::new(self.next_field_id(), true, subtype))
    }

    /// Creates a required list field with required elements.
    pub fn new_list_field(&self, name: &str, subtype: SchemaType) -> Field {
        Field::new(
            self.next_field_id(),
            name,
            true,
            SchemaType::List(ListType::new(
                self.next_field_id(),
                true,
                subtype
            ))
        )
    }

    pub fn new_struct_field(&self, name: &str, subfields: Vec<Field>) -> Field {
        Field::new(
            self.next_field_id(),
            name,
            true,
            SchemaType::Struct(StructType::new(subfields))
        )
    }

    pub fn build(&mut self) -> NestcolResult<Schema> {
        Schema::new(std::mem::take(&mut self.fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_schema() -> Schema {
        Schema::new(vec![
            Field::new(
                1,
                "id",
                true,
                SchemaType::Primitive(PrimitiveType::Long)
            ),
            Field::new(
                2,
                "name",
                false,
                SchemaType::Primitive(PrimitiveType::String)
            ),
            Field::new(
                3,
                "users",
                false,
                SchemaType::List(ListType::new(
                    4,
                    false,
                    SchemaType::Struct(StructType::new(vec![
                        Field::new(
                            5,
                            "first_name",
                            true,
                            SchemaType::Primitive(PrimitiveType::String)
                        ),
                        Field::new(
                            6,
                            "scores",
                            true,
                            SchemaType::List(ListType::new(
                                7,
                                true,
                                SchemaType::Primitive(PrimitiveType::Int)
                            ))
                        )
                    ]))
                ))
            ),
        ]).unwrap()
    }

    #[test]
    fn serialize_to_json() {
        let schema = create_schema();

        let expected = serde_json::json!({
            "type": "struct",
            "fields": [
                {
                    "id": 1,
                    "name": "id",
                    "required": true,
                    "type": "long"
                },
                {
                    "id": 2,
                    "name": "name",
                    "required": false,
                    "type": "string"
                },
                {
                    "id": 3,
                    "name": "users",
                    "required": false,
                    "type": {
                        "type": "list",
                        "element-id": 4,
                        "element-required": false,
                        "element": {
                            "type": "struct",
                            "fields": [
                                {
                                    "id": 5,
                                    "name": "first_name",
                                    "required": true,
                                    "type": "string"
                                },
                                {
                                    "id": 6,
                                    "name": "scores",
                                    "required": true,
                                    "type": {
                                        "type": "list",
                                        "element-id": 7,
                                        "element-required": true,
                                        "element": "int"
                                    }
                                }
                            ]
                        }
                    }
                }
            ]
        });

        assert_eq!(serde_json::to_value(schema).unwrap(), expected);
    }

    #[test]
    fn deserialize_from_json() {
        let schema = create_schema();
        let json = schema.encode().unwrap();

        assert_eq!(Schema::from_json(&json).unwrap(), schema);
    }

    #[test]
    fn rejects_duplicate_names() {
        let result = Schema::new(vec![
            Field::new_primitive(1, "a", true, PrimitiveType::Int),
            Field::new_primitive(2, "a", true, PrimitiveType::Long),
        ]);

        assert!(matches!(result, Err(NestcolError::SchemaError { .. })));
    }

    #[test]
    fn rejects_duplicate_names_from_json() {
        let result = Schema::from_json(r#"{
            "type": "struct",
            "fields": [
                {"id": 1, "name": "a", "required": true, "type": "int"},
                {"id": 2, "name": "a", "required": true, "type": "int"}
            ]
        }"#);

        assert!(matches!(result, Err(NestcolError::InvalidSchemaJson { .. })));
    }

    #[test]
    fn rejects_duplicate_ids_and_empty_structs() {
        let result = Schema::new(vec![
            Field::new_primitive(1, "a", true, PrimitiveType::Int),
            Field::new_primitive(1, "b", true, PrimitiveType::Int),
        ]);
        assert!(matches!(result, Err(NestcolError::SchemaError { .. })));

        let result = Schema::new(vec![
            Field::new_struct(1, "empty", true, vec![]),
        ]);
        assert!(matches!(result, Err(NestcolError::SchemaError { .. })));

        assert!(Schema::new(vec![]).is_err());
    }

    #[test]
    fn list_depth() {
        let schema = create_schema();
        assert_eq!(schema.list_depth(), 2);
    }

    #[test]
    fn rejects_unknown_type_tags() {
        let result = Schema::from_json(r#"{
            "type": "banana",
            "fields": [{"id": 1, "name": "a", "required": true, "type": "int"}]
        }"#);
        assert!(matches!(result, Err(NestcolError::InvalidSchemaJson { .. })));

        let result = Schema::from_json(r#"{
            "type": "struct",
            "fields": [{"id": 1, "name": "a", "required": true, "type": {
                "type": "set", "element-id": 2, "element-required": true, "element": "int"
            }}]
        }"#);
        assert!(matches!(result, Err(NestcolError::InvalidSchemaJson { .. })));

        let mut root = StructType::new(vec![
            Field::new_primitive(1, "a", true, PrimitiveType::Int),
        ]);
        root.r#type = "map".into();
        assert!(matches!(Schema::try_from(root), Err(NestcolError::SchemaError { .. })));
    }

    #[test]
    fn builder_assigns_ids() {
        let mut builder = SchemaBuilder::new();
        let inner = builder.new_list_type(SchemaType::Primitive(PrimitiveType::Int));
        builder.add_fields(vec![
            builder.new_struct_field("first", vec![
                builder.new_struct_field("second", vec![
                    builder.new_list_field("a", inner)
                ])
            ])
        ]);
        let schema = builder.build().unwrap();

        let first = &schema.fields()[0];
        let SchemaType::Struct(second) = first.schema_type() else { panic!("not a struct") };
        let second = &second.fields()[0];
        let SchemaType::Struct(a) = second.schema_type() else { panic!("not a struct") };
        let a = &a.fields()[0];
        let SchemaType::List(outer) = a.schema_type() else { panic!("not a list") };
        let SchemaType::List(inner) = outer.element_type() else { panic!("not a list") };

        let ids = [first.id(), second.id(), a.id(), outer.field().id(), inner.field().id()]
            .into_iter()
            .collect::<HashSet<_>>();
        assert_eq!(ids.len(), 5);
        assert_eq!(
            schema.as_type().to_string(),
            "struct<first: struct<second: struct<a: list<list<int>>>>>"
        );
    }
}
