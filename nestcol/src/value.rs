//! Interface for working with field values.
//!
//! This module provides [`Value`] which represents a single value of a field, or a
//! whole record when it is a [`Value::Struct`].
use std::collections::HashMap;

use serde::{Serialize, Deserialize};

use crate::{NestcolResult, NestcolError};
use crate::schema::{Schema, SchemaType, StructType, PrimitiveType};

/// Represents any valid field value.
///
/// A struct field that is missing from a [`Value::Struct`] and one that is set to
/// [`Value::Null`] are equivalent: both mean the field is absent.
///
/// The value can be serialized and deserialized from JSON using the `serde_json`
/// module. Binary values are written as hex strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    #[serde(with = "binary_serde")]
    Binary(Vec<u8>),
    Struct(HashMap<String, Value>),
    List(Vec<Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => {
                // A missing key compares equal to an explicit null.
                let field_eq = |name: &String, value: &Value, other: &HashMap<String, Value>| {
                    match other.get(name) {
                        Some(other) => value == other,
                        None => value.is_null(),
                    }
                };
                a.iter().all(|(name, value)| field_eq(name, value, b))
                    && b.iter().all(|(name, value)| field_eq(name, value, a))
            },
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Creates a [`Value::Struct`] from name and value pairs.
    ///
    /// ```rust
    /// use nestcol::value::Value;
    ///
    /// let record = Value::record([("id", Value::Long(7))]);
    /// assert!(matches!(record, Value::Struct(_)));
    /// ```
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Struct(
            fields.into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect()
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The primitive type of a primitive value, `None` for nulls, structs and lists.
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self {
            Value::Boolean(_) => Some(PrimitiveType::Boolean),
            Value::Int(_) => Some(PrimitiveType::Int),
            Value::Long(_) => Some(PrimitiveType::Long),
            Value::Float(_) => Some(PrimitiveType::Float),
            Value::Double(_) => Some(PrimitiveType::Double),
            Value::String(_) => Some(PrimitiveType::String),
            Value::Binary(_) => Some(PrimitiveType::Binary),
            Value::Null | Value::Struct(_) | Value::List(_) => None,
        }
    }

    /// A short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Struct(_) => "struct",
            Value::List(_) => "list",
        }
    }

    /// Checks that the value conforms to the given type, recursively.
    ///
    /// Nulls are accepted wherever the schema marks a field or list element as
    /// optional. A value that conforms may still be rejected by the encoder when the
    /// selected list convention can't represent it.
    ///
    /// # Errors
    ///
    /// [`NestcolError::SchemaMismatch`] describing the first offending position.
    pub fn check(&self, r#type: &SchemaType) -> NestcolResult<()> {
        check_value(Some(self), r#type, false, "<root>")
    }

    /// Converts a JSON value into a [`Value`], using the schema type to pick the
    /// width of numbers. Binary values are read from hex strings.
    ///
    /// ```rust
    /// use nestcol::value::Value;
    /// use nestcol::schema::{SchemaType, ListType, PrimitiveType};
    ///
    /// let r#type = SchemaType::List(ListType::new(1, true, SchemaType::Primitive(PrimitiveType::Long)));
    /// let value = Value::from_json(&serde_json::json!([1, 2]), &r#type).unwrap();
    /// assert_eq!(value, Value::List(vec![Value::Long(1), Value::Long(2)]));
    /// ```
    pub fn from_json(json: &serde_json::Value, r#type: &SchemaType) -> NestcolResult<Value> {
        from_json(json, r#type, "<root>")
    }
}

fn check_value(
    value: Option<&Value>,
    r#type: &SchemaType,
    nullable: bool,
    path: &str
) -> NestcolResult<()> {
    let value = match value {
        None | Some(Value::Null) => {
            return if nullable {
                Ok(())
            } else {
                Err(NestcolError::mismatch(format!("required value at '{path}' is null")))
            };
        },
        Some(value) => value,
    };

    match (r#type, value) {
        (SchemaType::Primitive(primitive), value) => {
            if value.primitive_type() == Some(*primitive) {
                Ok(())
            } else {
                Err(NestcolError::mismatch(format!(
                    "expected {primitive} at '{path}', found {}", value.kind()
                )))
            }
        },
        (SchemaType::Struct(s), Value::Struct(fields)) => {
            check_known_fields(s, fields, path)?;
            for field in s.fields() {
                check_value(
                    fields.get(&field.name),
                    &field.r#type,
                    !field.required,
                    &format!("{path}.{}", field.name)
                )?;
            }
            Ok(())
        },
        (SchemaType::List(l), Value::List(items)) => {
            for (i, item) in items.iter().enumerate() {
                check_value(
                    Some(item),
                    l.element_type(),
                    !l.element_required(),
                    &format!("{path}[{i}]")
                )?;
            }
            Ok(())
        },
        (r#type, value) => {
            Err(NestcolError::mismatch(format!(
                "expected {} at '{path}', found {}", r#type, value.kind()
            )))
        },
    }
}

pub(crate) fn check_known_fields(
    s: &StructType,
    fields: &HashMap<String, Value>,
    path: &str
) -> NestcolResult<()> {
    match fields.keys().find(|name| s.field_by_name(name).is_none()) {
        Some(name) => Err(NestcolError::mismatch(format!(
            "struct at '{path}' has no field named '{name}'"
        ))),
        None => Ok(()),
    }
}

fn from_json(json: &serde_json::Value, r#type: &SchemaType, path: &str) -> NestcolResult<Value> {
    use serde_json::Value as Json;

    let mismatch = || NestcolError::mismatch(format!(
        "can't read {json} at '{path}' as {}", r#type
    ));

    if json.is_null() {
        return Ok(Value::Null);
    }

    Ok(match r#type {
        SchemaType::Primitive(primitive) => match primitive {
            PrimitiveType::Boolean => Value::Boolean(json.as_bool().ok_or_else(mismatch)?),
            PrimitiveType::Int => {
                let i = json.as_i64().ok_or_else(mismatch)?;
                Value::Int(i32::try_from(i).map_err(|_| mismatch())?)
            },
            PrimitiveType::Long => Value::Long(json.as_i64().ok_or_else(mismatch)?),
            PrimitiveType::Float => {
                let d = json.as_f64().ok_or_else(mismatch)?;
                // Rounds to the nearest float, but never to infinity or zero.
                let f = d as f32;
                if f.is_infinite() || (f == 0.0 && d != 0.0) {
                    return Err(mismatch());
                }
                Value::Float(f)
            },
            PrimitiveType::Double => Value::Double(json.as_f64().ok_or_else(mismatch)?),
            PrimitiveType::String => Value::String(
                json.as_str().ok_or_else(mismatch)?.to_string()
            ),
            PrimitiveType::Binary => Value::Binary(
                binary_serde::decode_hex(json.as_str().ok_or_else(mismatch)?)
                    .ok_or_else(mismatch)?
            ),
        },
        SchemaType::Struct(s) => {
            let Json::Object(object) = json else {
                return Err(mismatch());
            };
            let mut fields = HashMap::new();
            for (name, child) in object {
                let field = s.field_by_name(name).ok_or_else(|| {
                    NestcolError::mismatch(format!(
                        "struct at '{path}' has no field named '{name}'"
                    ))
                })?;
                fields.insert(
                    name.clone(),
                    from_json(child, &field.r#type, &format!("{path}.{name}"))?
                );
            }
            Value::Struct(fields)
        },
        SchemaType::List(l) => {
            let Json::Array(items) = json else {
                return Err(mismatch());
            };
            Value::List(
                items.iter()
                    .enumerate()
                    .map(|(i, item)| from_json(item, l.element_type(), &format!("{path}[{i}]")))
                    .collect::<NestcolResult<Vec<_>>>()?
            )
        },
    })
}

/// Builds a [`Value::Struct`] one field at a time, validating every field against
/// the schema as soon as it is set.
///
/// # Examples
///
/// ```rust
/// use nestcol::schema::{Schema, Field, PrimitiveType};
/// use nestcol::value::{StructValueBuilder, Value};
///
/// let schema = Schema::new(vec![
///     Field::new_primitive(1, "id", true, PrimitiveType::Long),
///     Field::new_primitive(2, "name", false, PrimitiveType::String),
/// ]).unwrap();
///
/// let record = StructValueBuilder::for_schema(&schema)
///     .set("id", Value::Long(1)).unwrap()
///     .build().unwrap();
///
/// assert!(StructValueBuilder::for_schema(&schema).set("id", Value::Int(1)).is_err());
/// assert!(StructValueBuilder::for_schema(&schema).build().is_err());
/// ```
pub struct StructValueBuilder<'a> {
    r#type: &'a StructType,
    fields: HashMap<String, Value>,
}

impl<'a> StructValueBuilder<'a> {
    pub fn new(r#type: &'a StructType) -> Self {
        Self {
            r#type,
            fields: HashMap::new(),
        }
    }

    /// Creates a builder for a whole record of `schema`.
    pub fn for_schema(schema: &'a Schema) -> Self {
        Self::new(schema.struct_type())
    }

    /// Sets a field, checking that `value` conforms to the field's type.
    pub fn set(mut self, name: &str, value: Value) -> NestcolResult<Self> {
        let field = self.r#type.field_by_name(name).ok_or_else(|| {
            NestcolError::mismatch(format!("struct has no field named '{name}'"))
        })?;
        check_value(Some(&value), &field.r#type, !field.required, name)?;

        self.fields.insert(name.to_string(), value);
        Ok(self)
    }

    /// Sets a nested struct field using a builder for its own type.
    pub fn set_struct<F>(self, name: &str, build: F) -> NestcolResult<Self>
    where
        F: FnOnce(StructValueBuilder<'_>) -> NestcolResult<StructValueBuilder<'_>>
    {
        let r#type = self.r#type;
        let field = r#type.field_by_name(name).ok_or_else(|| {
            NestcolError::mismatch(format!("struct has no field named '{name}'"))
        })?;
        let SchemaType::Struct(nested) = &field.r#type else {
            return Err(NestcolError::mismatch(format!(
                "field '{name}' is {}, not a struct", field.r#type
            )));
        };

        let value = build(StructValueBuilder::new(nested))?.build()?;
        self.set(name, value)
    }

    /// Finishes the struct. Fails if a required field was never set.
    pub fn build(self) -> NestcolResult<Value> {
        if let Some(field) = self.r#type.fields()
            .iter()
            .find(|field| field.required && !self.fields.contains_key(&field.name))
        {
            return Err(NestcolError::mismatch(format!(
                "required field '{}' was not set", field.name
            )));
        }

        Ok(Value::Struct(self.fields))
    }
}

/// Custom serializer and deserializer for `Value::Binary`, encoding it as a hex
/// string.
mod binary_serde {
    use serde::{self, Deserialize, Serializer, Deserializer};

    pub fn serialize<S>(
        binary: &[u8],
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = binary.iter().map(|x| format!("{:02x}", x)).collect::<String>();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        decode_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid hex string"))
    }

    pub fn decode_hex(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 || !s.is_ascii() {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::{Field, ListType};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new_primitive(1, "id", true, PrimitiveType::Long),
            Field::new_struct(2, "inner", false, vec![
                Field::new(3, "tags", true, SchemaType::List(ListType::new(
                    4, false, SchemaType::Primitive(PrimitiveType::String)
                ))),
            ]),
        ]).unwrap()
    }

    #[test]
    fn json_serialization() {
        let value = Value::List(vec![Value::Int(1), Value::Null, Value::Int(3)]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "[1,null,3]");

        let value = Value::Binary(vec![0x00, 0x01, 0x02, 0xff]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "\"000102ff\"");

        let value = Value::record([("a", Value::List(vec![]))]);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"a":[]}"#);
    }

    #[test]
    fn check_accepts_nulls_where_optional() {
        let schema = schema();
        let record = Value::record([
            ("id", Value::Long(1)),
            ("inner", Value::record([
                ("tags", Value::List(vec![Value::String("x".into()), Value::Null])),
            ])),
        ]);
        record.check(schema.as_type()).unwrap();

        Value::record([("id", Value::Long(1))]).check(schema.as_type()).unwrap();
    }

    #[test]
    fn check_rejects_mismatches() {
        let schema = schema();

        let missing_required = Value::record([("inner", Value::Null)]);
        assert!(matches!(
            missing_required.check(schema.as_type()),
            Err(NestcolError::SchemaMismatch { .. })
        ));

        let wrong_type = Value::record([("id", Value::Int(1))]);
        assert!(wrong_type.check(schema.as_type()).is_err());

        let unknown = Value::record([("id", Value::Long(1)), ("other", Value::Int(1))]);
        assert!(unknown.check(schema.as_type()).is_err());

        let not_a_list = Value::record([
            ("id", Value::Long(1)),
            ("inner", Value::record([("tags", Value::String("x".into()))])),
        ]);
        assert!(not_a_list.check(schema.as_type()).is_err());
    }

    #[test]
    fn from_json_uses_schema_widths() {
        let schema = schema();
        let value = Value::from_json(
            &json!({"id": 5, "inner": {"tags": ["a", null]}}),
            schema.as_type()
        ).unwrap();

        assert_eq!(value, Value::record([
            ("id", Value::Long(5)),
            ("inner", Value::record([
                ("tags", Value::List(vec![Value::String("a".into()), Value::Null])),
            ])),
        ]));

        assert!(Value::from_json(&json!({"id": "5"}), schema.as_type()).is_err());
        assert!(Value::from_json(&json!({"nope": 1}), schema.as_type()).is_err());
    }

    #[test]
    fn builder_validates_each_step() {
        let schema = schema();

        let record = StructValueBuilder::for_schema(&schema)
            .set("id", Value::Long(1)).unwrap()
            .set_struct("inner", |inner| {
                inner.set("tags", Value::List(vec![Value::String("a".into())]))
            }).unwrap()
            .build().unwrap();
        record.check(schema.as_type()).unwrap();

        let result = StructValueBuilder::for_schema(&schema)
            .set_struct("id", |inner| Ok(inner));
        assert!(matches!(result, Err(NestcolError::SchemaMismatch { .. })));

        let result = StructValueBuilder::for_schema(&schema)
            .set("inner", Value::record([("tags", Value::Int(1))]));
        assert!(result.is_err());
    }

    #[test]
    fn missing_fields_equal_nulls() {
        let sparse = Value::record([("id", Value::Long(1))]);
        let full = Value::record([("id", Value::Long(1)), ("inner", Value::Null)]);
        assert_eq!(sparse, full);
        assert_eq!(full, sparse);

        let other = Value::record([("id", Value::Long(1)), ("inner", Value::List(vec![]))]);
        assert_ne!(sparse, other);
        assert_ne!(other, sparse);
        assert_ne!(Value::Null, Value::List(vec![]));
    }

    #[test]
    fn from_json_rejects_floats_out_of_range() {
        let r#type = SchemaType::Primitive(PrimitiveType::Float);

        assert_eq!(Value::from_json(&json!(1.5), &r#type).unwrap(), Value::Float(1.5));
        assert_eq!(Value::from_json(&json!(0.0), &r#type).unwrap(), Value::Float(0.0));
        assert!(Value::from_json(&json!(1e300), &r#type).is_err());
        assert!(Value::from_json(&json!(-1e300), &r#type).is_err());
        assert!(Value::from_json(&json!(1e-300), &r#type).is_err());
    }
}
