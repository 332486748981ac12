//! Leaf columns of a schema and their repetition and definition levels.
use std::fmt::Write as _;

use crate::{NestcolResult, NestcolError, ListConvention};
use crate::schema::{Schema, SchemaType, PrimitiveType};

/// Describes one leaf column of a schema under a given [`ListConvention`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    path: Vec<String>,
    field_path: Vec<String>,
    primitive: PrimitiveType,
    max_rep_level: u8,
    max_def_level: u8,
}

impl ColumnDescriptor {
    /// Physical path of the column, including the names of the repeated nodes
    /// introduced by lists (`array` for legacy lists, `list.element` for standard
    /// ones).
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Dotted physical path, as printed by Parquet tools.
    pub fn path_string(&self) -> String {
        self.path.join(".")
    }

    /// Path made of the schema field names only.
    pub fn field_path(&self) -> &[String] {
        &self.field_path
    }

    pub fn primitive(&self) -> PrimitiveType {
        self.primitive
    }

    /// Number of lists enclosing the leaf.
    pub fn max_rep_level(&self) -> u8 {
        self.max_rep_level
    }

    /// Number of optional and repeated levels on the path to the leaf. An entry
    /// carries a value if and only if its definition level equals this.
    pub fn max_def_level(&self) -> u8 {
        self.max_def_level
    }
}

impl Schema {
    /// Returns the leaf columns of the schema, in depth-first field order.
    ///
    /// # Errors
    ///
    /// [`NestcolError::SchemaError`] if a level does not fit in a byte.
    pub fn columns(&self, convention: ListConvention) -> NestcolResult<Vec<ColumnDescriptor>> {
        let mut walker = ColumnWalker {
            convention,
            path: Vec::new(),
            field_path: Vec::new(),
            columns: Vec::new(),
        };
        walker.walk(self.as_type(), false, 0, 0)?;
        Ok(walker.columns)
    }

    /// Renders the schema as a Parquet message type using the list layout of the
    /// given convention.
    ///
    /// ```rust
    /// use nestcol::ListConvention;
    /// use nestcol::schema::{Schema, Field, PrimitiveType, ListType, SchemaType};
    ///
    /// let schema = Schema::new(vec![
    ///     Field::new(1, "tags", false, SchemaType::List(ListType::new(
    ///         2, true, SchemaType::Primitive(PrimitiveType::String)
    ///     ))),
    /// ]).unwrap();
    ///
    /// assert_eq!(schema.message_type(ListConvention::Legacy), "\
    /// message schema {
    ///   optional group tags (LIST) {
    ///     repeated binary array (UTF8);
    ///   }
    /// }
    /// ");
    /// ```
    pub fn message_type(&self, convention: ListConvention) -> String {
        let mut out = String::from("message schema {\n");
        for field in self.fields() {
            render_node(
                &mut out,
                1,
                repetition(field.required),
                &field.name,
                &field.r#type,
                convention
            );
        }
        out.push_str("}\n");
        out
    }
}

struct ColumnWalker {
    convention: ListConvention,
    path: Vec<String>,
    field_path: Vec<String>,
    columns: Vec<ColumnDescriptor>,
}

impl ColumnWalker {
    fn walk(
        &mut self,
        r#type: &SchemaType,
        nullable: bool,
        rep: usize,
        def: usize
    ) -> NestcolResult<()> {
        let def = if nullable { def + 1 } else { def };

        match r#type {
            SchemaType::Primitive(primitive) => {
                let level = |level: usize| u8::try_from(level).map_err(|_| {
                    NestcolError::schema(format!(
                        "column {} is nested too deeply", self.path.join(".")
                    ))
                });
                let column = ColumnDescriptor {
                    path: self.path.clone(),
                    field_path: self.field_path.clone(),
                    primitive: *primitive,
                    max_rep_level: level(rep)?,
                    max_def_level: level(def)?,
                };
                self.columns.push(column);
            },
            SchemaType::Struct(s) => {
                for field in s.fields() {
                    self.path.push(field.name.clone());
                    self.field_path.push(field.name.clone());
                    self.walk(&field.r#type, !field.required, rep, def)?;
                    self.path.pop();
                    self.field_path.pop();
                }
            },
            SchemaType::List(l) => {
                let element_nullable = self.convention.element_nullable(l.element_required());
                match self.convention {
                    ListConvention::Legacy => {
                        self.path.push("array".to_string());
                        self.walk(l.element_type(), element_nullable, rep + 1, def + 1)?;
                        self.path.pop();
                    },
                    ListConvention::Standard => {
                        self.path.push("list".to_string());
                        self.path.push("element".to_string());
                        self.walk(l.element_type(), element_nullable, rep + 1, def + 1)?;
                        self.path.pop();
                        self.path.pop();
                    },
                }
            },
        }

        Ok(())
    }
}

fn repetition(required: bool) -> &'static str {
    if required { "required" } else { "optional" }
}

fn render_node(
    out: &mut String,
    indent: usize,
    repetition: &str,
    name: &str,
    r#type: &SchemaType,
    convention: ListConvention
) {
    let pad = "  ".repeat(indent);
    match r#type {
        SchemaType::Primitive(primitive) => {
            let (physical, annotation) = primitive.parquet_type();
            let _ = match annotation {
                Some(annotation) => {
                    writeln!(out, "{pad}{repetition} {physical} {name} ({annotation});")
                },
                None => writeln!(out, "{pad}{repetition} {physical} {name};"),
            };
        },
        SchemaType::Struct(s) => {
            let _ = writeln!(out, "{pad}{repetition} group {name} {{");
            for field in s.fields() {
                render_node(
                    out,
                    indent + 1,
                    self::repetition(field.required),
                    &field.name,
                    &field.r#type,
                    convention
                );
            }
            let _ = writeln!(out, "{pad}}}");
        },
        SchemaType::List(l) => {
            let _ = writeln!(out, "{pad}{repetition} group {name} (LIST) {{");
            match convention {
                ListConvention::Legacy => {
                    render_node(out, indent + 1, "repeated", "array", l.element_type(), convention);
                },
                ListConvention::Standard => {
                    let inner = "  ".repeat(indent + 1);
                    let _ = writeln!(out, "{inner}repeated group list {{");
                    render_node(
                        out,
                        indent + 2,
                        self::repetition(l.element_required()),
                        "element",
                        l.element_type(),
                        convention
                    );
                    let _ = writeln!(out, "{inner}}}");
                },
            }
            let _ = writeln!(out, "{pad}}}");
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parquet::schema::parser::parse_message_type;
    use parquet::schema::types::SchemaDescriptor;

    use super::*;
    use crate::schema::{Field, ListType, StructType};

    fn nested_schema() -> Schema {
        Schema::new(vec![
            Field::new_struct(1, "first", true, vec![
                Field::new_struct(2, "second", true, vec![
                    Field::new(3, "a", true, SchemaType::List(ListType::new(
                        4,
                        true,
                        SchemaType::List(ListType::new(
                            5, true, SchemaType::Primitive(PrimitiveType::Int)
                        ))
                    )))
                ])
            ])
        ]).unwrap()
    }

    fn mixed_schema() -> Schema {
        Schema::new(vec![
            Field::new_primitive(1, "id", true, PrimitiveType::Long),
            Field::new(2, "users", false, SchemaType::List(ListType::new(
                3,
                false,
                SchemaType::Struct(StructType::new(vec![
                    Field::new_primitive(4, "name", false, PrimitiveType::String),
                    Field::new(5, "scores", true, SchemaType::List(ListType::new(
                        6, false, SchemaType::Primitive(PrimitiveType::Double)
                    ))),
                ]))
            ))),
        ]).unwrap()
    }

    fn levels(columns: &[ColumnDescriptor]) -> Vec<(String, u8, u8)> {
        columns.iter()
            .map(|c| (c.path_string(), c.max_rep_level(), c.max_def_level()))
            .collect()
    }

    #[test]
    fn legacy_list_of_lists() {
        let columns = nested_schema().columns(ListConvention::Legacy).unwrap();
        assert_eq!(levels(&columns), vec![
            ("first.second.a.array.array".to_string(), 2, 2)
        ]);
        assert_eq!(columns[0].field_path(), ["first", "second", "a"]);
    }

    #[test]
    fn standard_list_of_lists() {
        let columns = nested_schema().columns(ListConvention::Standard).unwrap();
        assert_eq!(levels(&columns), vec![
            ("first.second.a.list.element.list.element".to_string(), 2, 2)
        ]);
    }

    #[test]
    fn optional_elements_only_count_in_standard() {
        let legacy = mixed_schema().columns(ListConvention::Legacy).unwrap();
        assert_eq!(levels(&legacy), vec![
            ("id".to_string(), 0, 0),
            ("users.array.name".to_string(), 1, 3),
            ("users.array.scores.array".to_string(), 2, 3),
        ]);

        let standard = mixed_schema().columns(ListConvention::Standard).unwrap();
        assert_eq!(levels(&standard), vec![
            ("id".to_string(), 0, 0),
            ("users.list.element.name".to_string(), 1, 4),
            ("users.list.element.scores.list.element".to_string(), 2, 5),
        ]);
    }

    #[test]
    fn legacy_message_type() {
        assert_eq!(nested_schema().message_type(ListConvention::Legacy), "\
message schema {
  required group first {
    required group second {
      required group a (LIST) {
        repeated group array (LIST) {
          repeated int32 array;
        }
      }
    }
  }
}
");
    }

    /// The levels computed here must agree with the parquet crate's own
    /// computation over the rendered message type.
    #[test]
    fn levels_agree_with_parquet() {
        for schema in [nested_schema(), mixed_schema()] {
            for convention in [ListConvention::Legacy, ListConvention::Standard] {
                let message = schema.message_type(convention);
                let descriptor = SchemaDescriptor::new(Arc::new(
                    parse_message_type(&message).unwrap()
                ));
                let columns = schema.columns(convention).unwrap();

                assert_eq!(descriptor.num_columns(), columns.len());
                for (i, column) in columns.iter().enumerate() {
                    let parquet_column = descriptor.column(i);
                    assert_eq!(parquet_column.path().string(), column.path_string());
                    assert_eq!(parquet_column.max_rep_level(), i16::from(column.max_rep_level()));
                    assert_eq!(parquet_column.max_def_level(), i16::from(column.max_def_level()));
                }
            }
        }
    }
}
