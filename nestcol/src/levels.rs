//! Shredding of values into leaf columns of repetition and definition levels, and
//! assembly of those columns back into values.
//!
//! Every leaf column receives one [`LevelEntry`] per leaf value and one
//! placeholder entry for every empty list or absent optional value above the leaf.
//! The repetition level of an entry is the depth of the list a new element starts
//! in (0 starts a new record). The definition level counts how many optional and
//! repeated levels on the path to the leaf are present; an entry carries a value
//! exactly when its definition level is the column's maximum.
use std::collections::HashMap;

use crate::{NestcolResult, NestcolError, ListConvention};
use crate::schema::{Schema, SchemaType};
use crate::value::{Value, check_known_fields};

/// A single position in a leaf column.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelEntry {
    pub rep: u8,
    pub def: u8,
    pub value: Option<Value>,
}

impl LevelEntry {
    pub fn value(rep: u8, def: u8, value: Value) -> Self {
        Self { rep, def, value: Some(value) }
    }

    /// An entry carrying only levels, for an empty list or an absent value.
    pub fn placeholder(rep: u8, def: u8) -> Self {
        Self { rep, def, value: None }
    }
}

/// Number of leaf columns below a type.
pub(crate) fn leaf_count(r#type: &SchemaType) -> usize {
    match r#type {
        SchemaType::Primitive(_) => 1,
        SchemaType::Struct(s) => s.fields().iter().map(|f| leaf_count(&f.r#type)).sum(),
        SchemaType::List(l) => leaf_count(l.element_type()),
    }
}

/// Splits records into per-column level entries.
///
/// Records are appended in the order they are given. A record that fails to shred
/// leaves the columns as they were before it.
pub(crate) struct Shredder<'a> {
    schema: &'a Schema,
    convention: ListConvention,
    columns: Vec<Vec<LevelEntry>>,
    records: usize,
}

impl<'a> Shredder<'a> {
    pub(crate) fn new(schema: &'a Schema, convention: ListConvention) -> Self {
        Self {
            schema,
            convention,
            columns: vec![Vec::new(); leaf_count(schema.as_type())],
            records: 0,
        }
    }

    /// Shreds one record, which must be a [`Value::Struct`] conforming to the schema.
    ///
    /// # Errors
    ///
    /// [`NestcolError::SchemaMismatch`] if the record does not match the schema, or
    /// holds a null list element while using [`ListConvention::Legacy`].
    pub(crate) fn shred_record(&mut self, record: &Value) -> NestcolResult<()> {
        let marks = self.columns.iter().map(Vec::len).collect::<Vec<_>>();

        let schema = self.schema;
        let result = shred(
            self.convention,
            schema.as_type(),
            false,
            Some(record),
            Levels { rep: 0, def: 0, depth: 0 },
            "<root>",
            &mut self.columns[..]
        );

        match result {
            Ok(()) => {
                self.records += 1;
                Ok(())
            },
            Err(e) => {
                for (column, mark) in self.columns.iter_mut().zip(marks) {
                    column.truncate(mark);
                }
                Err(e)
            }
        }
    }

    /// Number of records shredded so far.
    pub(crate) fn records(&self) -> usize {
        self.records
    }

    pub(crate) fn finish(self) -> Vec<Vec<LevelEntry>> {
        self.columns
    }
}

fn shred(
    convention: ListConvention,
    r#type: &SchemaType,
    nullable: bool,
    value: Option<&Value>,
    levels: Levels,
    path: &str,
    out: &mut [Vec<LevelEntry>]
) -> NestcolResult<()> {
    let value = match value {
        None | Some(Value::Null) => {
            if !nullable {
                return Err(NestcolError::mismatch(format!(
                    "required value at '{path}' is null"
                )));
            }
            push_placeholder(out, levels.rep, levels.def);
            return Ok(());
        },
        Some(value) => value,
    };

    let levels = if nullable { levels.defined() } else { levels };

    match (r#type, value) {
        (SchemaType::Primitive(primitive), value) => {
            if value.primitive_type() != Some(*primitive) {
                return Err(NestcolError::mismatch(format!(
                    "expected {primitive} at '{path}', found {}", value.kind()
                )));
            }
            out[0].push(LevelEntry::value(levels.rep, levels.def, value.clone()));
        },
        (SchemaType::Struct(s), Value::Struct(fields)) => {
            check_known_fields(s, fields, path)?;

            let mut offset = 0;
            for field in s.fields() {
                let width = leaf_count(&field.r#type);
                shred(
                    convention,
                    &field.r#type,
                    !field.required,
                    fields.get(&field.name),
                    levels,
                    &format!("{path}.{}", field.name),
                    &mut out[offset..offset + width]
                )?;
                offset += width;
            }
        },
        (SchemaType::List(l), Value::List(items)) => {
            if items.is_empty() {
                push_placeholder(out, levels.rep, levels.def);
                return Ok(());
            }

            let element_nullable = convention.element_nullable(l.element_required());
            let nested = levels.nested();
            for (i, item) in items.iter().enumerate() {
                if item.is_null() && !element_nullable {
                    return Err(match convention {
                        ListConvention::Legacy => NestcolError::mismatch(format!(
                            "null list element at '{path}[{i}]' can't be written \
                             with the legacy list convention"
                        )),
                        ListConvention::Standard => NestcolError::mismatch(format!(
                            "required list element at '{path}[{i}]' is null"
                        )),
                    });
                }

                // Only the first element continues the enclosing list.
                let element_levels = if i == 0 { nested } else { nested.repeated() };
                shred(
                    convention,
                    l.element_type(),
                    element_nullable,
                    Some(item),
                    element_levels,
                    &format!("{path}[{i}]"),
                    out
                )?;
            }
        },
        (r#type, value) => {
            return Err(NestcolError::mismatch(format!(
                "expected {} at '{path}', found {}", r#type, value.kind()
            )));
        },
    }

    Ok(())
}

/// Levels at a node while walking the schema.
/// Levels never exceed the column maxima, which `Schema::columns` bounds to a byte.
#[derive(Debug, Clone, Copy)]
struct Levels {
    /// Repetition level for the next entry emitted below this node.
    rep: u8,
    /// Definition level reached at this node.
    def: u8,
    /// Number of enclosing lists.
    depth: u8,
}

impl Levels {
    fn defined(self) -> Self {
        Self { def: self.def + 1, ..self }
    }

    /// Levels of the first element of a list.
    fn nested(self) -> Self {
        Self { rep: self.rep, def: self.def + 1, depth: self.depth + 1 }
    }

    /// Levels of any following element of the same list.
    fn repeated(self) -> Self {
        Self { rep: self.depth, ..self }
    }
}

fn push_placeholder(out: &mut [Vec<LevelEntry>], rep: u8, def: u8) {
    for column in out {
        column.push(LevelEntry::placeholder(rep, def));
    }
}

/// Rebuilds records from per-column level entries.
pub(crate) struct Assembler<'a> {
    schema: &'a Schema,
    convention: ListConvention,
}

impl<'a> Assembler<'a> {
    pub(crate) fn new(schema: &'a Schema, convention: ListConvention) -> Self {
        Self { schema, convention }
    }

    /// Assembles every record found in `columns`, in order.
    ///
    /// # Errors
    ///
    /// [`NestcolError::CorruptEncoding`] if the entries don't describe values of the
    /// schema: wrong number of columns, columns disagreeing on the number of records
    /// or list elements, or levels that can't occur at their position.
    pub(crate) fn assemble_records(&self, columns: &[Vec<LevelEntry>]) -> NestcolResult<Vec<Value>> {
        let expected = leaf_count(self.schema.as_type());
        if columns.len() != expected {
            return Err(NestcolError::corrupt(format!(
                "expected {expected} columns, found {}", columns.len()
            )));
        }

        let rows = columns.iter()
            .map(|column| split_at_rep(column, 0))
            .collect::<NestcolResult<Vec<_>>>()?;

        let record_count = rows[0].len();
        if let Some((i, column)) = rows.iter().enumerate().find(|(_, c)| c.len() != record_count) {
            return Err(NestcolError::corrupt(format!(
                "column {i} holds {} records, column 0 holds {record_count}", column.len()
            )));
        }

        (0..record_count)
            .map(|r| {
                let slices = rows.iter().map(|column| column[r]).collect::<Vec<_>>();
                self.assemble(self.schema.as_type(), false, &slices, 0, 0)
            })
            .collect()
    }

    fn assemble(
        &self,
        r#type: &SchemaType,
        nullable: bool,
        slices: &[&[LevelEntry]],
        def: u8,
        depth: u8
    ) -> NestcolResult<Value> {
        let mut def = def;
        if nullable {
            if first_def(slices) <= def {
                expect_placeholder(slices, def)?;
                return Ok(Value::Null);
            }
            def += 1;
        }

        match r#type {
            SchemaType::Primitive(primitive) => {
                let entry = match slices {
                    [[entry]] => entry,
                    [slice] => {
                        return Err(NestcolError::corrupt(format!(
                            "expected a single entry for a {primitive} value, found {}",
                            slice.len()
                        )));
                    },
                    _ => unreachable!("a primitive has exactly one column"),
                };
                match &entry.value {
                    Some(value) if entry.def == def => Ok(value.clone()),
                    _ => Err(NestcolError::corrupt(format!(
                        "entry with definition level {} where a {primitive} value \
                         at level {def} was expected", entry.def
                    ))),
                }
            },
            SchemaType::Struct(s) => {
                let mut fields = HashMap::with_capacity(s.fields().len());
                let mut offset = 0;
                for field in s.fields() {
                    let width = leaf_count(&field.r#type);
                    let value = self.assemble(
                        &field.r#type,
                        !field.required,
                        &slices[offset..offset + width],
                        def,
                        depth
                    )?;
                    fields.insert(field.name.clone(), value);
                    offset += width;
                }
                Ok(Value::Struct(fields))
            },
            SchemaType::List(l) => {
                if first_def(slices) <= def {
                    expect_placeholder(slices, def)?;
                    return Ok(Value::List(Vec::new()));
                }

                let depth = depth + 1;
                let elements = slices.iter()
                    .map(|slice| split_at_rep(slice, depth))
                    .collect::<NestcolResult<Vec<_>>>()?;

                let count = elements[0].len();
                if elements.iter().any(|column| column.len() != count) {
                    return Err(NestcolError::corrupt(format!(
                        "columns disagree on the number of elements of a list at depth {depth}"
                    )));
                }

                let element_nullable = self.convention.element_nullable(l.element_required());
                let items = (0..count)
                    .map(|k| {
                        let element = elements.iter().map(|column| column[k]).collect::<Vec<_>>();
                        self.assemble(l.element_type(), element_nullable, &element, def + 1, depth)
                    })
                    .collect::<NestcolResult<Vec<_>>>()?;

                Ok(Value::List(items))
            },
        }
    }
}

fn first_def(slices: &[&[LevelEntry]]) -> u8 {
    slices[0][0].def
}

/// Checks that every column holds exactly one placeholder at `def` for an absent
/// value or an empty list.
fn expect_placeholder(slices: &[&[LevelEntry]], def: u8) -> NestcolResult<()> {
    for slice in slices {
        match slice {
            [entry] if entry.def == def && entry.value.is_none() => {},
            [entry] => {
                return Err(NestcolError::corrupt(format!(
                    "expected a placeholder at definition level {def}, found level {}",
                    entry.def
                )));
            },
            _ => {
                return Err(NestcolError::corrupt(format!(
                    "{} entries below an absent value or empty list at definition level {def}",
                    slice.len()
                )));
            },
        }
    }
    Ok(())
}

/// Splits entries into runs, each starting at an entry whose repetition level is
/// `rep`. Inside a list at depth `rep`, no following entry may have a lower level.
fn split_at_rep(entries: &[LevelEntry], rep: u8) -> NestcolResult<Vec<&[LevelEntry]>> {
    let mut runs = Vec::new();
    let mut start = 0;

    for (i, entry) in entries.iter().enumerate() {
        if i == 0 {
            if rep == 0 && entry.rep != 0 {
                return Err(NestcolError::corrupt(format!(
                    "column starts with repetition level {} instead of a new record",
                    entry.rep
                )));
            }
            continue;
        }
        if entry.rep < rep {
            return Err(NestcolError::corrupt(format!(
                "repetition level {} inside a list at depth {rep}", entry.rep
            )));
        }
        if entry.rep == rep {
            runs.push(&entries[start..i]);
            start = i;
        }
    }

    if !entries.is_empty() {
        runs.push(&entries[start..]);
    }

    Ok(runs)
}
