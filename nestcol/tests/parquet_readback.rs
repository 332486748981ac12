//! Parquet files written with both list conventions, read back through the
//! `parquet` crate's own record reader.
use std::fs::File;

use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::{Field as ParquetField, Row};

use nestcol::{NestedListEncoder, ListConvention};
use nestcol::schema::{Schema, Field, ListType, PrimitiveType, SchemaType, StructType};
use nestcol::value::Value;
use nestcol::writer::ParquetListWriter;

fn row_value(row: &Row) -> Value {
    Value::record(row.get_column_iter().map(|(name, field)| (name.clone(), field_value(field))))
}

fn field_value(field: &ParquetField) -> Value {
    match field {
        ParquetField::Null => Value::Null,
        ParquetField::Int(i) => Value::Int(*i),
        ParquetField::Long(l) => Value::Long(*l),
        ParquetField::Group(row) => row_value(row),
        ParquetField::ListInternal(list) => {
            Value::List(list.elements().iter().map(field_value).collect())
        },
        other => panic!("unexpected field {other}"),
    }
}

fn write_and_read(encoder: NestedListEncoder, records: &[Value]) -> Vec<Value> {
    let file = tempfile::tempfile().unwrap();
    let mut writer = ParquetListWriter::try_new(file.try_clone().unwrap(), encoder, None)
        .unwrap()
        .with_row_group_size(2);
    for record in records {
        writer.write(record).unwrap();
    }
    let metadata = writer.close().unwrap();
    assert_eq!(metadata.num_rows, records.len() as i64);

    read_rows(file)
}

fn read_rows(file: File) -> Vec<Value> {
    let reader = SerializedFileReader::new(file).unwrap();
    reader.get_row_iter(None)
        .unwrap()
        .map(|row| row_value(&row.unwrap()))
        .collect()
}

fn ints(values: &[Option<i32>]) -> Value {
    Value::List(values.iter().map(|v| v.map_or(Value::Null, Value::Int)).collect())
}

/// `id` and an optional list of lists of ints.
fn schema(nullable_elements: bool) -> Schema {
    Schema::new(vec![
        Field::new_primitive(1, "id", true, PrimitiveType::Long),
        Field::new(2, "lists", false, SchemaType::List(ListType::new(
            3,
            !nullable_elements,
            SchemaType::List(ListType::new(
                4,
                !nullable_elements,
                SchemaType::Primitive(PrimitiveType::Int)
            ))
        ))),
    ]).unwrap()
}

fn record(id: i64, lists: Value) -> Value {
    Value::record([("id", Value::Long(id)), ("lists", lists)])
}

#[test]
fn legacy_lists_read_back() {
    let encoder = NestedListEncoder::new(schema(false), ListConvention::Legacy).unwrap();
    let records = vec![
        record(1, Value::List(vec![ints(&[Some(1), Some(2)]), ints(&[Some(3), Some(4)])])),
        record(2, Value::List(vec![ints(&[Some(5)]), ints(&[])])),
        record(3, Value::Null),
        record(4, Value::List(vec![])),
        record(5, Value::List(vec![ints(&[])])),
    ];

    assert_eq!(write_and_read(encoder, &records), records);
}

#[test]
fn standard_lists_read_back() {
    let encoder = NestedListEncoder::new(schema(true), ListConvention::Standard).unwrap();
    let records = vec![
        record(1, Value::List(vec![ints(&[Some(1), Some(2)]), ints(&[Some(3), Some(4)])])),
        record(2, Value::List(vec![ints(&[Some(5), None]), ints(&[]), Value::Null])),
        record(3, Value::Null),
        record(4, Value::List(vec![])),
        record(5, Value::List(vec![Value::Null, ints(&[None])])),
    ];

    assert_eq!(write_and_read(encoder, &records), records);
}

#[test]
fn old_style_fixture_reads_back() {
    let schema = Schema::new(vec![
        Field::new(1, "first", true, SchemaType::Struct(StructType::new(vec![
            Field::new(2, "second", true, SchemaType::Struct(StructType::new(vec![
                Field::new(3, "a", true, SchemaType::List(ListType::new(
                    4,
                    true,
                    SchemaType::List(ListType::new(5, true, SchemaType::Primitive(PrimitiveType::Int)))
                ))),
            ]))),
        ]))),
    ]).unwrap();
    let encoder = NestedListEncoder::new(schema, ListConvention::Legacy).unwrap();

    let records = [[[1, 2], [3, 4]], [[5, 6], [7, 8]], [[9, 10], [11, 12]]]
        .iter()
        .map(|lists| {
            let a = lists.iter()
                .map(|list| ints(&list.map(Some)))
                .collect();
            Value::record([
                ("first", Value::record([
                    ("second", Value::record([("a", Value::List(a))])),
                ])),
            ])
        })
        .collect::<Vec<_>>();

    assert_eq!(write_and_read(encoder, &records), records);
}
