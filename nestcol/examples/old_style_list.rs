use nestcol::{NestedListEncoder, NestcolResult};
use nestcol::schema::{SchemaBuilder, SchemaType, PrimitiveType};
use nestcol::value::Value;
use nestcol::writer::ParquetListWriter;

static DEFAULT_OUTPUT_PATH: &str = "old-style-list.parquet";

fn ints(values: &[i32]) -> Value {
    Value::List(values.iter().map(|v| Value::Int(*v)).collect())
}

/// Builds `{first: {second: {a: [[x, x+1], [x+2, x+3]]}}}`.
fn record(start: i32) -> Value {
    Value::record([
        ("first", Value::record([
            ("second", Value::record([
                ("a", Value::List(vec![
                    ints(&[start, start + 1]),
                    ints(&[start + 2, start + 3]),
                ])),
            ])),
        ])),
    ])
}

fn main() -> NestcolResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let schema_builder = SchemaBuilder::new();
    let inner = schema_builder.new_list_type(SchemaType::Primitive(PrimitiveType::Int));
    let a = schema_builder.new_list_field("a", inner);
    let second = schema_builder.new_struct_field("second", vec![a]);
    let first = schema_builder.new_struct_field("first", vec![second]);

    let mut schema_builder = schema_builder;
    schema_builder.add_field(first);
    let schema = schema_builder.build()?;

    // Legacy unless overridden with NESTCOL_LIST_CONVENTION.
    let encoder = NestedListEncoder::builder(schema)
        .with_env_options()
        .build()?;

    println!("{}", encoder.schema().message_type(encoder.convention()));

    let path = std::env::args().nth(1).unwrap_or(DEFAULT_OUTPUT_PATH.to_string());
    let file = std::fs::File::create(&path)?;

    let mut writer = ParquetListWriter::try_new(file, encoder, None)?;
    for start in [1, 5, 9] {
        writer.write(&record(start))?;
    }
    let metadata = writer.close()?;

    println!("Wrote {} records to {}", metadata.num_rows, path);

    Ok(())
}
