//! Encoding of records into column streams and back.
use std::collections::HashMap;

use bytes::Bytes;

use crate::{NestcolResult, NestcolError, ListConvention};
use crate::schema::{Schema, ColumnDescriptor};
use crate::value::Value;
use crate::levels::{LevelEntry, Shredder, Assembler};
use crate::stream::{write_column, read_column};

/// Option selecting the list convention by name, e.g. `legacy` or `3-level`.
pub const LIST_CONVENTION_OPTION: &str = "list-convention";

/// Boolean option selecting the legacy convention when `true`.
pub const WRITE_OLD_LIST_STRUCTURE_OPTION: &str = "write-old-list-structure";

const AVRO_WRITE_OLD_LIST_STRUCTURE_OPTION: &str = "parquet.avro.write-old-list-structure";

/// Environment variable read by [`NestedListEncoderBuilder::with_env_options`].
pub const LIST_CONVENTION_ENV: &str = "NESTCOL_LIST_CONVENTION";

/// The stream of one leaf column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedColumn {
    path: String,
    data: Bytes,
}

impl EncodedColumn {
    pub fn new(path: impl Into<String>, data: Bytes) -> Self {
        Self { path: path.into(), data }
    }

    /// Dotted physical path of the column.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// The column streams of a batch of records, one per leaf column in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedColumns {
    row_count: usize,
    columns: Vec<EncodedColumn>,
}

impl EncodedColumns {
    pub fn new(row_count: usize, columns: Vec<EncodedColumn>) -> Self {
        Self { row_count, columns }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn columns(&self) -> &[EncodedColumn] {
        &self.columns
    }

    pub fn column(&self, path: &str) -> Option<&EncodedColumn> {
        self.columns.iter().find(|c| c.path == path)
    }

    pub fn into_columns(self) -> Vec<EncodedColumn> {
        self.columns
    }
}

/// Encodes records of a schema into one stream per leaf column, using repetition
/// and definition levels to represent nested lists.
///
/// The list convention is fixed when the encoder is built, and streams must be
/// decoded with the convention they were encoded with.
///
/// # Examples
///
/// ```rust
/// use std::collections::HashMap;
/// use nestcol::{NestedListEncoder, ListConvention};
/// use nestcol::schema::{SchemaBuilder, SchemaType, PrimitiveType};
///
/// let mut builder = SchemaBuilder::new();
/// let ints = builder.new_list_type(SchemaType::Primitive(PrimitiveType::Int));
/// let field = builder.new_list_field("a", ints);
/// builder.add_field(field);
/// let schema = builder.build().unwrap();
///
/// let encoder = NestedListEncoder::builder(schema)
///     .with_options(HashMap::from([
///         ("write-old-list-structure".to_string(), "false".to_string()),
///     ]))
///     .build()
///     .unwrap();
///
/// assert_eq!(encoder.convention(), ListConvention::Standard);
/// ```
#[derive(Debug, Clone)]
pub struct NestedListEncoder {
    schema: Schema,
    convention: ListConvention,
    columns: Vec<ColumnDescriptor>,
}

impl NestedListEncoder {
    pub fn new(schema: Schema, convention: ListConvention) -> NestcolResult<Self> {
        Self::builder(schema).with_convention(convention).build()
    }

    pub fn builder(schema: Schema) -> NestedListEncoderBuilder {
        NestedListEncoderBuilder::new(schema)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn convention(&self) -> ListConvention {
        self.convention
    }

    /// The leaf columns produced by this encoder, in stream order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Shreds records into level entries without serializing them.
    pub fn shred(&self, records: &[Value]) -> NestcolResult<Vec<Vec<LevelEntry>>> {
        let mut shredder = Shredder::new(&self.schema, self.convention);
        for record in records {
            shredder.shred_record(record)?;
        }
        Ok(shredder.finish())
    }

    /// Encodes a single record.
    ///
    /// # Errors
    ///
    /// [`NestcolError::SchemaMismatch`] if the record does not conform to the schema,
    /// or holds a null list element under [`ListConvention::Legacy`]. Nothing is
    /// returned for a record that fails.
    pub fn encode(&self, record: &Value) -> NestcolResult<EncodedColumns> {
        self.encode_batch(std::slice::from_ref(record))
    }

    /// Encodes records as consecutive rows of the same column streams.
    pub fn encode_batch(&self, records: &[Value]) -> NestcolResult<EncodedColumns> {
        let levels = self.shred(records)?;

        let columns = self.columns.iter()
            .zip(levels.iter())
            .map(|(column, entries)| {
                Ok(EncodedColumn {
                    path: column.path_string(),
                    data: write_column(column, self.convention, entries)?,
                })
            })
            .collect::<NestcolResult<Vec<_>>>()?;

        tracing::trace!(
            rows = records.len(),
            columns = columns.len(),
            bytes = columns.iter().map(|c| c.data.len()).sum::<usize>(),
            "encoded batch"
        );

        Ok(EncodedColumns { row_count: records.len(), columns })
    }

    /// Decodes column streams holding exactly one record.
    pub fn decode(&self, encoded: &EncodedColumns) -> NestcolResult<Value> {
        let mut records = self.decode_batch(encoded)?;
        match records.len() {
            1 => Ok(records.remove(0)),
            count => Err(NestcolError::corrupt(format!(
                "expected a single record, found {count}"
            ))),
        }
    }

    /// Decodes every record of the column streams, in order.
    ///
    /// # Errors
    ///
    /// [`NestcolError::CorruptEncoding`] if the streams don't match this encoder's
    /// columns, were encoded under the other list convention, or violate the level
    /// protocol.
    pub fn decode_batch(&self, encoded: &EncodedColumns) -> NestcolResult<Vec<Value>> {
        let levels = self.read_levels(encoded)?;
        let records = Assembler::new(&self.schema, self.convention).assemble_records(&levels)?;

        if records.len() != encoded.row_count {
            return Err(NestcolError::corrupt(format!(
                "streams hold {} records, {} were announced", records.len(), encoded.row_count
            )));
        }

        tracing::trace!(rows = records.len(), "decoded batch");

        Ok(records)
    }

    /// Reads back the level entries of every column stream.
    pub fn read_levels(&self, encoded: &EncodedColumns) -> NestcolResult<Vec<Vec<LevelEntry>>> {
        if encoded.columns.len() != self.columns.len() {
            return Err(NestcolError::corrupt(format!(
                "expected {} column streams, found {}",
                self.columns.len(), encoded.columns.len()
            )));
        }

        self.columns.iter()
            .zip(encoded.columns.iter())
            .map(|(column, stream)| {
                let path = column.path_string();
                if stream.path != path {
                    return Err(NestcolError::corrupt(format!(
                        "expected stream for column {path}, found {}", stream.path
                    )));
                }
                read_column(column, self.convention, &stream.data)
            })
            .collect()
    }
}

/// Builds a [`NestedListEncoder`].
///
/// The convention is taken from, in order: [`with_convention`], the options, and
/// finally [`ListConvention::default`].
///
/// [`with_convention`]: NestedListEncoderBuilder::with_convention
pub struct NestedListEncoderBuilder {
    schema: Schema,
    convention: Option<ListConvention>,
    options: HashMap<String, String>,
}

impl NestedListEncoderBuilder {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            convention: None,
            options: HashMap::new(),
        }
    }

    pub fn with_convention(mut self, convention: ListConvention) -> Self {
        self.convention = Some(convention);
        self
    }

    /// Sets encoder options. Supported options:
    /// * `list-convention` - `legacy` (or `2-level`) / `standard` (or `3-level`)
    /// * `write-old-list-structure` - `true` selects the legacy convention, `false`
    ///   the standard one. Also accepted as `parquet.avro.write-old-list-structure`.
    ///
    /// Unknown options are ignored.
    pub fn with_options(mut self, options: HashMap<String, String>) -> Self {
        self.options.extend(options);
        self
    }

    /// Attempts to read options from environment variables.
    /// Currently supported environment variables:
    /// * `NESTCOL_LIST_CONVENTION` - same values as the `list-convention` option
    pub fn with_env_options(mut self) -> Self {
        if let Ok(value) = std::env::var(LIST_CONVENTION_ENV) {
            self.options.insert(LIST_CONVENTION_OPTION.to_string(), value);
        }
        self
    }

    /// Resolves the options and computes the leaf columns of the schema.
    ///
    /// # Errors
    ///
    /// [`NestcolError::InvalidOption`] if an option value can't be parsed or two
    /// options ask for different conventions. [`NestcolError::SchemaError`] if the
    /// schema is too deeply nested.
    pub fn build(self) -> NestcolResult<NestedListEncoder> {
        let from_options = convention_from_options(&self.options)?;
        let convention = self.convention.or(from_options).unwrap_or_default();
        let columns = self.schema.columns(convention)?;

        tracing::debug!(
            %convention,
            columns = columns.len(),
            list_depth = self.schema.list_depth(),
            "built nested list encoder"
        );

        Ok(NestedListEncoder {
            schema: self.schema,
            convention,
            columns,
        })
    }
}

fn convention_from_options(
    options: &HashMap<String, String>
) -> NestcolResult<Option<ListConvention>> {
    let mut keys = options.keys().collect::<Vec<_>>();
    keys.sort();

    let mut resolved: Option<ListConvention> = None;
    for key in keys {
        let value = &options[key];
        let convention = match key.as_str() {
            LIST_CONVENTION_OPTION => value.parse::<ListConvention>()?,
            WRITE_OLD_LIST_STRUCTURE_OPTION | AVRO_WRITE_OLD_LIST_STRUCTURE_OPTION => {
                match value.trim().to_ascii_lowercase().as_str() {
                    "true" => ListConvention::Legacy,
                    "false" => ListConvention::Standard,
                    _ => return Err(invalid_option(key, value)),
                }
            },
            _ => {
                tracing::warn!(option = %key, "ignoring unknown encoder option");
                continue;
            },
        };

        match resolved {
            Some(previous) if previous != convention => {
                return Err(invalid_option(key, value));
            },
            _ => resolved = Some(convention),
        }
    }

    Ok(resolved)
}

fn invalid_option(key: &str, value: &str) -> NestcolError {
    NestcolError::InvalidOption { key: key.to_string(), value: value.to_string() }
}

/// Encodes a single record with a one-off encoder.
pub fn encode(
    schema: &Schema,
    value: &Value,
    convention: ListConvention
) -> NestcolResult<EncodedColumns> {
    NestedListEncoder::new(schema.clone(), convention)?.encode(value)
}

/// Decodes a single record with a one-off encoder.
pub fn decode(
    schema: &Schema,
    encoded: &EncodedColumns,
    convention: ListConvention
) -> NestcolResult<Value> {
    NestedListEncoder::new(schema.clone(), convention)?.decode(encoded)
}
