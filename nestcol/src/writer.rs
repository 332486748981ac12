//! Writer interface to append records with nested lists to a Parquet file.
//!
//! Records are shredded as they are written and the buffered level entries are
//! written as one row group at every flush, with one column chunk per leaf column.
use std::io::Write;
use std::sync::Arc;

use parquet::column::writer::{ColumnWriter, ColumnWriterImpl};
use parquet::data_type::{ByteArray, DataType};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;

use crate::{NestcolResult, NestcolError, NestedListEncoder};
use crate::schema::ColumnDescriptor;
use crate::levels::LevelEntry;
use crate::value::Value;

const DEFAULT_ROW_GROUP_SIZE: usize = 1024;

/// Writes records to a Parquet file, laying out lists with the encoder's
/// [`ListConvention`](crate::ListConvention).
///
/// # Examples
///
/// ```rust
/// use nestcol::{NestedListEncoder, ListConvention};
/// use nestcol::schema::{SchemaBuilder, SchemaType, PrimitiveType};
/// use nestcol::value::Value;
/// use nestcol::writer::ParquetListWriter;
///
/// let mut builder = SchemaBuilder::new();
/// let field = builder.new_list_field("a", SchemaType::Primitive(PrimitiveType::Int));
/// builder.add_field(field);
/// let encoder = NestedListEncoder::new(builder.build().unwrap(), ListConvention::Legacy).unwrap();
///
/// let mut writer = ParquetListWriter::try_new(Vec::new(), encoder, None).unwrap();
/// writer.write(&Value::record([("a", Value::List(vec![Value::Int(1)]))])).unwrap();
/// let metadata = writer.close().unwrap();
/// assert_eq!(metadata.num_rows, 1);
/// ```
pub struct ParquetListWriter<W: Write + Send> {
    writer: SerializedFileWriter<W>,
    encoder: NestedListEncoder,
    // Level entries of the records written since the last flush, per leaf column.
    pending: Vec<Vec<LevelEntry>>,
    pending_rows: usize,
    row_group_size: usize,
    rows_written: usize,
}

impl<W: Write + Send> ParquetListWriter<W> {
    /// Creates a writer for the schema and list convention of `encoder`.
    ///
    /// Without explicit properties, data is written uncompressed with plain encoding
    /// and no dictionary.
    pub fn try_new(
        inner: W,
        encoder: NestedListEncoder,
        props: Option<WriterProperties>
    ) -> NestcolResult<Self> {
        let message_type = encoder.schema().message_type(encoder.convention());
        let file_schema = parse_message_type(&message_type)?;

        let props = props.unwrap_or_else(|| {
            WriterProperties::builder()
                .set_compression(parquet::basic::Compression::UNCOMPRESSED)
                .set_dictionary_enabled(false)
                .set_encoding(parquet::basic::Encoding::PLAIN)
                .build()
        });

        let writer = SerializedFileWriter::new(inner, Arc::new(file_schema), Arc::new(props))?;

        Ok(Self {
            writer,
            pending: vec![Vec::new(); encoder.columns().len()],
            encoder,
            pending_rows: 0,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            rows_written: 0,
        })
    }

    /// Sets the number of records buffered before a row group is written.
    pub fn with_row_group_size(mut self, row_group_size: usize) -> Self {
        self.row_group_size = row_group_size.max(1);
        self
    }

    pub fn encoder(&self) -> &NestedListEncoder {
        &self.encoder
    }

    /// Number of records written to the file so far, not counting buffered ones.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Appends a record, flushing a row group once enough records are buffered.
    ///
    /// # Errors
    ///
    /// [`NestcolError::SchemaMismatch`] if the record does not conform to the schema.
    /// The writer is left unchanged in that case.
    pub fn write(&mut self, record: &Value) -> NestcolResult<()> {
        let levels = self.encoder.shred(std::slice::from_ref(record))?;
        for (pending, entries) in self.pending.iter_mut().zip(levels) {
            pending.extend(entries);
        }
        self.pending_rows += 1;

        if self.pending_rows >= self.row_group_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes the buffered records as a row group. Does nothing without any.
    ///
    /// # Errors
    ///
    /// On failure the buffered records are kept, but the underlying file may hold
    /// a partial row group, so the writer should not be used any further.
    pub fn flush(&mut self) -> NestcolResult<()> {
        if self.pending_rows == 0 {
            return Ok(());
        }

        let mut row_group = self.writer.next_row_group()?;
        for (column, entries) in self.encoder.columns().iter().zip(self.pending.iter()) {
            let mut column_writer = row_group.next_column()?.ok_or_else(|| {
                NestcolError::schema(format!(
                    "file schema has no column for {}", column.path_string()
                ))
            })?;

            match column_writer.untyped() {
                ColumnWriter::BoolColumnWriter(w) => write_leaf(w, column, entries, |v| {
                    match v { Value::Boolean(b) => Some(*b), _ => None }
                })?,
                ColumnWriter::Int32ColumnWriter(w) => write_leaf(w, column, entries, |v| {
                    match v { Value::Int(i) => Some(*i), _ => None }
                })?,
                ColumnWriter::Int64ColumnWriter(w) => write_leaf(w, column, entries, |v| {
                    match v { Value::Long(l) => Some(*l), _ => None }
                })?,
                ColumnWriter::FloatColumnWriter(w) => write_leaf(w, column, entries, |v| {
                    match v { Value::Float(f) => Some(*f), _ => None }
                })?,
                ColumnWriter::DoubleColumnWriter(w) => write_leaf(w, column, entries, |v| {
                    match v { Value::Double(d) => Some(*d), _ => None }
                })?,
                ColumnWriter::ByteArrayColumnWriter(w) => write_leaf(w, column, entries, |v| {
                    match v {
                        Value::String(s) => Some(ByteArray::from(s.as_bytes().to_vec())),
                        Value::Binary(b) => Some(ByteArray::from(b.clone())),
                        _ => None,
                    }
                })?,
                _ => {
                    return Err(NestcolError::schema(format!(
                        "unexpected physical type for column {}", column.path_string()
                    )));
                },
            }

            column_writer.close()?;
        }

        let metadata = row_group.close()?;
        self.rows_written += self.pending_rows;
        for entries in &mut self.pending {
            entries.clear();
        }

        tracing::debug!(
            rows = self.pending_rows,
            columns = self.encoder.columns().len(),
            bytes = metadata.total_byte_size(),
            "flushed row group"
        );

        self.pending_rows = 0;
        Ok(())
    }

    /// Flushes the buffered records and writes the file footer.
    pub fn close(mut self) -> NestcolResult<parquet::format::FileMetaData> {
        self.flush()?;
        Ok(self.writer.close()?)
    }
}

fn write_leaf<T: DataType>(
    writer: &mut ColumnWriterImpl<'_, T>,
    column: &ColumnDescriptor,
    entries: &[LevelEntry],
    convert: impl Fn(&Value) -> Option<T::T>
) -> NestcolResult<()> {
    let values = entries.iter()
        .filter_map(|entry| entry.value.as_ref())
        .map(|value| convert(value).ok_or_else(|| {
            NestcolError::mismatch(format!(
                "column {} holds {} values, found {}",
                column.path_string(), column.primitive(), value.kind()
            ))
        }))
        .collect::<NestcolResult<Vec<_>>>()?;

    // Levels are omitted for columns where they are always zero.
    let def_levels = (column.max_def_level() > 0)
        .then(|| entries.iter().map(|e| i16::from(e.def)).collect::<Vec<_>>());
    let rep_levels = (column.max_rep_level() > 0)
        .then(|| entries.iter().map(|e| i16::from(e.rep)).collect::<Vec<_>>());

    writer.write_batch(values.as_slice(), def_levels.as_deref(), rep_levels.as_deref())?;
    Ok(())
}
