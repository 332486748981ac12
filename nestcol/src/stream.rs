//! Byte format of a single leaf column.
//!
//! A column stream starts with a fixed header followed by the entries:
//!
//! ```text
//! magic "NLST" | version u16 | convention u8 | primitive u8 | max_rep u8 | max_def u8
//! | entry_count u32 | entries...
//! ```
//!
//! Each entry is its repetition level and definition level as single bytes, followed
//! by the leaf value when the definition level is the column's maximum. Integers are
//! little-endian; strings and binaries are prefixed with their length as a `u32`.
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{NestcolResult, NestcolError, ListConvention};
use crate::levels::LevelEntry;
use crate::schema::{ColumnDescriptor, PrimitiveType};
use crate::value::Value;

pub const MAGIC: [u8; 4] = *b"NLST";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub convention: ListConvention,
    pub primitive_tag: u8,
    pub max_rep_level: u8,
    pub max_def_level: u8,
    pub entry_count: u32,
}

pub fn write_header(buf: &mut BytesMut, header: &StreamHeader) {
    buf.put_slice(&MAGIC);
    buf.put_u16_le(VERSION);
    buf.put_u8(header.convention.tag());
    buf.put_u8(header.primitive_tag);
    buf.put_u8(header.max_rep_level);
    buf.put_u8(header.max_def_level);
    buf.put_u32_le(header.entry_count);
}

pub fn read_header(buf: &mut &[u8]) -> NestcolResult<StreamHeader> {
    if buf.len() < HEADER_LEN {
        return Err(NestcolError::corrupt("column stream shorter than its header"));
    }

    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if magic != MAGIC {
        return Err(NestcolError::corrupt("bad magic"));
    }

    let version = buf.get_u16_le();
    if version != VERSION {
        return Err(NestcolError::corrupt(format!("unsupported version: {version}")));
    }

    let tag = buf.get_u8();
    let convention = ListConvention::from_tag(tag).ok_or_else(|| {
        NestcolError::corrupt(format!("unknown list convention tag {tag}"))
    })?;

    Ok(StreamHeader {
        convention,
        primitive_tag: buf.get_u8(),
        max_rep_level: buf.get_u8(),
        max_def_level: buf.get_u8(),
        entry_count: buf.get_u32_le(),
    })
}

/// Writes the entries of one column.
///
/// Levels are written as given, without checking them against the column; the
/// reader is the one enforcing the level protocol. An entry must carry a value of
/// the column's type exactly when its definition level is the column's maximum.
pub fn write_column(
    column: &ColumnDescriptor,
    convention: ListConvention,
    entries: &[LevelEntry]
) -> NestcolResult<Bytes> {
    let entry_count = u32::try_from(entries.len()).map_err(|_| {
        NestcolError::corrupt(format!("too many entries in column {}", column.path_string()))
    })?;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + entries.len() * 2);
    write_header(&mut buf, &StreamHeader {
        convention,
        primitive_tag: column.primitive().tag(),
        max_rep_level: column.max_rep_level(),
        max_def_level: column.max_def_level(),
        entry_count,
    });

    for (i, entry) in entries.iter().enumerate() {
        buf.put_u8(entry.rep);
        buf.put_u8(entry.def);
        match (&entry.value, entry.def == column.max_def_level()) {
            (Some(value), true) => write_value(&mut buf, column, value)?,
            (None, false) => {},
            (Some(_), false) => {
                return Err(NestcolError::corrupt(format!(
                    "entry {i} of column {} has a value below the maximum definition level",
                    column.path_string()
                )));
            },
            (None, true) => {
                return Err(NestcolError::corrupt(format!(
                    "entry {i} of column {} is missing its value",
                    column.path_string()
                )));
            },
        }
    }

    Ok(buf.freeze())
}

fn write_value(buf: &mut BytesMut, column: &ColumnDescriptor, value: &Value) -> NestcolResult<()> {
    match (column.primitive(), value) {
        (PrimitiveType::Boolean, Value::Boolean(b)) => buf.put_u8(u8::from(*b)),
        (PrimitiveType::Int, Value::Int(i)) => buf.put_i32_le(*i),
        (PrimitiveType::Long, Value::Long(l)) => buf.put_i64_le(*l),
        (PrimitiveType::Float, Value::Float(f)) => buf.put_f32_le(*f),
        (PrimitiveType::Double, Value::Double(d)) => buf.put_f64_le(*d),
        (PrimitiveType::String, Value::String(s)) => put_bytes(buf, column, s.as_bytes())?,
        (PrimitiveType::Binary, Value::Binary(b)) => put_bytes(buf, column, b)?,
        (primitive, value) => {
            return Err(NestcolError::mismatch(format!(
                "column {} holds {primitive} values, found {}",
                column.path_string(), value.kind()
            )));
        },
    }
    Ok(())
}

fn put_bytes(buf: &mut BytesMut, column: &ColumnDescriptor, bytes: &[u8]) -> NestcolResult<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        NestcolError::mismatch(format!("value too large for column {}", column.path_string()))
    })?;
    buf.put_u32_le(len);
    buf.put_slice(bytes);
    Ok(())
}

/// Reads back the entries of one column, validating them against the column and
/// the convention the reader expects.
///
/// # Errors
///
/// [`NestcolError::CorruptEncoding`] if the header does not describe this column,
/// the stream was written under another list convention, a level exceeds the
/// column's maximum, the first entry does not start a record, or the data is
/// truncated or has trailing bytes.
pub fn read_column(
    column: &ColumnDescriptor,
    convention: ListConvention,
    data: &[u8]
) -> NestcolResult<Vec<LevelEntry>> {
    let mut buf = data;
    let header = read_header(&mut buf)?;
    let path = column.path_string();

    if header.convention != convention {
        return Err(match convention {
            ListConvention::Legacy => NestcolError::corrupt(format!(
                "column {path} carries element definition levels of the standard list \
                 convention, which legacy streams can't have"
            )),
            ListConvention::Standard => NestcolError::corrupt(format!(
                "column {path} was written with the legacy list convention"
            )),
        });
    }
    if header.primitive_tag != column.primitive().tag() {
        return Err(NestcolError::corrupt(format!(
            "column {path} is not a stream of {} values", column.primitive()
        )));
    }
    if header.max_rep_level != column.max_rep_level()
        || header.max_def_level != column.max_def_level()
    {
        return Err(NestcolError::corrupt(format!(
            "column {path} has levels ({}, {}) but the schema expects ({}, {})",
            header.max_rep_level, header.max_def_level,
            column.max_rep_level(), column.max_def_level()
        )));
    }

    let entry_count = header.entry_count as usize;
    let mut entries = Vec::with_capacity(entry_count.min(buf.len() / 2));
    for i in 0..entry_count {
        need(&buf, 2, &path)?;
        let rep = buf.get_u8();
        let def = buf.get_u8();

        if rep > column.max_rep_level() {
            return Err(NestcolError::corrupt(format!(
                "entry {i} of column {path} has repetition level {rep}, \
                 deeper than the {} nested lists of the schema", column.max_rep_level()
            )));
        }
        if def > column.max_def_level() {
            return Err(NestcolError::corrupt(format!(
                "entry {i} of column {path} has definition level {def}, \
                 above the maximum of {}", column.max_def_level()
            )));
        }
        if i == 0 && rep != 0 {
            return Err(NestcolError::corrupt(format!(
                "column {path} starts with repetition level {rep} instead of a new record"
            )));
        }

        let value = if def == column.max_def_level() {
            Some(read_value(&mut buf, column.primitive(), &path)?)
        } else {
            None
        };
        entries.push(LevelEntry { rep, def, value });
    }

    if buf.has_remaining() {
        return Err(NestcolError::corrupt(format!(
            "{} trailing bytes after column {path}", buf.remaining()
        )));
    }

    Ok(entries)
}

fn need(buf: &&[u8], len: usize, path: &str) -> NestcolResult<()> {
    if buf.remaining() < len {
        return Err(NestcolError::corrupt(format!("column {path} is truncated")));
    }
    Ok(())
}

fn read_value(buf: &mut &[u8], primitive: PrimitiveType, path: &str) -> NestcolResult<Value> {
    Ok(match primitive {
        PrimitiveType::Boolean => {
            need(buf, 1, path)?;
            match buf.get_u8() {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                b => {
                    return Err(NestcolError::corrupt(format!(
                        "invalid boolean byte {b} in column {path}"
                    )));
                },
            }
        },
        PrimitiveType::Int => {
            need(buf, 4, path)?;
            Value::Int(buf.get_i32_le())
        },
        PrimitiveType::Long => {
            need(buf, 8, path)?;
            Value::Long(buf.get_i64_le())
        },
        PrimitiveType::Float => {
            need(buf, 4, path)?;
            Value::Float(buf.get_f32_le())
        },
        PrimitiveType::Double => {
            need(buf, 8, path)?;
            Value::Double(buf.get_f64_le())
        },
        PrimitiveType::String => {
            let bytes = get_bytes(buf, path)?;
            Value::String(String::from_utf8(bytes).map_err(|_| {
                NestcolError::corrupt(format!("invalid UTF-8 string in column {path}"))
            })?)
        },
        PrimitiveType::Binary => Value::Binary(get_bytes(buf, path)?),
    })
}

fn get_bytes(buf: &mut &[u8], path: &str) -> NestcolResult<Vec<u8>> {
    need(buf, 4, path)?;
    let len = buf.get_u32_le() as usize;
    need(buf, len, path)?;
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Schema, Field, ListType, SchemaType};

    fn string_lists() -> ColumnDescriptor {
        let schema = Schema::new(vec![
            Field::new(1, "tags", false, SchemaType::List(ListType::new(
                2, false, SchemaType::Primitive(PrimitiveType::String)
            ))),
        ]).unwrap();
        schema.columns(ListConvention::Standard).unwrap().remove(0)
    }

    fn entries() -> Vec<LevelEntry> {
        vec![
            LevelEntry::value(0, 3, Value::String("a".into())),
            LevelEntry::placeholder(1, 2),
            LevelEntry::value(1, 3, Value::String("ünï".into())),
            LevelEntry::placeholder(0, 0),
            LevelEntry::placeholder(0, 1),
        ]
    }

    #[test]
    fn header_layout() {
        let column = string_lists();
        let data = write_column(&column, ListConvention::Standard, &entries()).unwrap();

        assert_eq!(&data[..4], b"NLST");
        assert_eq!(&data[4..6], &1u16.to_le_bytes());
        assert_eq!(data[6], 1);
        assert_eq!(data[7], PrimitiveType::String.tag());
        assert_eq!((data[8], data[9]), (1, 3));
        assert_eq!(&data[10..14], &5u32.to_le_bytes());
        assert_eq!(&data[14..16], &[0, 3]);
        assert_eq!(&data[16..20], &1u32.to_le_bytes());
        assert_eq!(data[20], b'a');
    }

    #[test]
    fn read_back() {
        let column = string_lists();
        let data = write_column(&column, ListConvention::Standard, &entries()).unwrap();

        assert_eq!(read_column(&column, ListConvention::Standard, &data).unwrap(), entries());
    }

    #[test]
    fn rejects_other_convention() {
        let column = string_lists();
        let data = write_column(&column, ListConvention::Standard, &entries()).unwrap();

        assert!(matches!(
            read_column(&column, ListConvention::Legacy, &data),
            Err(NestcolError::CorruptEncoding { .. })
        ));
    }

    #[test]
    fn rejects_levels_above_maximum() {
        let column = string_lists();

        let data = write_column(&column, ListConvention::Standard, &[
            LevelEntry::placeholder(0, 2),
            LevelEntry::placeholder(5, 2),
        ]).unwrap();
        assert!(matches!(
            read_column(&column, ListConvention::Standard, &data),
            Err(NestcolError::CorruptEncoding { .. })
        ));

        let mut data = write_column(&column, ListConvention::Standard, &[
            LevelEntry::placeholder(0, 2),
        ]).unwrap().to_vec();
        data[HEADER_LEN + 1] = 9;
        assert!(read_column(&column, ListConvention::Standard, &data).is_err());
    }

    #[test]
    fn rejects_truncated_and_trailing_data() {
        let column = string_lists();
        let data = write_column(&column, ListConvention::Standard, &entries()).unwrap();

        for len in [0, 5, HEADER_LEN, data.len() - 1] {
            assert!(matches!(
                read_column(&column, ListConvention::Standard, &data[..len]),
                Err(NestcolError::CorruptEncoding { .. })
            ), "length {len}");
        }

        let mut longer = data.to_vec();
        longer.push(0);
        assert!(read_column(&column, ListConvention::Standard, &longer).is_err());
    }

    #[test]
    fn writer_requires_values_at_max_level() {
        let column = string_lists();

        assert!(write_column(&column, ListConvention::Standard, &[
            LevelEntry::placeholder(0, 3),
        ]).is_err());
        assert!(write_column(&column, ListConvention::Standard, &[
            LevelEntry::value(0, 1, Value::String("x".into())),
        ]).is_err());
        assert!(write_column(&column, ListConvention::Standard, &[
            LevelEntry::value(0, 3, Value::Int(1)),
        ]).is_err());
    }
}
