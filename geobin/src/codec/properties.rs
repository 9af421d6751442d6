//! Attribute values and the property blob codec.
//!
//! A property blob is a run of `(u16 column index, value)` pairs. Only set
//! columns are written; the column type from the layer schema decides how
//! many bytes a value occupies.

use std::fmt::{self, Display};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::le::{ByteReader, ByteWriter};
use crate::codec::Projection;
use crate::errors::{GeobinError, GeobinResult};
use crate::header::Column;

/// Longest DateTime text accepted on read.
pub const MAX_DATETIME_LEN: usize = 32;

/// Attribute type tag stored in the column schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum ColumnType {
    Byte = 0,
    UByte = 1,
    Bool = 2,
    Short = 3,
    UShort = 4,
    Int = 5,
    UInt = 6,
    Long = 7,
    ULong = 8,
    Float = 9,
    Double = 10,
    String = 11,
    Json = 12,
    DateTime = 13,
    Binary = 14,
}

impl ColumnType {
    /// Byte width of a fixed-size value, `None` for length-prefixed types.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            ColumnType::Byte | ColumnType::UByte | ColumnType::Bool => Some(1),
            ColumnType::Short | ColumnType::UShort => Some(2),
            ColumnType::Int | ColumnType::UInt | ColumnType::Float => Some(4),
            ColumnType::Long | ColumnType::ULong | ColumnType::Double => Some(8),
            ColumnType::String | ColumnType::Json | ColumnType::DateTime | ColumnType::Binary => {
                None
            }
        }
    }

    pub fn is_variable(&self) -> bool {
        self.fixed_width().is_none()
    }
}

impl TryFrom<u8> for ColumnType {
    type Error = String;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => ColumnType::Byte,
            1 => ColumnType::UByte,
            2 => ColumnType::Bool,
            3 => ColumnType::Short,
            4 => ColumnType::UShort,
            5 => ColumnType::Int,
            6 => ColumnType::UInt,
            7 => ColumnType::Long,
            8 => ColumnType::ULong,
            9 => ColumnType::Float,
            10 => ColumnType::Double,
            11 => ColumnType::String,
            12 => ColumnType::Json,
            13 => ColumnType::DateTime,
            14 => ColumnType::Binary,
            other => return Err(format!("unknown column type tag {}", other)),
        })
    }
}

impl From<ColumnType> for u8 {
    fn from(ty: ColumnType) -> u8 {
        ty as u8
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Byte(i8),
    UByte(u8),
    Bool(bool),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    String(String),
    Json(String),
    DateTime(DateTime<FixedOffset>),
    Binary(Vec<u8>),
}

impl ColumnValue {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValue::Byte(_) => ColumnType::Byte,
            ColumnValue::UByte(_) => ColumnType::UByte,
            ColumnValue::Bool(_) => ColumnType::Bool,
            ColumnValue::Short(_) => ColumnType::Short,
            ColumnValue::UShort(_) => ColumnType::UShort,
            ColumnValue::Int(_) => ColumnType::Int,
            ColumnValue::UInt(_) => ColumnType::UInt,
            ColumnValue::Long(_) => ColumnType::Long,
            ColumnValue::ULong(_) => ColumnType::ULong,
            ColumnValue::Float(_) => ColumnType::Float,
            ColumnValue::Double(_) => ColumnType::Double,
            ColumnValue::String(_) => ColumnType::String,
            ColumnValue::Json(_) => ColumnType::Json,
            ColumnValue::DateTime(_) => ColumnType::DateTime,
            ColumnValue::Binary(_) => ColumnType::Binary,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::String(s) | ColumnValue::Json(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value widened to f64, `None` for non-numeric types.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            ColumnValue::Byte(v) => Some(v as f64),
            ColumnValue::UByte(v) => Some(v as f64),
            ColumnValue::Short(v) => Some(v as f64),
            ColumnValue::UShort(v) => Some(v as f64),
            ColumnValue::Int(v) => Some(v as f64),
            ColumnValue::UInt(v) => Some(v as f64),
            ColumnValue::Long(v) => Some(v as f64),
            ColumnValue::ULong(v) => Some(v as f64),
            ColumnValue::Float(v) => Some(v as f64),
            ColumnValue::Double(v) => Some(v),
            _ => None,
        }
    }

    /// Bytes of the payload for variable-length values.
    pub fn payload_len(&self) -> usize {
        match self {
            ColumnValue::String(s) | ColumnValue::Json(s) => s.len(),
            ColumnValue::DateTime(dt) => format_datetime(dt).len(),
            ColumnValue::Binary(b) => b.len(),
            other => other.column_type().fixed_width().unwrap_or(0),
        }
    }
}

/// Text form written for DateTime values: RFC 3339 with `Z` for UTC and
/// the shortest of second, milli, micro or nanosecond precision that keeps
/// the value exact.
pub fn format_datetime(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parses DateTime text. The two fixed UTC layouts are tried first, then
/// the general layouts. Text without an offset is taken as UTC.
pub fn parse_datetime(text: &str) -> Option<DateTime<FixedOffset>> {
    const UTC_LAYOUTS: [&str; 2] = ["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%dT%H:%M:%S%.3fZ"];
    const NAIVE_LAYOUTS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    const DATE_LAYOUTS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

    for layout in UTC_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, layout) {
            return Some(Utc.from_utc_datetime(&naive).into());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, layout) {
            return Some(Utc.from_utc_datetime(&naive).into());
        }
    }
    for layout in DATE_LAYOUTS {
        if let Ok(date) = NaiveDate::parse_from_str(text, layout) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&naive).into());
        }
    }
    None
}

/// Encodes the set values of a feature.
///
/// `values` must hold one slot per column, and every set value must have
/// the column's type.
pub fn encode_properties(values: &[Option<ColumnValue>], columns: &[Column]) -> GeobinResult<Vec<u8>> {
    if values.len() != columns.len() {
        return Err(GeobinError::invalid(format!(
            "feature has {} property slots but the layer has {} columns",
            values.len(),
            columns.len()
        )));
    }

    let mut w = ByteWriter::new();
    for (index, (value, column)) in values.iter().zip(columns).enumerate() {
        let Some(value) = value else { continue };
        if value.column_type() != column.column_type {
            return Err(GeobinError::invalid(format!(
                "value of type {} given for column '{}' of type {}",
                value.column_type(),
                column.name,
                column.column_type
            )));
        }
        w.write_u16(index as u16);
        write_value(&mut w, value, &column.name)?;
    }
    Ok(w.into_inner())
}

fn write_var(w: &mut ByteWriter, bytes: &[u8], column: &str) -> GeobinResult<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        GeobinError::invalid(format!("value of column '{}' is too large", column))
    })?;
    w.write_u32(len);
    w.write_bytes(bytes);
    Ok(())
}

fn write_value(w: &mut ByteWriter, value: &ColumnValue, column: &str) -> GeobinResult<()> {
    match value {
        ColumnValue::Byte(v) => w.write_i8(*v),
        ColumnValue::UByte(v) => w.write_u8(*v),
        ColumnValue::Bool(v) => w.write_u8(*v as u8),
        ColumnValue::Short(v) => w.write_i16(*v),
        ColumnValue::UShort(v) => w.write_u16(*v),
        ColumnValue::Int(v) => w.write_i32(*v),
        ColumnValue::UInt(v) => w.write_u32(*v),
        ColumnValue::Long(v) => w.write_i64(*v),
        ColumnValue::ULong(v) => w.write_u64(*v),
        ColumnValue::Float(v) => w.write_f32(*v),
        ColumnValue::Double(v) => w.write_f64(*v),
        ColumnValue::String(s) => write_var(w, s.as_bytes(), column)?,
        ColumnValue::Json(s) => {
            if let Err(e) = serde_json::from_str::<serde_json::Value>(s) {
                return Err(GeobinError::invalid(format!(
                    "value of column '{}' is not valid JSON: {}",
                    column, e
                )));
            }
            write_var(w, s.as_bytes(), column)?
        }
        ColumnValue::DateTime(dt) => {
            let text = format_datetime(dt);
            if text.len() > MAX_DATETIME_LEN {
                return Err(GeobinError::invalid(format!(
                    "datetime '{}' of column '{}' needs {} bytes, at most {} can be read back",
                    text,
                    column,
                    text.len(),
                    MAX_DATETIME_LEN
                )));
            }
            write_var(w, text.as_bytes(), column)?
        }
        ColumnValue::Binary(b) => write_var(w, b, column)?,
    }
    Ok(())
}

/// Decodes a property blob into one slot per column.
///
/// Columns ignored by `projection` are skipped by width and stay `None`.
/// A DateTime whose text cannot be parsed also stays `None`.
pub fn decode_properties(
    blob: &[u8],
    columns: &[Column],
    projection: &Projection,
) -> GeobinResult<Vec<Option<ColumnValue>>> {
    let mut values: Vec<Option<ColumnValue>> = vec![None; columns.len()];
    if blob.is_empty() {
        return Ok(values);
    }
    if blob.len() < 3 {
        return Err(GeobinError::corrupt(format!(
            "property blob of {} bytes is too short",
            blob.len()
        )));
    }

    let mut seen = vec![false; columns.len()];
    let mut r = ByteReader::new(blob);
    // a lone trailing byte is tolerated
    while r.remaining() >= 2 {
        let index = r.read_u16("column index")? as usize;
        if index >= columns.len() {
            return Err(GeobinError::corrupt(format!(
                "column index {} out of range ({} columns)",
                index,
                columns.len()
            )));
        }
        if seen[index] {
            return Err(GeobinError::corrupt(format!("column index {} set twice", index)));
        }
        seen[index] = true;

        let column_type = columns[index].column_type;
        if projection.is_column_ignored(index) {
            skip_value(&mut r, column_type)?;
        } else {
            values[index] = read_value(&mut r, column_type)?;
        }
    }
    Ok(values)
}

fn skip_value(r: &mut ByteReader<'_>, column_type: ColumnType) -> GeobinResult<()> {
    match column_type.fixed_width() {
        Some(width) => r.skip(width, "property value"),
        None => {
            let len = r.read_u32("property length")? as usize;
            r.skip(len, "property value")
        }
    }
}

fn read_var<'a>(r: &mut ByteReader<'a>) -> GeobinResult<&'a [u8]> {
    let len = r.read_u32("property length")? as usize;
    r.read_bytes(len, "property value")
}

fn read_text(r: &mut ByteReader<'_>) -> GeobinResult<String> {
    let bytes = read_var(r)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| GeobinError::corrupt("property text is not valid UTF-8"))
}

fn read_value(r: &mut ByteReader<'_>, column_type: ColumnType) -> GeobinResult<Option<ColumnValue>> {
    const WHAT: &str = "property value";
    let value = match column_type {
        ColumnType::Byte => ColumnValue::Byte(r.read_i8(WHAT)?),
        ColumnType::UByte => ColumnValue::UByte(r.read_u8(WHAT)?),
        ColumnType::Bool => ColumnValue::Bool(r.read_u8(WHAT)? != 0),
        ColumnType::Short => ColumnValue::Short(r.read_i16(WHAT)?),
        ColumnType::UShort => ColumnValue::UShort(r.read_u16(WHAT)?),
        ColumnType::Int => ColumnValue::Int(r.read_i32(WHAT)?),
        ColumnType::UInt => ColumnValue::UInt(r.read_u32(WHAT)?),
        ColumnType::Long => ColumnValue::Long(r.read_i64(WHAT)?),
        ColumnType::ULong => ColumnValue::ULong(r.read_u64(WHAT)?),
        ColumnType::Float => ColumnValue::Float(r.read_f32(WHAT)?),
        ColumnType::Double => ColumnValue::Double(r.read_f64(WHAT)?),
        ColumnType::String => ColumnValue::String(read_text(r)?),
        ColumnType::Json => ColumnValue::Json(read_text(r)?),
        ColumnType::Binary => ColumnValue::Binary(read_var(r)?.to_vec()),
        ColumnType::DateTime => {
            let bytes = read_var(r)?;
            if bytes.len() > MAX_DATETIME_LEN {
                return Err(GeobinError::corrupt(format!(
                    "datetime text of {} bytes exceeds {}",
                    bytes.len(),
                    MAX_DATETIME_LEN
                )));
            }
            let parsed = std::str::from_utf8(bytes).ok().and_then(parse_datetime);
            if parsed.is_none() {
                log::debug!("unparsable datetime value left unset");
            }
            return Ok(parsed.map(ColumnValue::DateTime));
        }
    };
    Ok(Some(value))
}
