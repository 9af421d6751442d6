//! Feature record framing.
//!
//! ```text
//! u32 record length | u32 geometry offset | u32 geometry length
//!                   | u32 properties offset | u32 properties length
//!                   | geometry bytes | property bytes
//! ```
//!
//! Offsets are relative to the start of the body (just after the length
//! prefix). An offset of zero marks an absent section.

use crate::codec::geometry_codec::{decode_geometry, encode_geometry};
use crate::codec::le::{ByteReader, ByteWriter};
use crate::codec::properties::{decode_properties, encode_properties, ColumnValue};
use crate::codec::Projection;
use crate::errors::{GeobinError, GeobinResult};
use crate::geometry::{Dimensions, GeometryKind, GeometryValue};
use crate::header::Column;

/// Size of the offset table at the start of every record body.
pub const FEATURE_TABLE_SIZE: usize = 16;

/// Size of the length prefix in front of every record body.
pub const RECORD_PREFIX_SIZE: usize = 4;

/// A feature as handed to the writer and returned by the reader.
///
/// `properties` holds one slot per layer column; `None` is an unset value.
/// `fid` is filled in by the reader and ignored by the writer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    pub fid: Option<u64>,
    pub geometry: Option<GeometryValue>,
    pub properties: Vec<Option<ColumnValue>>,
}

impl Feature {
    /// A feature with no geometry and `column_count` unset properties.
    pub fn new(column_count: usize) -> Self {
        Feature {
            fid: None,
            geometry: None,
            properties: vec![None; column_count],
        }
    }

    pub fn with_geometry(mut self, geometry: GeometryValue) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Sets property `index`, growing the slot list if needed.
    pub fn with_property(mut self, index: usize, value: ColumnValue) -> Self {
        self.set_property(index, Some(value));
        self
    }

    pub fn set_property(&mut self, index: usize, value: Option<ColumnValue>) {
        if index >= self.properties.len() {
            self.properties.resize(index + 1, None);
        }
        self.properties[index] = value;
    }

    pub fn property(&self, index: usize) -> Option<&ColumnValue> {
        self.properties.get(index).and_then(|v| v.as_ref())
    }
}

/// Frames an encoded geometry and property blob into a length-prefixed
/// record.
pub fn encode_feature(geometry: Option<&[u8]>, properties: &[u8]) -> Vec<u8> {
    let geometry_len = geometry.map_or(0, |g| g.len());
    let body_len = FEATURE_TABLE_SIZE + geometry_len + properties.len();

    let mut w = ByteWriter::with_capacity(RECORD_PREFIX_SIZE + body_len);
    w.write_u32(body_len as u32);
    match geometry {
        Some(_) => {
            w.write_u32(FEATURE_TABLE_SIZE as u32);
            w.write_u32(geometry_len as u32);
        }
        None => {
            w.write_u32(0);
            w.write_u32(0);
        }
    }
    if properties.is_empty() {
        w.write_u32(0);
        w.write_u32(0);
    } else {
        w.write_u32((FEATURE_TABLE_SIZE + geometry_len) as u32);
        w.write_u32(properties.len() as u32);
    }
    if let Some(g) = geometry {
        w.write_bytes(g);
    }
    w.write_bytes(properties);
    w.into_inner()
}

/// Encodes a whole feature against a layer schema and returns the framed
/// record.
pub fn encode_feature_value(
    feature: &Feature,
    columns: &[Column],
    dims: Dimensions,
) -> GeobinResult<Vec<u8>> {
    let geometry = feature
        .geometry
        .as_ref()
        .map(|g| encode_geometry(g, dims))
        .transpose()?;
    let properties = encode_properties(&feature.properties, columns)?;
    Ok(encode_feature(geometry.as_deref(), &properties))
}

/// The two sections of a record body, borrowed from the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureRecord<'a> {
    pub geometry: Option<&'a [u8]>,
    pub properties: &'a [u8],
}

/// Splits a record body into its sections.
///
/// With `verify` set, section offsets must point past the table, sections
/// must not overlap, and a zero offset must come with a zero length.
/// Without it only the slice bounds are enforced.
pub fn parse_record(body: &[u8], verify: bool) -> GeobinResult<FeatureRecord<'_>> {
    let mut r = ByteReader::new(body);
    let geometry_offset = r.read_u32("geometry offset")? as usize;
    let geometry_len = r.read_u32("geometry length")? as usize;
    let properties_offset = r.read_u32("properties offset")? as usize;
    let properties_len = r.read_u32("properties length")? as usize;

    if verify {
        for (name, offset, len) in [
            ("geometry", geometry_offset, geometry_len),
            ("properties", properties_offset, properties_len),
        ] {
            if offset == 0 && len != 0 {
                return Err(GeobinError::corrupt(format!(
                    "absent {} section has length {}",
                    name, len
                )));
            }
            if offset != 0 && offset < FEATURE_TABLE_SIZE {
                return Err(GeobinError::corrupt(format!(
                    "{} offset {} points into the record table",
                    name, offset
                )));
            }
        }
        if geometry_offset != 0
            && properties_offset != 0
            && geometry_offset < properties_offset + properties_len
            && properties_offset < geometry_offset + geometry_len
        {
            return Err(GeobinError::corrupt("geometry and properties sections overlap"));
        }
    }

    let geometry = if geometry_offset == 0 {
        None
    } else {
        Some(section(body, geometry_offset, geometry_len, "geometry")?)
    };
    let properties = if properties_offset == 0 {
        &body[0..0]
    } else {
        section(body, properties_offset, properties_len, "properties")?
    };
    Ok(FeatureRecord {
        geometry,
        properties,
    })
}

fn section<'a>(body: &'a [u8], offset: usize, len: usize, name: &str) -> GeobinResult<&'a [u8]> {
    offset
        .checked_add(len)
        .and_then(|end| body.get(offset..end))
        .ok_or_else(|| {
            GeobinError::corrupt(format!(
                "{} section [{}, +{}) exceeds record of {} bytes",
                name,
                offset,
                len,
                body.len()
            ))
        })
}

/// Decodes a record body into geometry and property slots.
pub fn decode_feature(
    body: &[u8],
    columns: &[Column],
    projection: &Projection,
    kind: GeometryKind,
    dims: Dimensions,
    verify: bool,
) -> GeobinResult<(Option<GeometryValue>, Vec<Option<ColumnValue>>)> {
    let record = parse_record(body, verify)?;
    let geometry = match record.geometry {
        Some(bytes) if !projection.is_geometry_ignored() => {
            Some(decode_geometry(bytes, kind, dims)?)
        }
        _ => None,
    };
    let properties = decode_properties(record.properties, columns, projection)?;
    Ok((geometry, properties))
}
