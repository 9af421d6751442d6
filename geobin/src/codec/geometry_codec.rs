//! Binary encoding of [`GeometryValue`].
//!
//! ```text
//! u8 kind | u8 dimension flags | body
//! Point, LineString, MultiPoint:   u32 n | n vertex tuples
//! Polygon, MultiLineString:        u32 parts | u32 vertices per part | tuples
//! MultiPolygon, GeometryCollection: u32 parts | u32 bytes per part | children
//! ```
//!
//! A vertex tuple is `x, y[, z][, m]` as f64. Children of the last two kinds
//! are complete encodings, so they carry their own kind and flags.

use crate::codec::le::{ByteReader, ByteWriter};
use crate::codec::MAX_GEOMETRY_DEPTH;
use crate::errors::{GeobinError, GeobinResult};
use crate::geometry::{Coord, Dimensions, GeometryKind, GeometryValue};

/// Encodes `geometry` with the vertex layout of `dims`.
///
/// Missing Z or M ordinates are written as `0.0`; ordinates the layer does
/// not carry are dropped. Counts are stored as u32, so inputs whose encoding
/// would not fit a feature record are rejected later by the writer.
/// Nesting deeper than [`MAX_GEOMETRY_DEPTH`] is `InvalidArgument`, since
/// the decoder would refuse it.
pub fn encode_geometry(geometry: &GeometryValue, dims: Dimensions) -> GeobinResult<Vec<u8>> {
    let mut w = ByteWriter::with_capacity(encoded_size_hint(geometry, dims));
    write_geometry(&mut w, geometry, dims, 0)?;
    Ok(w.into_inner())
}

fn encoded_size_hint(geometry: &GeometryValue, dims: Dimensions) -> usize {
    2 + 4 + geometry.vertex_count() * dims.ordinates() * 8
}

fn check_depth(depth: usize) -> GeobinResult<()> {
    if depth > MAX_GEOMETRY_DEPTH {
        return Err(GeobinError::invalid(format!(
            "geometry nesting exceeds {} levels",
            MAX_GEOMETRY_DEPTH
        )));
    }
    Ok(())
}

fn write_geometry(
    w: &mut ByteWriter,
    geometry: &GeometryValue,
    dims: Dimensions,
    depth: usize,
) -> GeobinResult<()> {
    check_depth(depth)?;
    w.write_u8(geometry.kind().into());
    w.write_u8(dims.flags());
    match geometry {
        GeometryValue::Point(point) => {
            let coords: &[Coord] = match point {
                Some(c) => std::slice::from_ref(c),
                None => &[],
            };
            write_coord_list(w, coords, dims);
        }
        GeometryValue::LineString(coords) | GeometryValue::MultiPoint(coords) => {
            write_coord_list(w, coords, dims);
        }
        GeometryValue::Polygon(parts) | GeometryValue::MultiLineString(parts) => {
            write_parts(w, parts, dims);
        }
        GeometryValue::MultiPolygon(polygons) => {
            if !polygons.is_empty() {
                check_depth(depth + 1)?;
            }
            let children: Vec<Vec<u8>> = polygons
                .iter()
                .map(|rings| {
                    let mut child = ByteWriter::new();
                    child.write_u8(GeometryKind::Polygon.into());
                    child.write_u8(dims.flags());
                    write_parts(&mut child, rings, dims);
                    child.into_inner()
                })
                .collect();
            write_children(w, &children);
        }
        GeometryValue::GeometryCollection(members) => {
            let children = members
                .iter()
                .map(|member| {
                    let mut child = ByteWriter::new();
                    write_geometry(&mut child, member, dims, depth + 1)?;
                    Ok(child.into_inner())
                })
                .collect::<GeobinResult<Vec<Vec<u8>>>>()?;
            write_children(w, &children);
        }
    }
    Ok(())
}

fn write_parts(w: &mut ByteWriter, parts: &[Vec<Coord>], dims: Dimensions) {
    w.write_u32(parts.len() as u32);
    for part in parts {
        w.write_u32(part.len() as u32);
    }
    for c in parts.iter().flatten() {
        write_coord(w, c, dims);
    }
}

fn write_children(w: &mut ByteWriter, children: &[Vec<u8>]) {
    w.write_u32(children.len() as u32);
    for child in children {
        w.write_u32(child.len() as u32);
    }
    for child in children {
        w.write_bytes(child);
    }
}

fn write_coord_list(w: &mut ByteWriter, coords: &[Coord], dims: Dimensions) {
    w.write_u32(coords.len() as u32);
    for c in coords {
        write_coord(w, c, dims);
    }
}

#[inline]
fn write_coord(w: &mut ByteWriter, c: &Coord, dims: Dimensions) {
    w.write_f64(c.x);
    w.write_f64(c.y);
    if dims.has_z {
        w.write_f64(c.z.unwrap_or(0.0));
    }
    if dims.has_m {
        w.write_f64(c.m.unwrap_or(0.0));
    }
}

/// Decodes a complete geometry.
///
/// `kind_hint` is the layer geometry kind: `Unknown` accepts whatever kind
/// is embedded, any other value must match it. The embedded dimension flags
/// must equal `dims`. Every count is checked against the remaining bytes
/// before anything is allocated, and bytes left over after the geometry are
/// rejected.
pub fn decode_geometry(
    buf: &[u8],
    kind_hint: GeometryKind,
    dims: Dimensions,
) -> GeobinResult<GeometryValue> {
    let mut r = ByteReader::new(buf);
    let geometry = read_geometry(&mut r, kind_hint, dims, 0)?;
    if !r.is_empty() {
        return Err(GeobinError::corrupt(format!(
            "{} trailing bytes after {} geometry",
            r.remaining(),
            geometry.kind()
        )));
    }
    Ok(geometry)
}

/// Reads only the embedded kind of an encoded geometry.
pub fn peek_geometry_kind(buf: &[u8]) -> GeobinResult<GeometryKind> {
    let tag = ByteReader::new(buf).read_u8("geometry type")?;
    GeometryKind::try_from(tag).map_err(GeobinError::CorruptData)
}

fn read_geometry(
    r: &mut ByteReader<'_>,
    kind_hint: GeometryKind,
    dims: Dimensions,
    depth: usize,
) -> GeobinResult<GeometryValue> {
    if depth > MAX_GEOMETRY_DEPTH {
        return Err(GeobinError::corrupt(format!(
            "geometry nesting exceeds {} levels",
            MAX_GEOMETRY_DEPTH
        )));
    }

    let tag = r.read_u8("geometry type")?;
    let kind = GeometryKind::try_from(tag).map_err(GeobinError::CorruptData)?;
    if kind_hint != GeometryKind::Unknown && kind_hint != kind {
        return Err(GeobinError::corrupt(format!(
            "geometry type {} does not match expected {}",
            kind, kind_hint
        )));
    }

    let flags = r.read_u8("geometry dimensions")?;
    match Dimensions::from_flags(flags) {
        Some(found) if found == dims => {}
        _ => {
            return Err(GeobinError::corrupt(format!(
                "geometry dimension flags {:#04x} do not match layer flags {:#04x}",
                flags,
                dims.flags()
            )))
        }
    }

    let geometry = match kind {
        GeometryKind::Point => {
            let mut coords = read_coord_list(r, dims)?;
            match coords.len() {
                0 => GeometryValue::Point(None),
                1 => GeometryValue::Point(coords.pop()),
                n => return Err(GeobinError::corrupt(format!("point has {} vertices", n))),
            }
        }
        GeometryKind::LineString => GeometryValue::LineString(read_coord_list(r, dims)?),
        GeometryKind::MultiPoint => GeometryValue::MultiPoint(read_coord_list(r, dims)?),
        GeometryKind::Polygon => GeometryValue::Polygon(read_parts(r, dims)?),
        GeometryKind::MultiLineString => GeometryValue::MultiLineString(read_parts(r, dims)?),
        GeometryKind::MultiPolygon => {
            let children = read_children(r, GeometryKind::Polygon, dims, depth)?;
            let mut polygons = Vec::with_capacity(children.len());
            for child in children {
                match child {
                    GeometryValue::Polygon(rings) => polygons.push(rings),
                    other => {
                        return Err(GeobinError::corrupt(format!(
                            "multipolygon part is a {}",
                            other.kind()
                        )))
                    }
                }
            }
            GeometryValue::MultiPolygon(polygons)
        }
        GeometryKind::GeometryCollection => GeometryValue::GeometryCollection(read_children(
            r,
            GeometryKind::Unknown,
            dims,
            depth,
        )?),
        GeometryKind::Unknown => {
            return Err(GeobinError::corrupt("encoded geometry has type Unknown"))
        }
    };
    Ok(geometry)
}

/// Checks that `count` items of `width` bytes fit in what is left.
fn ensure_fits(r: &ByteReader<'_>, count: usize, width: usize, what: &str) -> GeobinResult<usize> {
    let needed = count
        .checked_mul(width)
        .ok_or_else(|| GeobinError::corrupt(format!("{} count {} overflows", what, count)))?;
    if needed > r.remaining() {
        return Err(GeobinError::corrupt(format!(
            "{} count {} needs {} bytes but only {} remain",
            what,
            count,
            needed,
            r.remaining()
        )));
    }
    Ok(needed)
}

fn read_coord_list(r: &mut ByteReader<'_>, dims: Dimensions) -> GeobinResult<Vec<Coord>> {
    let count = r.read_u32("vertex count")? as usize;
    read_coords(r, count, dims)
}

fn read_coords(r: &mut ByteReader<'_>, count: usize, dims: Dimensions) -> GeobinResult<Vec<Coord>> {
    ensure_fits(r, count, dims.ordinates() * 8, "vertex")?;
    let mut coords = Vec::with_capacity(count);
    for _ in 0..count {
        let x = r.read_f64("x")?;
        let y = r.read_f64("y")?;
        let z = if dims.has_z { Some(r.read_f64("z")?) } else { None };
        let m = if dims.has_m { Some(r.read_f64("m")?) } else { None };
        coords.push(Coord { x, y, z, m });
    }
    Ok(coords)
}

fn read_part_sizes(r: &mut ByteReader<'_>, what: &str) -> GeobinResult<Vec<usize>> {
    let parts = r.read_u32("part count")? as usize;
    ensure_fits(r, parts, 4, what)?;
    let mut sizes = Vec::with_capacity(parts);
    for _ in 0..parts {
        sizes.push(r.read_u32(what)? as usize);
    }
    Ok(sizes)
}

fn read_parts(r: &mut ByteReader<'_>, dims: Dimensions) -> GeobinResult<Vec<Vec<Coord>>> {
    let sizes = read_part_sizes(r, "part vertex count")?;
    let total = sizes
        .iter()
        .try_fold(0usize, |acc, n| acc.checked_add(*n))
        .ok_or_else(|| GeobinError::corrupt("total vertex count overflows"))?;
    ensure_fits(r, total, dims.ordinates() * 8, "vertex")?;
    sizes.into_iter().map(|n| read_coords(r, n, dims)).collect()
}

fn read_children(
    r: &mut ByteReader<'_>,
    child_hint: GeometryKind,
    dims: Dimensions,
    depth: usize,
) -> GeobinResult<Vec<GeometryValue>> {
    let sizes = read_part_sizes(r, "part byte length")?;
    let total = sizes
        .iter()
        .try_fold(0usize, |acc, n| acc.checked_add(*n))
        .ok_or_else(|| GeobinError::corrupt("total part length overflows"))?;
    ensure_fits(r, total, 1, "part byte")?;

    let mut children = Vec::with_capacity(sizes.len());
    for size in sizes {
        let mut child = ByteReader::new(r.read_bytes(size, "geometry part")?);
        let geometry = read_geometry(&mut child, child_hint, dims, depth + 1)?;
        if !child.is_empty() {
            return Err(GeobinError::corrupt(format!(
                "{} trailing bytes inside geometry part",
                child.remaining()
            )));
        }
        children.push(geometry);
    }
    Ok(children)
}
