//! Geometry model carried by features.
//!
//! This is a deliberately small model: vertex sequences and nested parts,
//! with the bounding box as the only derived quantity. Geometric algorithms
//! (length, area, validity, WKT/WKB) live outside this crate.

use std::fmt::{self, Display};

use crate::bounding_box::BoundingBox;

/// A vertex with optional Z and M ordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub m: Option<f64>,
}

impl Coord {
    /// Creates a 2D coordinate.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None, m: None }
    }

    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z), m: None }
    }

    pub fn xym(x: f64, y: f64, m: f64) -> Self {
        Self { x, y, z: None, m: Some(m) }
    }

    pub fn xyzm(x: f64, y: f64, z: f64, m: f64) -> Self {
        Self { x, y, z: Some(z), m: Some(m) }
    }
}

impl Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}", self.x, self.y)?;
        if let Some(z) = self.z {
            write!(f, ", z={}", z)?;
        }
        if let Some(m) = self.m {
            write!(f, ", m={}", m)?;
        }
        write!(f, ")")
    }
}

/// Which optional ordinates every vertex of a layer carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dimensions {
    pub has_z: bool,
    pub has_m: bool,
}

impl Dimensions {
    pub const XY: Dimensions = Dimensions { has_z: false, has_m: false };
    pub const XYZ: Dimensions = Dimensions { has_z: true, has_m: false };
    pub const XYM: Dimensions = Dimensions { has_z: false, has_m: true };
    pub const XYZM: Dimensions = Dimensions { has_z: true, has_m: true };

    pub fn new(has_z: bool, has_m: bool) -> Self {
        Dimensions { has_z, has_m }
    }

    /// Number of f64 ordinates per vertex.
    pub fn ordinates(&self) -> usize {
        2 + self.has_z as usize + self.has_m as usize
    }

    /// Wire flags: bit 0 = Z, bit 1 = M.
    pub fn flags(&self) -> u8 {
        (self.has_z as u8) | ((self.has_m as u8) << 1)
    }

    /// Returns `None` when any bit other than Z and M is set.
    pub fn from_flags(flags: u8) -> Option<Dimensions> {
        if flags & !0b11 != 0 {
            return None;
        }
        Some(Dimensions {
            has_z: flags & 0b01 != 0,
            has_m: flags & 0b10 != 0,
        })
    }
}

/// Geometry type tag, shared by the header (layer kind) and every encoded
/// geometry. `Unknown` is only meaningful at layer level, where it means
/// the layer mixes geometry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum GeometryKind {
    Unknown = 0,
    Point = 1,
    LineString = 2,
    Polygon = 3,
    MultiPoint = 4,
    MultiLineString = 5,
    MultiPolygon = 6,
    GeometryCollection = 7,
}

impl GeometryKind {
    pub fn name(&self) -> &'static str {
        match self {
            GeometryKind::Unknown => "Unknown",
            GeometryKind::Point => "Point",
            GeometryKind::LineString => "LineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::MultiPolygon => "MultiPolygon",
            GeometryKind::GeometryCollection => "GeometryCollection",
        }
    }
}

impl TryFrom<u8> for GeometryKind {
    type Error = String;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => GeometryKind::Unknown,
            1 => GeometryKind::Point,
            2 => GeometryKind::LineString,
            3 => GeometryKind::Polygon,
            4 => GeometryKind::MultiPoint,
            5 => GeometryKind::MultiLineString,
            6 => GeometryKind::MultiPolygon,
            7 => GeometryKind::GeometryCollection,
            other => return Err(format!("unknown geometry type tag {}", other)),
        })
    }
}

impl From<GeometryKind> for u8 {
    fn from(kind: GeometryKind) -> u8 {
        kind as u8
    }
}

impl Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A feature geometry.
///
/// Polygon rings and line parts are plain vertex vectors; ring closure and
/// orientation are not enforced here.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryValue {
    /// `None` is the empty point.
    Point(Option<Coord>),
    LineString(Vec<Coord>),
    Polygon(Vec<Vec<Coord>>),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
    GeometryCollection(Vec<GeometryValue>),
}

impl GeometryValue {
    /// 2D point.
    pub fn point(x: f64, y: f64) -> Self {
        GeometryValue::Point(Some(Coord::new(x, y)))
    }

    pub fn empty_point() -> Self {
        GeometryValue::Point(None)
    }

    /// 2D line string from `(x, y)` pairs.
    pub fn line_string(points: &[(f64, f64)]) -> Self {
        GeometryValue::LineString(points.iter().map(|&(x, y)| Coord::new(x, y)).collect())
    }

    /// 2D polygon from rings of `(x, y)` pairs, exterior ring first.
    pub fn polygon(rings: &[&[(f64, f64)]]) -> Self {
        GeometryValue::Polygon(
            rings
                .iter()
                .map(|ring| ring.iter().map(|&(x, y)| Coord::new(x, y)).collect())
                .collect(),
        )
    }

    /// Axis-aligned rectangle as a closed single-ring polygon.
    pub fn rectangle(bbox: &BoundingBox) -> Self {
        GeometryValue::polygon(&[&[
            (bbox.min_x, bbox.min_y),
            (bbox.max_x, bbox.min_y),
            (bbox.max_x, bbox.max_y),
            (bbox.min_x, bbox.max_y),
            (bbox.min_x, bbox.min_y),
        ]])
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            GeometryValue::Point(_) => GeometryKind::Point,
            GeometryValue::LineString(_) => GeometryKind::LineString,
            GeometryValue::Polygon(_) => GeometryKind::Polygon,
            GeometryValue::MultiPoint(_) => GeometryKind::MultiPoint,
            GeometryValue::MultiLineString(_) => GeometryKind::MultiLineString,
            GeometryValue::MultiPolygon(_) => GeometryKind::MultiPolygon,
            GeometryValue::GeometryCollection(_) => GeometryKind::GeometryCollection,
        }
    }

    /// Calls `f` for every vertex in encoding order.
    pub fn for_each_coord<F: FnMut(&Coord)>(&self, f: &mut F) {
        match self {
            GeometryValue::Point(point) => {
                if let Some(c) = point {
                    f(c);
                }
            }
            GeometryValue::LineString(coords) | GeometryValue::MultiPoint(coords) => {
                coords.iter().for_each(|c| f(c));
            }
            GeometryValue::Polygon(parts) | GeometryValue::MultiLineString(parts) => {
                parts.iter().flatten().for_each(|c| f(c));
            }
            GeometryValue::MultiPolygon(polygons) => {
                polygons.iter().flatten().flatten().for_each(|c| f(c));
            }
            GeometryValue::GeometryCollection(children) => {
                for child in children {
                    child.for_each_coord(f);
                }
            }
        }
    }

    pub fn vertex_count(&self) -> usize {
        let mut count = 0;
        self.for_each_coord(&mut |_| count += 1);
        count
    }

    /// True when the geometry has no vertex at all.
    pub fn is_empty(&self) -> bool {
        self.bounding_box().is_none()
    }

    /// XY extent of all vertices, `None` for empty geometries.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let mut bbox = BoundingBox::empty();
        self.for_each_coord(&mut |c| bbox.expand_to_point(c.x, c.y));
        if bbox.is_empty() {
            None
        } else {
            Some(bbox)
        }
    }
}

impl Display for GeometryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryValue::Point(Some(c)) => write!(f, "Point{}", c),
            GeometryValue::Point(None) => write!(f, "Point(empty)"),
            GeometryValue::GeometryCollection(children) => {
                write!(f, "GeometryCollection[{}]", children.len())
            }
            other => write!(f, "{}[{} vertices]", other.kind(), other.vertex_count()),
        }
    }
}
