//! Hand-written binary codecs for geometries, properties and feature
//! records. All of them read untrusted input and validate every count
//! against the bytes that remain before allocating.

pub mod feature;
pub mod geometry_codec;
pub mod le;
pub mod properties;

/// Deepest nesting of MultiPolygon / GeometryCollection parts accepted on read.
pub const MAX_GEOMETRY_DEPTH: usize = 32;

/// Which parts of a feature the reader materialises.
///
/// Ignored columns are skipped by width while decoding the property blob;
/// an ignored geometry is never decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    ignored_columns: Vec<bool>,
    ignore_geometry: bool,
}

impl Projection {
    /// Materialise everything.
    pub fn all() -> Self {
        Projection::default()
    }

    pub fn ignore_column(&mut self, index: usize) {
        if index >= self.ignored_columns.len() {
            self.ignored_columns.resize(index + 1, false);
        }
        self.ignored_columns[index] = true;
    }

    pub fn ignore_geometry(&mut self, ignore: bool) {
        self.ignore_geometry = ignore;
    }

    pub fn is_column_ignored(&self, index: usize) -> bool {
        self.ignored_columns.get(index).copied().unwrap_or(false)
    }

    pub fn is_geometry_ignored(&self) -> bool {
        self.ignore_geometry
    }
}
