//! # Geobin - Binary Vector Features with a Packed Spatial Index
//!
//! This crate reads and writes single-layer vector feature files: a small
//! header describing the schema, an optional static packed R-tree over the
//! feature bounding boxes, and a sequence of length-prefixed feature
//! records.
//!
//! ## Features
//!
//! - **Packed Hilbert R-tree**: Leaves sorted along a Hilbert curve, stored
//!   bottom level first, searched by streaming nodes from the file
//! - **Streaming Writes**: Records are spooled to a temp store and written
//!   out in index order on close; the final target is never seeked
//! - **Sequential Writes**: Layers without an index can go to any `Write`
//! - **Hardened Decoding**: Every count and length is checked against the
//!   remaining bytes before anything is allocated
//! - **Random Access**: Fetch a feature by FID straight from the leaf level
//! - **Columnar Batches**: Read features as typed column arrays
//!
//! ## Quick Start
//!
//! ```rust
//! use std::io::Cursor;
//! use geobin::{BoundingBox, Column, ColumnType, ColumnValue, Feature, GeometryKind};
//! use geobin::{GeometryValue, LayerReader, LayerWriter, ReaderOptions, TempStoreKind};
//! use geobin::WriterOptions;
//!
//! # fn main() -> Result<(), geobin::GeobinError> {
//! let options = WriterOptions::new("cities")
//!     .geometry_kind(GeometryKind::Point)
//!     .temp_store(TempStoreKind::Memory);
//! let mut writer = LayerWriter::create(Cursor::new(Vec::new()), options)?;
//! writer.add_column(Column::new("name", ColumnType::String))?;
//!
//! for (name, x, y) in [("Oslo", 10.75, 59.91), ("Bergen", 5.32, 60.39)] {
//!     let feature = Feature::new(1)
//!         .with_geometry(GeometryValue::point(x, y))
//!         .with_property(0, ColumnValue::String(name.to_string()));
//!     writer.add_feature(&feature)?;
//! }
//! let (target, _summary) = writer.close()?;
//!
//! let mut reader = LayerReader::open(Cursor::new(target.into_inner()), ReaderOptions::new())?;
//! reader.set_spatial_filter(Some(BoundingBox::new(10.0, 59.0, 11.0, 60.0)));
//! let oslo = reader.next_feature()?.expect("one match");
//! assert_eq!(oslo.property(0).and_then(|v| v.as_str()), Some("Oslo"));
//! assert!(reader.next_feature()?.is_none());
//! # Ok(())
//! # }
//! ```
//!
//! ## Packed R-tree API
//!
//! ```rust
//! use geobin::packed_rtree::{NodeItem, PackedRTree};
//! use geobin::BoundingBox;
//!
//! # fn main() -> Result<(), geobin::GeobinError> {
//! let leaves = vec![
//!     NodeItem::new(0.0, 0.0, 1.0, 1.0, 0),
//!     NodeItem::new(2.0, 2.0, 3.0, 3.0, 100),
//!     NodeItem::new(10.0, 10.0, 11.0, 11.0, 200),
//! ];
//! let tree = PackedRTree::build(&leaves, 2)?;
//! let hits = tree.search(&BoundingBox::new(1.5, 1.5, 2.5, 2.5))?;
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].offset, 100);
//! # Ok(())
//! # }
//! ```

// Core types
pub mod bounding_box;
pub mod errors;
pub mod geometry;

// File format
pub mod codec;
pub mod header;

// Spatial index
pub mod hilbert;
pub mod packed_rtree;

// Reading and writing layers
pub mod layer;

pub use bounding_box::BoundingBox;
pub use errors::{GeobinError, GeobinResult};

pub use geometry::{Coord, Dimensions, GeometryKind, GeometryValue};

pub use codec::feature::Feature;
pub use codec::properties::{ColumnType, ColumnValue};
pub use codec::Projection;
pub use header::{Column, Crs, Header};

pub use packed_rtree::{NodeItem, PackedRTree, SearchResultItem};

pub use layer::{
    Capabilities, CopyStrategyKind, FeatureBatch, LayerReader, LayerWriter, ReaderOptions,
    Sequential, TempStoreKind, WriteSummary, WriteTarget, WriterOptions,
};
