//! Layer writer and reader.
//!
//! A [`LayerWriter`] turns a stream of [`Feature`](crate::codec::feature::Feature)s
//! into a complete file; a [`LayerReader`] iterates, filters and fetches
//! them back.

mod batch;
mod buffer;
mod copy_strategy;
mod options;
mod reader;
mod target;
mod temp_store;
mod writer;

pub use batch::{BinaryColumn, ColumnArray, FeatureBatch};
pub use buffer::{FeatureBuffer, MIN_FEATURE_BUFFER_SIZE};
pub use copy_strategy::{BatchedCopy, CopyStrategy, DirectCopy, RecordSource};
pub use options::{
    CopyStrategyKind, ReaderOptions, TempStoreKind, WriterOptions, DEFAULT_BATCH_MEMORY_LIMIT,
    DEFAULT_COPY_BUFFER_SIZE, DEFAULT_MAX_BATCH_FEATURES,
};
pub use reader::LayerReader;
pub use target::{Sequential, WriteTarget};
pub use temp_store::TempStore;
pub use writer::LayerWriter;

use crate::bounding_box::BoundingBox;

/// Largest accepted record body, and largest accepted record length prefix.
pub const FEATURE_MAX_BUFFER_SIZE: usize = i32::MAX as usize;

/// A record parked in the temp store of an indexed writer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureItem {
    /// Byte offset of the framed record in the temp store.
    pub temp_offset: u64,
    /// Framed size, length prefix included.
    pub size: usize,
    pub bbox: BoundingBox,
}

/// What a layer can do cheaply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub random_read: bool,
    pub fast_spatial_filter: bool,
    pub fast_feature_count: bool,
    pub fast_extent: bool,
    pub create_field: bool,
    pub sequential_write: bool,
}

/// Outcome of [`LayerWriter::close`].
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSummary {
    pub features_written: u64,
    pub extent: Option<BoundingBox>,
    pub bytes_written: u64,
    pub indexed: bool,
}
