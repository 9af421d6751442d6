//! Writer and reader configuration.

use std::path::{Path, PathBuf};

use crate::codec::Projection;
use crate::errors::{GeobinError, GeobinResult};
use crate::geometry::{Dimensions, GeometryKind};
use crate::header::Crs;
use crate::packed_rtree::DEFAULT_NODE_SIZE;

/// Where an indexed writer keeps records until the final file is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TempStoreKind {
    /// Anonymous temp file, removed as soon as it is created.
    #[default]
    File,
    /// Growable in-memory buffer.
    Memory,
}

/// How records are moved from the temp store into the final file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyStrategyKind {
    /// [`DirectCopy`](crate::layer::DirectCopy) for memory stores,
    /// [`BatchedCopy`](crate::layer::BatchedCopy) for files.
    #[default]
    Auto,
    Direct,
    Batched,
}

/// Upper bound for the batched copy buffer.
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 100 * 1024 * 1024;

/// Layer writer configuration.
///
/// # Examples
///
/// ```rust
/// use geobin::{Dimensions, GeometryKind, WriterOptions};
///
/// let options = WriterOptions::new("cities")
///     .geometry_kind(GeometryKind::Point)
///     .dimensions(Dimensions::XYZ)
///     .node_size(8)
///     .metadata_entry("source", "survey");
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub(crate) name: String,
    pub(crate) geometry_kind: GeometryKind,
    pub(crate) dims: Dimensions,
    pub(crate) spatial_index: bool,
    pub(crate) node_size: u16,
    pub(crate) crs: Option<Crs>,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) metadata: serde_json::Map<String, serde_json::Value>,
    pub(crate) temp_dir: Option<PathBuf>,
    pub(crate) temp_store: TempStoreKind,
    pub(crate) copy_strategy: CopyStrategyKind,
    pub(crate) copy_buffer_size: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions::new("")
    }
}

impl WriterOptions {
    /// Mixed-geometry 2D layer with a spatial index of the default node size.
    pub fn new(name: &str) -> Self {
        WriterOptions {
            name: name.to_string(),
            geometry_kind: GeometryKind::Unknown,
            dims: Dimensions::XY,
            spatial_index: true,
            node_size: DEFAULT_NODE_SIZE,
            crs: None,
            title: String::new(),
            description: String::new(),
            metadata: serde_json::Map::new(),
            temp_dir: None,
            temp_store: TempStoreKind::File,
            copy_strategy: CopyStrategyKind::Auto,
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
        }
    }

    pub fn geometry_kind(mut self, kind: GeometryKind) -> Self {
        self.geometry_kind = kind;
        self
    }

    pub fn dimensions(mut self, dims: Dimensions) -> Self {
        self.dims = dims;
        self
    }

    pub fn spatial_index(mut self, enabled: bool) -> Self {
        self.spatial_index = enabled;
        self
    }

    pub fn node_size(mut self, node_size: u16) -> Self {
        self.node_size = node_size;
        self
    }

    pub fn crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Adds one entry to the free-form metadata object.
    pub fn metadata_entry(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn temp_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.temp_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn temp_store(mut self, kind: TempStoreKind) -> Self {
        self.temp_store = kind;
        self
    }

    pub fn copy_strategy(mut self, kind: CopyStrategyKind) -> Self {
        self.copy_strategy = kind;
        self
    }

    /// Caps the batched copy buffer. The buffer still grows to hold the
    /// largest record.
    pub fn copy_buffer_size(mut self, bytes: usize) -> Self {
        self.copy_buffer_size = bytes;
        self
    }

    pub fn validate(&self) -> GeobinResult<()> {
        if self.spatial_index && self.node_size < 2 {
            return Err(GeobinError::invalid(format!(
                "node size must be at least 2, got {}",
                self.node_size
            )));
        }
        Ok(())
    }

    pub(crate) fn metadata_text(&self) -> GeobinResult<String> {
        if self.metadata.is_empty() {
            return Ok(String::new());
        }
        serde_json::to_string(&self.metadata)
            .map_err(|e| GeobinError::invalid(format!("metadata: {}", e)))
    }
}

/// Default cap on the payload bytes of one batch column.
pub const DEFAULT_BATCH_MEMORY_LIMIT: usize = 256 * 1024 * 1024;

/// Default maximum number of features per batch.
pub const DEFAULT_MAX_BATCH_FEATURES: usize = 65536;

/// Layer reader configuration.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub(crate) verify_buffers: bool,
    pub(crate) batch_memory_limit: usize,
    pub(crate) max_batch_features: usize,
    pub(crate) projection: Projection,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions::new()
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        ReaderOptions {
            verify_buffers: true,
            batch_memory_limit: DEFAULT_BATCH_MEMORY_LIMIT,
            max_batch_features: DEFAULT_MAX_BATCH_FEATURES,
            projection: Projection::all(),
        }
    }

    /// Checks record offset tables before use. On by default.
    pub fn verify_buffers(mut self, verify: bool) -> Self {
        self.verify_buffers = verify;
        self
    }

    pub fn batch_memory_limit(mut self, bytes: usize) -> Self {
        self.batch_memory_limit = bytes;
        self
    }

    pub fn max_batch_features(mut self, count: usize) -> Self {
        self.max_batch_features = count.max(1);
        self
    }

    pub fn ignore_column(mut self, index: usize) -> Self {
        self.projection.ignore_column(index);
        self
    }

    pub fn ignore_geometry(mut self, ignore: bool) -> Self {
        self.projection.ignore_geometry(ignore);
        self
    }
}
