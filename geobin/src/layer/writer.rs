use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::bounding_box::BoundingBox;
use crate::codec::feature::{encode_feature_value, Feature, RECORD_PREFIX_SIZE};
use crate::errors::{GeobinError, GeobinResult};
use crate::geometry::GeometryKind;
use crate::header::{Column, Header};
use crate::hilbert::hilbert_sort;
use crate::layer::copy_strategy::{BatchedCopy, CopyStrategy, DirectCopy};
use crate::layer::options::{CopyStrategyKind, WriterOptions};
use crate::layer::target::WriteTarget;
use crate::layer::temp_store::TempStore;
use crate::layer::{Capabilities, FeatureItem, WriteSummary, FEATURE_MAX_BUFFER_SIZE};
use crate::packed_rtree::{index_size, stream_write_from_fill, NodeItem};

/// Writes one layer to a [`WriteTarget`].
///
/// Without a spatial index, records go straight to the target behind a
/// placeholder header that is rewritten on close when the target can seek.
/// With an index, records are parked in a [`TempStore`] and the whole file
/// (header, tree, records in Hilbert order) is written sequentially by
/// [`close`](LayerWriter::close).
///
/// # Examples
///
/// ```rust
/// use std::io::Cursor;
/// use geobin::{Column, ColumnType, ColumnValue, Feature, GeometryKind, GeometryValue};
/// use geobin::{LayerWriter, TempStoreKind, WriterOptions};
///
/// let options = WriterOptions::new("places")
///     .geometry_kind(GeometryKind::Point)
///     .temp_store(TempStoreKind::Memory);
/// let mut writer = LayerWriter::create(Cursor::new(Vec::new()), options)?;
/// writer.add_column(Column::new("name", ColumnType::String))?;
/// writer.add_feature(
///     &Feature::new(1)
///         .with_geometry(GeometryValue::point(10.7, 59.9))
///         .with_property(0, ColumnValue::String("Oslo".into())),
/// )?;
/// let (_target, summary) = writer.close()?;
/// assert_eq!(summary.features_written, 1);
/// # Ok::<(), geobin::GeobinError>(())
/// ```
pub struct LayerWriter<W: WriteTarget> {
    target: W,
    options: WriterOptions,
    header: Header,
    feature_count: u64,
    extent: BoundingBox,
    max_record_size: usize,
    bytes_written: u64,
    header_size: Option<u64>,
    temp: Option<TempStore>,
    temp_size: u64,
    items: Vec<FeatureItem>,
    failed: bool,
}

impl LayerWriter<BufWriter<File>> {
    /// Creates (or truncates) the file at `path`.
    pub fn create_path<P: AsRef<Path>>(
        path: P,
        options: WriterOptions,
    ) -> GeobinResult<LayerWriter<BufWriter<File>>> {
        let file = File::create(path.as_ref())?;
        log::debug!("creating layer file {}", path.as_ref().display());
        LayerWriter::create(BufWriter::new(file), options)
    }
}

impl<W: WriteTarget> LayerWriter<W> {
    pub fn create(target: W, options: WriterOptions) -> GeobinResult<LayerWriter<W>> {
        options.validate()?;

        let mut header = Header::new(&options.name, options.geometry_kind, options.dims);
        header.crs = options.crs.clone();
        header.title = options.title.clone();
        header.description = options.description.clone();
        header.metadata = options.metadata_text()?;

        let temp = if options.spatial_index {
            header.index_node_size = options.node_size;
            Some(TempStore::create(
                options.temp_store,
                options.temp_dir.as_deref(),
            )?)
        } else {
            None
        };

        Ok(LayerWriter {
            target,
            options,
            header,
            feature_count: 0,
            extent: BoundingBox::empty(),
            max_record_size: 0,
            bytes_written: 0,
            header_size: None,
            temp,
            temp_size: 0,
            items: Vec::new(),
            failed: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn columns(&self) -> &[Column] {
        &self.header.columns
    }

    pub fn feature_count(&self) -> u64 {
        self.feature_count
    }

    pub fn is_indexed(&self) -> bool {
        self.temp.is_some()
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            create_field: self.feature_count == 0,
            sequential_write: true,
            ..Capabilities::default()
        }
    }

    /// Appends a column to the schema. Only allowed before the first feature.
    pub fn add_column(&mut self, column: Column) -> GeobinResult<()> {
        if self.feature_count > 0 {
            return Err(GeobinError::invalid(format!(
                "cannot add column '{}' after features were written",
                column.name
            )));
        }
        if self.header.columns.len() > u16::MAX as usize {
            return Err(GeobinError::invalid(format!(
                "cannot add column '{}': the layer already has {} columns",
                column.name,
                self.header.columns.len()
            )));
        }
        self.header.columns.push(column);
        Ok(())
    }

    /// Encodes and stores one feature.
    ///
    /// `feature.properties` must hold one slot per column. The feature's
    /// `fid` is ignored; FIDs are assigned by position in the final file.
    ///
    /// An I/O error while storing the record leaves the writer failed: every
    /// later `add_feature` and `close` returns an error.
    pub fn add_feature(&mut self, feature: &Feature) -> GeobinResult<()> {
        self.ensure_usable()?;
        let layer_kind = self.header.geometry_kind;
        if let Some(geometry) = &feature.geometry {
            if layer_kind != GeometryKind::Unknown && geometry.kind() != layer_kind {
                return Err(GeobinError::invalid(format!(
                    "{} geometry given for a {} layer",
                    geometry.kind(),
                    layer_kind
                )));
            }
        }

        let bbox = feature.geometry.as_ref().and_then(|g| g.bounding_box());
        if self.temp.is_some() && bbox.is_none() {
            return Err(GeobinError::invalid(
                "a layer with a spatial index requires a non-empty geometry on every feature",
            ));
        }

        let record = encode_feature_value(feature, &self.header.columns, self.header.dimensions())?;
        if record.len() - RECORD_PREFIX_SIZE > FEATURE_MAX_BUFFER_SIZE {
            return Err(GeobinError::invalid(format!(
                "encoded feature of {} bytes exceeds the maximum of {}",
                record.len() - RECORD_PREFIX_SIZE,
                FEATURE_MAX_BUFFER_SIZE
            )));
        }

        if let Err(e) = self.store_record(&record, bbox) {
            log::error!("layer '{}' failed while storing a feature: {}", self.header.name, e);
            self.failed = true;
            return Err(e);
        }

        if let Some(bbox) = bbox {
            self.extent.expand(&bbox);
        }
        self.max_record_size = self.max_record_size.max(record.len());
        self.feature_count += 1;
        Ok(())
    }

    fn ensure_usable(&self) -> GeobinResult<()> {
        if self.failed {
            return Err(GeobinError::invalid(format!(
                "layer '{}' is unusable after a failed write",
                self.header.name
            )));
        }
        Ok(())
    }

    fn store_record(&mut self, record: &[u8], bbox: Option<BoundingBox>) -> GeobinResult<()> {
        match self.temp.as_mut() {
            Some(temp) => {
                temp.write_all(record)?;
                self.items.push(FeatureItem {
                    temp_offset: self.temp_size,
                    size: record.len(),
                    bbox: bbox.unwrap_or_else(BoundingBox::empty),
                });
                self.temp_size += record.len() as u64;
            }
            None => {
                if self.header_size.is_none() {
                    self.write_header()?;
                }
                self.target.write_all(record)?;
                self.bytes_written += record.len() as u64;
            }
        }
        Ok(())
    }

    /// Finishes the file and hands the target back.
    ///
    /// A failed close leaves the target in an unspecified state.
    pub fn close(mut self) -> GeobinResult<(W, WriteSummary)> {
        self.ensure_usable()?;
        let indexed = self.temp.is_some();
        if indexed {
            self.finish_indexed()?;
        } else {
            self.finish_sequential()?;
        }
        self.target.flush()?;

        let summary = WriteSummary {
            features_written: self.feature_count,
            extent: self.final_extent(),
            bytes_written: self.bytes_written,
            indexed,
        };
        log::debug!(
            "closed layer '{}': {} features, {} bytes",
            self.header.name,
            summary.features_written,
            summary.bytes_written
        );
        Ok((self.target, summary))
    }

    fn final_extent(&self) -> Option<BoundingBox> {
        if self.extent.is_empty() {
            None
        } else {
            Some(self.extent)
        }
    }

    fn write_header(&mut self) -> GeobinResult<()> {
        let preamble = self.header.to_preamble()?;
        self.target.write_all(&preamble)?;
        self.header_size = Some(preamble.len() as u64);
        self.bytes_written += preamble.len() as u64;
        log::debug!("header written: {} bytes", preamble.len());
        Ok(())
    }

    fn finish_sequential(&mut self) -> GeobinResult<()> {
        let Some(header_size) = self.header_size else {
            // nothing written yet, the header can carry the final values
            return self.write_header();
        };
        if !self.target.supports_seek() {
            log::debug!("target cannot seek, header keeps an unknown feature count");
            return Ok(());
        }

        self.header.features_count = self.feature_count;
        self.header.set_extent(self.final_extent());
        let preamble = self.header.to_preamble()?;
        if preamble.len() as u64 != header_size {
            log::error!(
                "rewritten header is {} bytes, placeholder was {}",
                preamble.len(),
                header_size
            );
            return Err(GeobinError::invalid("header size changed between placeholder and rewrite"));
        }
        self.target.seek_to(0)?;
        self.target.write_all(&preamble)?;
        self.target.seek_to(self.bytes_written)?;
        Ok(())
    }

    fn finish_indexed(&mut self) -> GeobinResult<()> {
        let Some(mut temp) = self.temp.take() else {
            return Ok(());
        };
        temp.flush()?;

        let mut items = std::mem::take(&mut self.items);
        let num_items = items.len() as u64;
        log::debug!("sorting {} features", num_items);
        hilbert_sort(&mut items, &self.extent, |item| item.bbox);

        self.header.features_count = num_items;
        self.header.set_extent(self.final_extent());
        self.write_header()?;
        if items.is_empty() {
            return Ok(());
        }

        let node_size = self.header.index_node_size;
        let mut next_offset = 0u64;
        stream_write_from_fill(
            num_items,
            node_size,
            |start, leaves| {
                for (leaf, item) in leaves.iter_mut().zip(&items[start as usize..]) {
                    *leaf = NodeItem::from_bbox(&item.bbox, next_offset);
                    next_offset += item.size as u64;
                }
                Ok(())
            },
            &mut self.target,
        )?;
        let tree_size = index_size(num_items, node_size)?;
        self.bytes_written += tree_size;
        log::debug!("index written: {} bytes", tree_size);

        let mut strategy: Box<dyn CopyStrategy> =
            match (self.options.copy_strategy, temp.is_memory()) {
                (CopyStrategyKind::Direct, _) | (CopyStrategyKind::Auto, true) => {
                    Box::new(DirectCopy::new())
                }
                (CopyStrategyKind::Batched, _) | (CopyStrategyKind::Auto, false) => Box::new(
                    BatchedCopy::new(
                        self.options.copy_buffer_size,
                        self.max_record_size,
                        self.temp_size,
                    ),
                ),
            };
        log::debug!("copying {} bytes of records ({})", self.temp_size, strategy.name());
        let copied = strategy.copy(&mut temp, &items, &mut self.target)?;
        if copied != self.temp_size {
            return Err(GeobinError::corrupt(format!(
                "copied {} record bytes, expected {}",
                copied, self.temp_size
            )));
        }
        self.bytes_written += copied;
        Ok(())
    }
}
