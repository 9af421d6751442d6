use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::bounding_box::BoundingBox;
use crate::codec::feature::{decode_feature, parse_record, Feature, RECORD_PREFIX_SIZE};
use crate::codec::geometry_codec::decode_geometry;
use crate::codec::properties::decode_properties;
use crate::errors::{GeobinError, GeobinResult};
use crate::geometry::{Dimensions, GeometryKind};
use crate::header::Header;
use crate::layer::batch::{BatchBuilder, FeatureBatch};
use crate::layer::buffer::FeatureBuffer;
use crate::layer::options::ReaderOptions;
use crate::layer::{Capabilities, FEATURE_MAX_BUFFER_SIZE};
use crate::packed_rtree::{index_size, read_feature_offset, stream_search, SearchResultItem};

/// Iteration position. Saved and restored around random access and
/// batch cuts.
#[derive(Debug, Clone, Copy, Default)]
struct ReadState {
    /// Next record, relative to the feature section.
    offset: u64,
    next_fid: u64,
    hit_pos: usize,
    index_consulted: bool,
    exhausted: bool,
}

/// Reads one layer from a `Read + Seek` source.
///
/// Features come back in file order. With a spatial filter and a spatial
/// index, only the records found by the index are read; without an index,
/// every record is decoded and tested against the filter.
///
/// # Examples
///
/// ```rust
/// use std::io::Cursor;
/// use geobin::{BoundingBox, Feature, GeometryValue, LayerReader, LayerWriter};
/// use geobin::{ReaderOptions, TempStoreKind, WriterOptions};
///
/// let options = WriterOptions::new("grid").temp_store(TempStoreKind::Memory);
/// let mut writer = LayerWriter::create(Cursor::new(Vec::new()), options)?;
/// for i in 0..10 {
///     writer.add_feature(&Feature::new(0).with_geometry(GeometryValue::point(i as f64, 0.0)))?;
/// }
/// let (target, _) = writer.close()?;
///
/// let mut reader = LayerReader::open(Cursor::new(target.into_inner()), ReaderOptions::new())?;
/// reader.set_spatial_filter(Some(BoundingBox::new(2.5, -1.0, 4.5, 1.0)));
/// let mut found = 0;
/// while let Some(_feature) = reader.next_feature()? {
///     found += 1;
/// }
/// assert_eq!(found, 2);
/// # Ok::<(), geobin::GeobinError>(())
/// ```
pub struct LayerReader<R: Read + Seek> {
    source: R,
    header: Header,
    options: ReaderOptions,
    file_size: u64,
    index_offset: u64,
    features_offset: u64,
    /// Known position of `source`, `u64::MAX` when unknown.
    cursor: u64,
    buffer: FeatureBuffer,
    filter: Option<BoundingBox>,
    state: ReadState,
    hits: Option<Vec<SearchResultItem>>,
}

impl LayerReader<BufReader<File>> {
    pub fn open_path<P: AsRef<Path>>(
        path: P,
        options: ReaderOptions,
    ) -> GeobinResult<LayerReader<BufReader<File>>> {
        let file = File::open(path.as_ref())?;
        log::debug!("opening layer file {}", path.as_ref().display());
        LayerReader::open(BufReader::new(file), options)
    }
}

impl<R: Read + Seek> LayerReader<R> {
    /// Reads and checks the preamble, and checks that the source is long
    /// enough to hold the spatial index the header announces.
    pub fn open(mut source: R, options: ReaderOptions) -> GeobinResult<LayerReader<R>> {
        let file_size = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;
        let (header, header_len) = Header::read_preamble(&mut source)?;

        let count = header.features_count;
        let tree_size = if header.has_index() && count > 0 {
            index_size(count, header.index_node_size)?
        } else {
            0
        };
        let features_offset = header_len
            .checked_add(tree_size)
            .filter(|end| *end <= file_size)
            .ok_or_else(|| {
                GeobinError::corrupt(format!(
                    "file of {} bytes cannot hold a {} byte header and a {} byte index",
                    file_size, header_len, tree_size
                ))
            })?;
        log::debug!(
            "opened layer '{}': {} features, index {} bytes at {}, features at {}",
            header.name,
            count,
            tree_size,
            header_len,
            features_offset
        );

        Ok(LayerReader {
            source,
            header,
            options,
            file_size,
            index_offset: header_len,
            features_offset,
            cursor: header_len,
            buffer: FeatureBuffer::new(),
            filter: None,
            state: ReadState::default(),
            hits: None,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn spatial_filter(&self) -> Option<BoundingBox> {
        self.filter
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    pub fn capabilities(&self) -> Capabilities {
        let count = self.header.features_count;
        Capabilities {
            random_read: true,
            fast_spatial_filter: self.header.has_index() && count > 0,
            fast_feature_count: self.filter.is_none() && count > 0,
            fast_extent: self.header.extent().is_some(),
            create_field: false,
            sequential_write: false,
        }
    }

    /// Sets or clears the spatial filter and rewinds.
    pub fn set_spatial_filter(&mut self, filter: Option<BoundingBox>) {
        self.filter = filter;
        self.reset_reading();
    }

    /// Rewinds to the first feature.
    pub fn reset_reading(&mut self) {
        self.state = ReadState::default();
        self.hits = None;
    }

    /// Next feature passing the spatial filter, `None` at the end.
    pub fn next_feature(&mut self) -> GeobinResult<Option<Feature>> {
        while let Some((fid, len)) = self.advance()? {
            let feature = self.decode_buffered(fid, len)?;
            if let Some(filter) = self.sequential_filter() {
                let bbox = if self.options.projection.is_geometry_ignored() {
                    self.buffered_bbox(len)?
                } else {
                    feature.geometry.as_ref().and_then(|g| g.bounding_box())
                };
                if !bbox.is_some_and(|b| b.intersects(&filter)) {
                    continue;
                }
            }
            return Ok(Some(feature));
        }
        Ok(None)
    }

    /// Fetches one feature by FID without disturbing iteration. The spatial
    /// filter does not apply. Out of range FIDs give `None`.
    pub fn get_feature(&mut self, fid: u64) -> GeobinResult<Option<Feature>> {
        let saved = self.state;
        let result = self.fetch(fid);
        self.state = saved;
        result
    }

    /// Number of features passing the current filter.
    ///
    /// Answered from the header when there is no filter and the count is
    /// known; otherwise counted, leaving the iteration position untouched.
    pub fn feature_count(&mut self) -> GeobinResult<u64> {
        let known = self.header.features_count;
        if self.filter.is_none() && known > 0 {
            return Ok(known);
        }

        let saved = (self.state, self.hits.take());
        self.state = ReadState::default();
        let result = self.count_features();
        (self.state, self.hits) = saved;
        result
    }

    /// Layer extent from the header, or computed from every geometry when
    /// the header does not carry one. `None` for layers without geometries.
    pub fn extent(&mut self) -> GeobinResult<Option<BoundingBox>> {
        if let Some(extent) = self.header.extent() {
            return Ok(Some(extent));
        }

        let saved = (self.state, self.hits.take(), self.filter.take());
        self.state = ReadState::default();
        let result = self.scan_extent();
        (self.state, self.hits, self.filter) = saved;
        result
    }

    /// Next batch of features passing the spatial filter, `None` at the end.
    ///
    /// A batch ends early when the next feature would push the geometry
    /// column or a variable-length column past the configured memory limit;
    /// that feature starts the following batch.
    pub fn next_batch(&mut self) -> GeobinResult<Option<FeatureBatch>> {
        let mut builder = BatchBuilder::new(
            &self.header.columns,
            &self.options.projection,
            self.options.batch_memory_limit,
        );
        let kind = self.header.geometry_kind;
        let dims = self.header.dimensions();
        let verify = self.options.verify_buffers;

        while builder.len() < self.options.max_batch_features {
            let saved = self.state;
            let Some((fid, len)) = self.advance()? else {
                break;
            };
            let record = parse_record(self.buffer.slice(len), verify)?;
            if let Some(filter) = self.sequential_filter() {
                if !geometry_intersects(record.geometry, &filter, kind, dims)? {
                    continue;
                }
            }

            let geometry = if self.options.projection.is_geometry_ignored() {
                None
            } else {
                if let (Some(bytes), true) = (record.geometry, verify) {
                    decode_geometry(bytes, kind, dims)?;
                }
                record.geometry
            };
            let values = decode_properties(
                record.properties,
                &self.header.columns,
                &self.options.projection,
            )?;

            if !builder.accepts(geometry, &values) {
                log::debug!("batch of {} features cut before fid {}", builder.len(), fid);
                self.state = saved;
                break;
            }
            builder.push(fid, geometry, &values);
        }

        if builder.len() == 0 {
            Ok(None)
        } else {
            Ok(Some(builder.finish()))
        }
    }

    /// Filter applied to decoded geometries, i.e. when the index was not
    /// used to select records.
    fn sequential_filter(&self) -> Option<BoundingBox> {
        if self.hits.is_some() {
            None
        } else {
            self.filter
        }
    }

    /// Reads the next candidate record into the buffer and returns its FID
    /// and body length.
    fn advance(&mut self) -> GeobinResult<Option<(u64, usize)>> {
        if self.state.exhausted {
            return Ok(None);
        }
        if !self.state.index_consulted {
            self.state.index_consulted = true;
            self.consult_index()?;
        }

        let count = self.header.features_count;
        let next = match &self.hits {
            Some(hits) => {
                let hit = hits.get(self.state.hit_pos).copied();
                self.state.hit_pos += 1;
                hit.map(|hit| (hit.index, hit.offset))
            }
            None if count > 0 && self.state.next_fid >= count => None,
            None => Some((self.state.next_fid, self.state.offset)),
        };
        let Some((fid, offset)) = next else {
            self.finish();
            return Ok(None);
        };

        match self.read_record(offset, count == 0)? {
            Some(len) => {
                if self.hits.is_none() {
                    self.state.next_fid += 1;
                    self.state.offset = offset + (RECORD_PREFIX_SIZE + len) as u64;
                }
                Ok(Some((fid, len)))
            }
            None => {
                self.finish();
                Ok(None)
            }
        }
    }

    fn finish(&mut self) {
        self.state.exhausted = true;
        log::debug!("end of features after fid {}", self.state.next_fid);
    }

    /// Runs the index search for the current filter, once per iteration.
    fn consult_index(&mut self) -> GeobinResult<()> {
        let Some(filter) = self.filter else {
            return Ok(());
        };
        let count = self.header.features_count;
        if !self.header.has_index() || count == 0 {
            return Ok(());
        }
        if self.header.extent().is_some_and(|extent| filter.contains(&extent)) {
            log::debug!("filter covers the layer extent, index not used");
            return Ok(());
        }

        let index_offset = self.index_offset;
        let source = &mut self.source;
        let cursor = &mut self.cursor;
        let hits = stream_search(count, self.header.index_node_size, &filter, |buf, offset| {
            read_exact_at(source, cursor, index_offset + offset, buf, "index node")
        })?;
        log::debug!("index returned {} of {} features", hits.len(), count);
        self.hits = Some(hits);
        Ok(())
    }

    fn fetch(&mut self, fid: u64) -> GeobinResult<Option<Feature>> {
        let count = self.header.features_count;
        if count > 0 && fid >= count {
            return Ok(None);
        }

        let offset = if self.header.has_index() && count > 0 {
            let index_offset = self.index_offset;
            let source = &mut self.source;
            let cursor = &mut self.cursor;
            read_feature_offset(count, fid, |buf, offset| {
                read_exact_at(source, cursor, index_offset + offset, buf, "leaf node")
            })?
        } else {
            let mut offset = 0u64;
            for _ in 0..fid {
                match self.read_length(offset, count == 0)? {
                    Some(len) => offset += (RECORD_PREFIX_SIZE + len) as u64,
                    None => return Ok(None),
                }
            }
            offset
        };

        match self.read_record(offset, count == 0)? {
            Some(len) => Ok(Some(self.decode_buffered(fid, len)?)),
            None => Ok(None),
        }
    }

    fn count_features(&mut self) -> GeobinResult<u64> {
        let mut count = 0u64;
        if self.filter.is_none() {
            let mut offset = 0u64;
            while let Some(len) = self.read_length(offset, true)? {
                offset += (RECORD_PREFIX_SIZE + len) as u64;
                count += 1;
            }
        } else {
            while self.next_feature()?.is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn scan_extent(&mut self) -> GeobinResult<Option<BoundingBox>> {
        let mut extent = BoundingBox::empty();
        while let Some((_, len)) = self.advance()? {
            if let Some(bbox) = self.buffered_bbox(len)? {
                extent.expand(&bbox);
            }
        }
        Ok((!extent.is_empty()).then_some(extent))
    }

    fn decode_buffered(&self, fid: u64, len: usize) -> GeobinResult<Feature> {
        let (geometry, properties) = decode_feature(
            self.buffer.slice(len),
            &self.header.columns,
            &self.options.projection,
            self.header.geometry_kind,
            self.header.dimensions(),
            self.options.verify_buffers,
        )?;
        Ok(Feature {
            fid: Some(fid),
            geometry,
            properties,
        })
    }

    /// Bounding box of the geometry of the buffered record.
    fn buffered_bbox(&self, len: usize) -> GeobinResult<Option<BoundingBox>> {
        let record = parse_record(self.buffer.slice(len), self.options.verify_buffers)?;
        match record.geometry {
            Some(bytes) => Ok(decode_geometry(
                bytes,
                self.header.geometry_kind,
                self.header.dimensions(),
            )?
            .bounding_box()),
            None => Ok(None),
        }
    }

    /// Reads and checks the length prefix of the record at `offset`.
    ///
    /// With `allow_eof`, a record boundary at the end of the source ends the
    /// layer; otherwise it means features are missing.
    fn read_length(&mut self, offset: u64, allow_eof: bool) -> GeobinResult<Option<usize>> {
        let pos = self.features_offset.checked_add(offset).ok_or_else(|| {
            GeobinError::corrupt(format!("feature offset {} out of range", offset))
        })?;
        let remaining = self.file_size.saturating_sub(pos);
        if remaining == 0 {
            if allow_eof {
                return Ok(None);
            }
            return Err(GeobinError::corrupt(format!(
                "end of data at feature offset {}, header declares {} features",
                offset, self.header.features_count
            )));
        }
        if remaining < RECORD_PREFIX_SIZE as u64 {
            return Err(GeobinError::corrupt(format!(
                "truncated feature size at offset {}",
                offset
            )));
        }

        let mut prefix = [0u8; RECORD_PREFIX_SIZE];
        read_exact_at(&mut self.source, &mut self.cursor, pos, &mut prefix, "feature size")?;
        let len = u32::from_le_bytes(prefix) as usize;
        if len > FEATURE_MAX_BUFFER_SIZE {
            return Err(GeobinError::corrupt(format!(
                "feature size {} at offset {} exceeds the maximum of {}",
                len, offset, FEATURE_MAX_BUFFER_SIZE
            )));
        }
        if len as u64 > remaining - RECORD_PREFIX_SIZE as u64 {
            return Err(GeobinError::corrupt(format!(
                "feature size {} at offset {} exceeds the {} bytes left",
                len,
                offset,
                remaining - RECORD_PREFIX_SIZE as u64
            )));
        }
        Ok(Some(len))
    }

    /// Reads the record at `offset` into the buffer and returns its body
    /// length.
    fn read_record(&mut self, offset: u64, allow_eof: bool) -> GeobinResult<Option<usize>> {
        let Some(len) = self.read_length(offset, allow_eof)? else {
            return Ok(None);
        };
        self.buffer.ensure(len)?;
        let pos = self.features_offset + offset + RECORD_PREFIX_SIZE as u64;
        read_exact_at(
            &mut self.source,
            &mut self.cursor,
            pos,
            self.buffer.slice_mut(len),
            "feature",
        )?;
        Ok(Some(len))
    }
}

/// Reads `buf.len()` bytes at `pos`, seeking only when `cursor` says the
/// source is elsewhere.
fn read_exact_at<R: Read + Seek>(
    source: &mut R,
    cursor: &mut u64,
    pos: u64,
    buf: &mut [u8],
    what: &str,
) -> GeobinResult<()> {
    if *cursor != pos {
        *cursor = u64::MAX;
        source.seek(SeekFrom::Start(pos))?;
    }
    *cursor = u64::MAX;
    source
        .read_exact(buf)
        .map_err(|e| GeobinError::from_read(e, what))?;
    *cursor = pos + buf.len() as u64;
    Ok(())
}

fn geometry_intersects(
    bytes: Option<&[u8]>,
    filter: &BoundingBox,
    kind: GeometryKind,
    dims: Dimensions,
) -> GeobinResult<bool> {
    let Some(bytes) = bytes else {
        return Ok(false);
    };
    Ok(decode_geometry(bytes, kind, dims)?
        .bounding_box()
        .is_some_and(|bbox| bbox.intersects(filter)))
}
