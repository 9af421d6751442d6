//! File preamble: magic bytes, header length and the layer header.
//!
//! The header is serialized with bincode's legacy configuration, which
//! writes fixed-width little-endian integers. The feature count and the
//! envelope therefore always occupy the same bytes, so a placeholder
//! header can be rewritten in place once the final values are known.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::codec::le::ByteWriter;
use crate::codec::properties::ColumnType;
use crate::errors::{GeobinError, GeobinResult};
use crate::geometry::{Dimensions, GeometryKind};

/// Magic bytes at the start of every file. The fourth byte is the major
/// version, the eighth the patch version.
pub const MAGIC: [u8; 8] = *b"gbn\x01gbn\x00";

/// Largest accepted header, in bytes.
pub const HEADER_MAX_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Upper bound on the feature count a header may declare.
pub const MAX_FEATURE_COUNT: u64 = 100_000_000_000;

/// Opaque coordinate reference system descriptor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Crs {
    pub org: String,
    pub code: i32,
    pub name: String,
    pub description: String,
    pub wkt: String,
    pub code_string: String,
}

impl Crs {
    /// Descriptor with an authority and code only, e.g. `("EPSG", 4326)`.
    pub fn from_code(org: &str, code: i32) -> Self {
        Crs {
            org: org.to_string(),
            code,
            ..Default::default()
        }
    }
}

/// Attribute column schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub title: String,
    pub description: String,
    /// -1 when unset
    pub width: i32,
    /// -1 when unset
    pub precision: i32,
    /// -1 when unset
    pub scale: i32,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
}

impl Column {
    /// A nullable column with no width, precision or scale.
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Column {
            name: name.to_string(),
            column_type,
            title: String::new(),
            description: String::new(),
            width: -1,
            precision: -1,
            scale: -1,
            nullable: true,
            unique: false,
            primary_key: false,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_width(mut self, width: i32) -> Self {
        self.width = width;
        self
    }

    pub fn with_precision(mut self, precision: i32, scale: i32) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Layer header.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Header {
    pub name: String,
    /// `[min_x, min_y, max_x, max_y]`, NaN when unknown
    pub envelope: [f64; 4],
    pub geometry_kind: GeometryKind,
    pub has_z: bool,
    pub has_m: bool,
    pub columns: Vec<Column>,
    /// 0 when unknown
    pub features_count: u64,
    /// 0 when the file has no spatial index
    pub index_node_size: u16,
    pub crs: Option<Crs>,
    pub title: String,
    pub description: String,
    /// JSON object text, empty when absent
    pub metadata: String,
}

impl Header {
    pub fn new(name: &str, geometry_kind: GeometryKind, dims: Dimensions) -> Self {
        Header {
            name: name.to_string(),
            envelope: [f64::NAN; 4],
            geometry_kind,
            has_z: dims.has_z,
            has_m: dims.has_m,
            columns: Vec::new(),
            features_count: 0,
            index_node_size: 0,
            crs: None,
            title: String::new(),
            description: String::new(),
            metadata: String::new(),
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.has_z, self.has_m)
    }

    /// The layer extent, `None` when the envelope is unknown.
    pub fn extent(&self) -> Option<BoundingBox> {
        let bbox = BoundingBox::from_envelope(self.envelope);
        if bbox.is_finite() && !bbox.is_empty() {
            Some(bbox)
        } else {
            None
        }
    }

    pub fn set_extent(&mut self, extent: Option<BoundingBox>) {
        self.envelope = match extent {
            Some(bbox) if !bbox.is_empty() => bbox.to_envelope(),
            _ => [f64::NAN; 4],
        };
    }

    pub fn has_index(&self) -> bool {
        self.index_node_size > 0
    }

    /// Parses the metadata text as a JSON object. Empty text is an empty map.
    pub fn metadata_map(&self) -> GeobinResult<serde_json::Map<String, serde_json::Value>> {
        if self.metadata.is_empty() {
            return Ok(serde_json::Map::new());
        }
        serde_json::from_str(&self.metadata)
            .map_err(|e| GeobinError::corrupt(format!("header metadata: {}", e)))
    }

    /// Checks the values a reader relies on before using the header to size
    /// anything.
    pub fn validate(&self) -> GeobinResult<()> {
        if self.features_count > MAX_FEATURE_COUNT {
            return Err(GeobinError::corrupt(format!(
                "header declares {} features, more than {}",
                self.features_count, MAX_FEATURE_COUNT
            )));
        }
        if self.index_node_size == 1 {
            return Err(GeobinError::corrupt("index node size 1 is not allowed"));
        }
        if self.columns.len() > u16::MAX as usize + 1 {
            return Err(GeobinError::corrupt(format!(
                "header declares {} columns",
                self.columns.len()
            )));
        }
        Ok(())
    }

    pub fn encode(&self) -> GeobinResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::legacy())
            .map_err(|e| GeobinError::invalid(format!("header encoding failed: {}", e)))
    }

    pub fn decode(bytes: &[u8]) -> GeobinResult<Header> {
        let config = bincode::config::legacy().with_limit::<{ HEADER_MAX_BUFFER_SIZE }>();
        let (header, used): (Header, usize) = bincode::serde::decode_from_slice(bytes, config)
            .map_err(|e| GeobinError::corrupt(format!("header decoding failed: {}", e)))?;
        if used != bytes.len() {
            return Err(GeobinError::corrupt(format!(
                "{} trailing bytes after header",
                bytes.len() - used
            )));
        }
        Ok(header)
    }

    /// Magic, header length and header, ready to be written at offset 0.
    pub fn to_preamble(&self) -> GeobinResult<Vec<u8>> {
        let header = self.encode()?;
        if header.len() > HEADER_MAX_BUFFER_SIZE {
            return Err(GeobinError::invalid(format!(
                "header of {} bytes exceeds {}",
                header.len(),
                HEADER_MAX_BUFFER_SIZE
            )));
        }
        let mut w = ByteWriter::with_capacity(MAGIC.len() + 4 + header.len());
        w.write_bytes(&MAGIC);
        w.write_u32(header.len() as u32);
        w.write_bytes(&header);
        Ok(w.into_inner())
    }

    /// Reads and validates the preamble. Returns the header and the number
    /// of bytes consumed.
    pub fn read_preamble<R: Read>(reader: &mut R) -> GeobinResult<(Header, u64)> {
        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .map_err(|e| GeobinError::from_read(e, "magic bytes"))?;
        if magic[0..3] != MAGIC[0..3] || magic[4..7] != MAGIC[4..7] {
            return Err(GeobinError::corrupt("not a geobin file (bad magic)"));
        }
        if magic[3] != MAGIC[3] {
            return Err(GeobinError::corrupt(format!(
                "unsupported major version {}",
                magic[3]
            )));
        }

        let mut len_bytes = [0u8; 4];
        reader
            .read_exact(&mut len_bytes)
            .map_err(|e| GeobinError::from_read(e, "header size"))?;
        let header_size = u32::from_le_bytes(len_bytes) as usize;
        if header_size > HEADER_MAX_BUFFER_SIZE {
            return Err(GeobinError::corrupt(format!(
                "header size {} exceeds {}",
                header_size, HEADER_MAX_BUFFER_SIZE
            )));
        }
        log::debug!("header size: {}", header_size);

        let mut bytes = vec![0u8; header_size];
        reader
            .read_exact(&mut bytes)
            .map_err(|e| GeobinError::from_read(e, "header"))?;
        let header = Header::decode(&bytes)?;
        header.validate()?;
        Ok((header, (MAGIC.len() + 4 + header_size) as u64))
    }
}
