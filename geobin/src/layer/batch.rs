//! Columnar feature batches.

use chrono::{DateTime, FixedOffset};

use crate::codec::properties::{ColumnType, ColumnValue};
use crate::codec::Projection;
use crate::header::Column;

/// Variable-length values packed end to end.
///
/// Value `i` occupies `data[offsets[i]..offsets[i + 1]]`; `validity[i]` is
/// false for null entries, which occupy zero bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryColumn {
    pub offsets: Vec<usize>,
    pub data: Vec<u8>,
    pub validity: Vec<bool>,
}

impl Default for BinaryColumn {
    fn default() -> Self {
        BinaryColumn::new()
    }
}

impl BinaryColumn {
    pub fn new() -> Self {
        BinaryColumn {
            offsets: vec![0],
            data: Vec::new(),
            validity: Vec::new(),
        }
    }

    pub fn push(&mut self, value: Option<&[u8]>) {
        if let Some(bytes) = value {
            self.data.extend_from_slice(bytes);
        }
        self.offsets.push(self.data.len());
        self.validity.push(value.is_some());
    }

    pub fn len(&self) -> usize {
        self.validity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validity.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        if !*self.validity.get(index)? {
            return None;
        }
        Some(&self.data[self.offsets[index]..self.offsets[index + 1]])
    }

    pub fn null_count(&self) -> usize {
        self.validity.iter().filter(|v| !**v).count()
    }
}

/// One attribute column of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnArray {
    Byte(Vec<Option<i8>>),
    UByte(Vec<Option<u8>>),
    Bool(Vec<Option<bool>>),
    Short(Vec<Option<i16>>),
    UShort(Vec<Option<u16>>),
    Int(Vec<Option<i32>>),
    UInt(Vec<Option<u32>>),
    Long(Vec<Option<i64>>),
    ULong(Vec<Option<u64>>),
    Float(Vec<Option<f32>>),
    Double(Vec<Option<f64>>),
    String(BinaryColumn),
    Json(BinaryColumn),
    DateTime(Vec<Option<DateTime<FixedOffset>>>),
    Binary(BinaryColumn),
}

impl ColumnArray {
    pub fn new(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Byte => ColumnArray::Byte(Vec::new()),
            ColumnType::UByte => ColumnArray::UByte(Vec::new()),
            ColumnType::Bool => ColumnArray::Bool(Vec::new()),
            ColumnType::Short => ColumnArray::Short(Vec::new()),
            ColumnType::UShort => ColumnArray::UShort(Vec::new()),
            ColumnType::Int => ColumnArray::Int(Vec::new()),
            ColumnType::UInt => ColumnArray::UInt(Vec::new()),
            ColumnType::Long => ColumnArray::Long(Vec::new()),
            ColumnType::ULong => ColumnArray::ULong(Vec::new()),
            ColumnType::Float => ColumnArray::Float(Vec::new()),
            ColumnType::Double => ColumnArray::Double(Vec::new()),
            ColumnType::String => ColumnArray::String(BinaryColumn::new()),
            ColumnType::Json => ColumnArray::Json(BinaryColumn::new()),
            ColumnType::DateTime => ColumnArray::DateTime(Vec::new()),
            ColumnType::Binary => ColumnArray::Binary(BinaryColumn::new()),
        }
    }

    /// Appends a value. A value of another type is stored as null.
    pub fn push(&mut self, value: Option<&ColumnValue>) {
        match (self, value) {
            (ColumnArray::Byte(v), Some(ColumnValue::Byte(x))) => v.push(Some(*x)),
            (ColumnArray::Byte(v), _) => v.push(None),
            (ColumnArray::UByte(v), Some(ColumnValue::UByte(x))) => v.push(Some(*x)),
            (ColumnArray::UByte(v), _) => v.push(None),
            (ColumnArray::Bool(v), Some(ColumnValue::Bool(x))) => v.push(Some(*x)),
            (ColumnArray::Bool(v), _) => v.push(None),
            (ColumnArray::Short(v), Some(ColumnValue::Short(x))) => v.push(Some(*x)),
            (ColumnArray::Short(v), _) => v.push(None),
            (ColumnArray::UShort(v), Some(ColumnValue::UShort(x))) => v.push(Some(*x)),
            (ColumnArray::UShort(v), _) => v.push(None),
            (ColumnArray::Int(v), Some(ColumnValue::Int(x))) => v.push(Some(*x)),
            (ColumnArray::Int(v), _) => v.push(None),
            (ColumnArray::UInt(v), Some(ColumnValue::UInt(x))) => v.push(Some(*x)),
            (ColumnArray::UInt(v), _) => v.push(None),
            (ColumnArray::Long(v), Some(ColumnValue::Long(x))) => v.push(Some(*x)),
            (ColumnArray::Long(v), _) => v.push(None),
            (ColumnArray::ULong(v), Some(ColumnValue::ULong(x))) => v.push(Some(*x)),
            (ColumnArray::ULong(v), _) => v.push(None),
            (ColumnArray::Float(v), Some(ColumnValue::Float(x))) => v.push(Some(*x)),
            (ColumnArray::Float(v), _) => v.push(None),
            (ColumnArray::Double(v), Some(ColumnValue::Double(x))) => v.push(Some(*x)),
            (ColumnArray::Double(v), _) => v.push(None),
            (ColumnArray::String(c), Some(ColumnValue::String(s))) => c.push(Some(s.as_bytes())),
            (ColumnArray::String(c), _) => c.push(None),
            (ColumnArray::Json(c), Some(ColumnValue::Json(s))) => c.push(Some(s.as_bytes())),
            (ColumnArray::Json(c), _) => c.push(None),
            (ColumnArray::DateTime(v), Some(ColumnValue::DateTime(x))) => v.push(Some(*x)),
            (ColumnArray::DateTime(v), _) => v.push(None),
            (ColumnArray::Binary(c), Some(ColumnValue::Binary(b))) => c.push(Some(b)),
            (ColumnArray::Binary(c), _) => c.push(None),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnArray::Byte(v) => v.len(),
            ColumnArray::UByte(v) => v.len(),
            ColumnArray::Bool(v) => v.len(),
            ColumnArray::Short(v) => v.len(),
            ColumnArray::UShort(v) => v.len(),
            ColumnArray::Int(v) => v.len(),
            ColumnArray::UInt(v) => v.len(),
            ColumnArray::Long(v) => v.len(),
            ColumnArray::ULong(v) => v.len(),
            ColumnArray::Float(v) => v.len(),
            ColumnArray::Double(v) => v.len(),
            ColumnArray::DateTime(v) => v.len(),
            ColumnArray::String(c) | ColumnArray::Json(c) | ColumnArray::Binary(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `index` as a [`ColumnValue`], `None` for nulls.
    pub fn get(&self, index: usize) -> Option<ColumnValue> {
        match self {
            ColumnArray::Byte(v) => v.get(index).copied().flatten().map(ColumnValue::Byte),
            ColumnArray::UByte(v) => v.get(index).copied().flatten().map(ColumnValue::UByte),
            ColumnArray::Bool(v) => v.get(index).copied().flatten().map(ColumnValue::Bool),
            ColumnArray::Short(v) => v.get(index).copied().flatten().map(ColumnValue::Short),
            ColumnArray::UShort(v) => v.get(index).copied().flatten().map(ColumnValue::UShort),
            ColumnArray::Int(v) => v.get(index).copied().flatten().map(ColumnValue::Int),
            ColumnArray::UInt(v) => v.get(index).copied().flatten().map(ColumnValue::UInt),
            ColumnArray::Long(v) => v.get(index).copied().flatten().map(ColumnValue::Long),
            ColumnArray::ULong(v) => v.get(index).copied().flatten().map(ColumnValue::ULong),
            ColumnArray::Float(v) => v.get(index).copied().flatten().map(ColumnValue::Float),
            ColumnArray::Double(v) => v.get(index).copied().flatten().map(ColumnValue::Double),
            ColumnArray::DateTime(v) => v.get(index).copied().flatten().map(ColumnValue::DateTime),
            ColumnArray::String(c) => c
                .get(index)
                .map(|b| ColumnValue::String(String::from_utf8_lossy(b).into_owned())),
            ColumnArray::Json(c) => c
                .get(index)
                .map(|b| ColumnValue::Json(String::from_utf8_lossy(b).into_owned())),
            ColumnArray::Binary(c) => c.get(index).map(|b| ColumnValue::Binary(b.to_vec())),
        }
    }

    /// Bytes held in the packed data buffer; zero for fixed-width arrays.
    pub fn payload_len(&self) -> usize {
        match self {
            ColumnArray::String(c) | ColumnArray::Json(c) | ColumnArray::Binary(c) => c.data.len(),
            _ => 0,
        }
    }

    fn is_variable(&self) -> bool {
        matches!(
            self,
            ColumnArray::String(_) | ColumnArray::Json(_) | ColumnArray::Binary(_)
        )
    }
}

/// Features in columnar form, as returned by
/// [`LayerReader::next_batch`](crate::layer::LayerReader::next_batch).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    pub fids: Vec<u64>,
    /// Encoded geometries, `None` when the geometry is ignored.
    pub geometry: Option<BinaryColumn>,
    /// One entry per layer column, `None` for ignored columns.
    pub columns: Vec<Option<ColumnArray>>,
}

impl FeatureBatch {
    pub fn len(&self) -> usize {
        self.fids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fids.is_empty()
    }

    pub fn geometry_bytes(&self, row: usize) -> Option<&[u8]> {
        self.geometry.as_ref()?.get(row)
    }

    pub fn column(&self, index: usize) -> Option<&ColumnArray> {
        self.columns.get(index)?.as_ref()
    }
}

/// Accumulates rows and enforces the per-column memory limit.
pub(crate) struct BatchBuilder {
    batch: FeatureBatch,
    memory_limit: usize,
}

impl BatchBuilder {
    pub(crate) fn new(columns: &[Column], projection: &Projection, memory_limit: usize) -> Self {
        let arrays = columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                (!projection.is_column_ignored(i)).then(|| ColumnArray::new(column.column_type))
            })
            .collect();
        BatchBuilder {
            batch: FeatureBatch {
                fids: Vec::new(),
                geometry: (!projection.is_geometry_ignored()).then(BinaryColumn::new),
                columns: arrays,
            },
            memory_limit,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.batch.len()
    }

    /// Whether the row fits without pushing a variable-length column past
    /// the memory limit. The first row of a batch always fits.
    pub(crate) fn accepts(&self, geometry: Option<&[u8]>, values: &[Option<ColumnValue>]) -> bool {
        if self.batch.is_empty() {
            return true;
        }
        if let (Some(column), Some(bytes)) = (&self.batch.geometry, geometry) {
            if column.data.len() + bytes.len() > self.memory_limit {
                return false;
            }
        }
        for (array, value) in self.batch.columns.iter().zip(values) {
            if let (Some(array), Some(value)) = (array, value) {
                if array.is_variable() && array.payload_len() + value.payload_len() > self.memory_limit {
                    return false;
                }
            }
        }
        true
    }

    pub(crate) fn push(&mut self, fid: u64, geometry: Option<&[u8]>, values: &[Option<ColumnValue>]) {
        self.batch.fids.push(fid);
        if let Some(column) = self.batch.geometry.as_mut() {
            column.push(geometry);
        }
        for (i, array) in self.batch.columns.iter_mut().enumerate() {
            if let Some(array) = array {
                array.push(values.get(i).and_then(|v| v.as_ref()));
            }
        }
    }

    pub(crate) fn finish(self) -> FeatureBatch {
        self.batch
    }
}
