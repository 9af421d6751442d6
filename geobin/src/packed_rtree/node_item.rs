use crate::bounding_box::BoundingBox;
use crate::codec::le::{ByteReader, ByteWriter};
use crate::errors::GeobinResult;

/// Serialized size of a [`NodeItem`].
pub const NODE_ITEM_SIZE: usize = 40;

/// One entry of the packed tree: a box and an offset.
///
/// For a leaf the offset is the byte offset of the feature record within the
/// feature section. For an internal node it is the byte offset of the node's
/// first child within the index section.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeItem {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub offset: u64,
}

impl NodeItem {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, offset: u64) -> Self {
        NodeItem {
            min_x,
            min_y,
            max_x,
            max_y,
            offset,
        }
    }

    pub fn from_bbox(bbox: &BoundingBox, offset: u64) -> Self {
        NodeItem::new(bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y, offset)
    }

    /// Inverted box with offset 0, the identity for [`NodeItem::expand`].
    pub fn empty() -> Self {
        NodeItem::from_bbox(&BoundingBox::empty(), 0)
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.min_x, self.min_y, self.max_x, self.max_y)
    }

    /// Grows the box to cover `other`; the offset is left alone.
    pub fn expand(&mut self, other: &NodeItem) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    /// Closed-interval overlap with `query`.
    #[inline]
    pub fn intersects(&self, query: &BoundingBox) -> bool {
        self.min_x <= query.max_x
            && self.max_x >= query.min_x
            && self.min_y <= query.max_y
            && self.max_y >= query.min_y
    }

    pub fn write_to(&self, w: &mut ByteWriter) {
        w.write_f64(self.min_x);
        w.write_f64(self.min_y);
        w.write_f64(self.max_x);
        w.write_f64(self.max_y);
        w.write_u64(self.offset);
    }

    pub fn read_from(r: &mut ByteReader<'_>) -> GeobinResult<NodeItem> {
        Ok(NodeItem {
            min_x: r.read_f64("node min_x")?,
            min_y: r.read_f64("node min_y")?,
            max_x: r.read_f64("node max_x")?,
            max_y: r.read_f64("node max_y")?,
            offset: r.read_u64("node offset")?,
        })
    }
}
