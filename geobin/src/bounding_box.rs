/// A 2D axis-aligned bounding box represented by minimum and maximum coordinates.
///
/// `BoundingBox` is used for feature envelopes, the layer extent stored in
/// the header, and spatial filter windows. All comparisons treat the box as
/// closed on every side, so boxes that only share an edge or a corner
/// intersect.
///
/// # Examples
///
/// ```rust
/// use geobin::BoundingBox;
///
/// let bbox = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
/// assert!(bbox.contains_point(50.0, 50.0));
/// assert!(bbox.intersects(&BoundingBox::new(100.0, 100.0, 200.0, 200.0)));
/// ```
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct BoundingBox {
    /// Minimum X coordinate
    pub min_x: f64,
    /// Minimum Y coordinate
    pub min_y: f64,
    /// Maximum X coordinate
    pub max_x: f64,
    /// Maximum Y coordinate
    pub max_y: f64,
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoundingBox({}, {}, {}, {})", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

impl BoundingBox {
    /// Creates a new bounding box with the specified coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> BoundingBox {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// An inverted box that any `expand` call replaces.
    pub fn empty() -> BoundingBox {
        BoundingBox {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    /// Box of a single point.
    pub fn from_point(x: f64, y: f64) -> BoundingBox {
        BoundingBox::new(x, y, x, y)
    }

    /// Builds a box from the `[min_x, min_y, max_x, max_y]` envelope layout
    /// used in the file header.
    pub fn from_envelope(envelope: [f64; 4]) -> BoundingBox {
        BoundingBox::new(envelope[0], envelope[1], envelope[2], envelope[3])
    }

    pub fn to_envelope(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    /// Returns the width of the bounding box.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Returns the height of the bounding box.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Returns the center point of the bounding box.
    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Checks if this bounding box contains a point.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Checks if this bounding box contains another bounding box.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x && other.max_x <= self.max_x
            && other.min_y >= self.min_y && other.max_y <= self.max_y
    }

    /// Checks if this bounding box intersects another bounding box.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x && self.max_x >= other.min_x
            && self.min_y <= other.max_y && self.max_y >= other.min_y
    }

    /// Returns the union of this bounding box with another.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Grows this box in place to cover `other`.
    pub fn expand(&mut self, other: &BoundingBox) {
        *self = self.union(other);
    }

    pub fn expand_to_point(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// True for the inverted box produced by [`BoundingBox::empty`] and for
    /// any box whose minimum exceeds its maximum.
    pub fn is_empty(&self) -> bool {
        !(self.min_x <= self.max_x && self.min_y <= self.max_y)
    }

    /// All four coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(bbox.min_x, 1.0);
        assert_eq!(bbox.min_y, 2.0);
        assert_eq!(bbox.max_x, 3.0);
        assert_eq!(bbox.max_y, 4.0);
    }

    #[test]
    fn test_empty_is_replaced_by_expand() {
        let mut bbox = BoundingBox::empty();
        assert!(bbox.is_empty());
        bbox.expand(&BoundingBox::new(1.0, 1.0, 2.0, 2.0));
        assert_eq!(bbox, BoundingBox::new(1.0, 1.0, 2.0, 2.0));
        assert!(!bbox.is_empty());
    }

    #[test]
    fn test_expand_to_point() {
        let mut bbox = BoundingBox::empty();
        bbox.expand_to_point(3.0, -1.0);
        bbox.expand_to_point(-2.0, 4.0);
        assert_eq!(bbox, BoundingBox::new(-2.0, -1.0, 3.0, 4.0));
    }

    #[test]
    fn test_center() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let (cx, cy) = bbox.center();
        assert_eq!(cx, 5.0);
        assert_eq!(cy, 5.0);
    }

    #[test]
    fn test_contains_point() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);

        assert!(bbox.contains_point(5.0, 5.0));
        assert!(bbox.contains_point(0.0, 0.0));
        assert!(bbox.contains_point(10.0, 10.0));
        assert!(!bbox.contains_point(-1.0, 5.0));
        assert!(!bbox.contains_point(11.0, 5.0));
    }

    #[test]
    fn test_contains_bbox() {
        let outer = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let inner = BoundingBox::new(2.0, 2.0, 8.0, 8.0);
        let partial = BoundingBox::new(5.0, 5.0, 15.0, 15.0);

        assert!(outer.contains(&inner));
        assert!(outer.contains(&outer));
        assert!(!outer.contains(&partial));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn test_intersects() {
        let bbox1 = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let bbox2 = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let bbox3 = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        let corner = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        let edge = BoundingBox::new(10.0, -5.0, 12.0, 0.0);

        assert!(bbox1.intersects(&bbox2));
        assert!(bbox2.intersects(&bbox1));
        assert!(!bbox1.intersects(&bbox3));
        assert!(bbox1.intersects(&corner));
        assert!(bbox1.intersects(&edge));
    }

    #[test]
    fn test_union() {
        let union = BoundingBox::new(0.0, 0.0, 5.0, 5.0).union(&BoundingBox::new(3.0, 3.0, 10.0, 10.0));
        assert_eq!(union, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_envelope_layout() {
        let bbox = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);
        assert_eq!(bbox.to_envelope(), [-180.0, -90.0, 180.0, 90.0]);
        assert_eq!(BoundingBox::from_envelope(bbox.to_envelope()), bbox);
    }

    #[test]
    fn test_nan_box_is_not_finite() {
        let bbox = BoundingBox::from_envelope([f64::NAN; 4]);
        assert!(!bbox.is_finite());
        assert!(bbox.is_empty());
        assert!(BoundingBox::from_point(1.0, 1.0).is_finite());
    }

    #[test]
    fn test_display() {
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(format!("{}", bbox), "BoundingBox(1, 2, 3, 4)");
    }
}
