//! Hilbert curve ordering for packed R-tree leaves.
//!
//! The Hilbert curve maps 2D grid cells to a 1D distance while preserving
//! spatial locality. Leaves are sorted by the Hilbert distance of their box
//! centre so that neighbouring features end up in the same tree nodes and
//! in nearby positions of the feature section.
//!
//! ## Grid
//! Centres are quantised into a `2^16 x 2^16` grid spanning the global
//! extent. An axis with zero width maps every centre to the middle cell.

use crate::bounding_box::BoundingBox;

/// Largest cell coordinate on either axis of the quantisation grid.
pub const HILBERT_MAX: u32 = (1 << 16) - 1;

/// Hilbert distance of a grid cell.
///
/// `x` and `y` must be in `[0, HILBERT_MAX]`.
///
/// # Example
/// ```
/// use geobin::hilbert::{hilbert_index, HILBERT_MAX};
///
/// assert_eq!(hilbert_index(0, 0), 0);
/// assert!(hilbert_index(HILBERT_MAX, 0) > hilbert_index(0, HILBERT_MAX));
/// ```
pub fn hilbert_index(x: u32, y: u32) -> u32 {
    debug_assert!(x <= HILBERT_MAX && y <= HILBERT_MAX, "cell out of grid");
    xy2d(HILBERT_MAX as u64 + 1, x as u64, y as u64) as u32
}

/// Quantises the centre of `bbox` over `extent` and returns its Hilbert
/// distance.
pub fn hilbert_bbox(bbox: &BoundingBox, extent: &BoundingBox) -> u32 {
    let (cx, cy) = bbox.center();
    hilbert_index(
        quantise(cx, extent.min_x, extent.width()),
        quantise(cy, extent.min_y, extent.height()),
    )
}

fn quantise(value: f64, min: f64, range: f64) -> u32 {
    if range > 0.0 {
        let norm = ((value - min) / range).clamp(0.0, 1.0);
        (norm * HILBERT_MAX as f64).floor() as u32
    } else {
        HILBERT_MAX / 2
    }
}

/// Stable sort of `items` by the Hilbert distance of their boxes over
/// `extent`. Equal distances keep insertion order, so identical input always
/// produces the identical order.
pub fn hilbert_sort<T, F>(items: &mut [T], extent: &BoundingBox, bbox_of: F)
where
    F: Fn(&T) -> BoundingBox,
{
    items.sort_by_cached_key(|item| hilbert_bbox(&bbox_of(item), extent));
}

/// Converts (x, y) coordinates on the Hilbert curve to a 1D distance.
fn xy2d(n: u64, x: u64, y: u64) -> u64 {
    let mut d = 0u64;
    let mut x = x;
    let mut y = y;
    let mut s = n / 2;

    while s > 0 {
        let rx = ((x & s) > 0) as u64;
        let ry = ((y & s) > 0) as u64;
        d += s * s * ((3 * rx) ^ ry);
        rotate(s, &mut x, &mut y, rx, ry);
        s /= 2;
    }

    d
}

/// Rotates and reflects the quadrant so the sub-curve has the right orientation.
fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n.wrapping_sub(1).wrapping_sub(*x);
            *y = n.wrapping_sub(1).wrapping_sub(*y);
        }
        std::mem::swap(x, y);
    }
}
