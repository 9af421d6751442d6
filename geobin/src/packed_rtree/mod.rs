//! Packed Hilbert R-tree.
//!
//! The tree is a flat array of [`NodeItem`]s grouped by level, stored with
//! the leaves first and the root last. Every level except the root level is
//! cut into runs of `node_size` consecutive items; each run has one parent
//! on the level above. Positions are derived from the level bounds table,
//! so the tree needs no pointers beyond the first-child offset each parent
//! carries.
//!
//! ## Layout for 3 items, node size 2
//! ```text
//! index:  0   1   2 | 3   4 | 5
//! level:  leaves    | 1     | root
//! ```

mod node_item;
mod search;
mod tree;

use std::ops::Range;

use crate::errors::{GeobinError, GeobinResult};

pub use node_item::{NodeItem, NODE_ITEM_SIZE};
pub use search::{read_feature_offset, stream_search, SearchResultItem};
pub use tree::{stream_write_from_fill, PackedRTree};

/// Node size used when the writer is not told otherwise.
pub const DEFAULT_NODE_SIZE: u16 = 16;

pub(crate) fn check_node_size(node_size: u16) -> GeobinResult<()> {
    if node_size < 2 {
        return Err(GeobinError::invalid(format!(
            "node size must be at least 2, got {}",
            node_size
        )));
    }
    Ok(())
}

/// Node index ranges of every level, leaves first.
///
/// Level 0 is `[0, num_items)`. Each following level holds
/// `ceil(previous / node_size)` nodes, and at least one level is always
/// added above the leaves, so a single item still gets a root. Zero items
/// give an empty table.
pub fn level_bounds(num_items: u64, node_size: u16) -> GeobinResult<Vec<Range<u64>>> {
    check_node_size(node_size)?;
    if num_items == 0 {
        return Ok(Vec::new());
    }

    let node_size = node_size as u64;
    let mut counts = vec![num_items];
    let mut n = num_items;
    loop {
        n = n.div_ceil(node_size);
        counts.push(n);
        if n == 1 {
            break;
        }
    }

    let mut bounds = Vec::with_capacity(counts.len());
    let mut start = 0u64;
    for count in counts {
        let end = start
            .checked_add(count)
            .ok_or_else(|| GeobinError::invalid("index node count overflows"))?;
        bounds.push(start..end);
        start = end;
    }
    Ok(bounds)
}

/// Total number of nodes of a tree over `num_items` leaves.
pub fn num_nodes(num_items: u64, node_size: u16) -> GeobinResult<u64> {
    Ok(level_bounds(num_items, node_size)?
        .last()
        .map_or(0, |root| root.end))
}

/// Byte size of the serialized tree, computed without building it.
pub fn index_size(num_items: u64, node_size: u16) -> GeobinResult<u64> {
    num_nodes(num_items, node_size)?
        .checked_mul(NODE_ITEM_SIZE as u64)
        .ok_or_else(|| GeobinError::invalid("index size overflows"))
}
