use std::collections::VecDeque;
use std::ops::Range;

use crate::bounding_box::BoundingBox;
use crate::codec::le::ByteReader;
use crate::errors::{GeobinError, GeobinResult};
use crate::packed_rtree::level_bounds;
use crate::packed_rtree::node_item::{NodeItem, NODE_ITEM_SIZE};

/// Upper bound on nodes fetched by one merged read.
const MAX_READ_NODES: u64 = 4096;

/// A leaf hit: the feature's byte offset within the feature section and
/// its leaf position, which is also its FID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SearchResultItem {
    pub offset: u64,
    pub index: u64,
}

/// Searches a serialized tree without loading it.
///
/// `read(buf, byte_offset)` must fill `buf` with the index bytes starting at
/// `byte_offset` (relative to the start of the index section). Node ranges
/// are visited breadth-first from the root; ranges on the same level that
/// follow each other are fetched with a single read. Child offsets are
/// checked for alignment and for landing on the level below before they are
/// followed. Results are sorted by feature offset.
pub fn stream_search<F>(
    num_items: u64,
    node_size: u16,
    query: &BoundingBox,
    mut read: F,
) -> GeobinResult<Vec<SearchResultItem>>
where
    F: FnMut(&mut [u8], u64) -> GeobinResult<()>,
{
    let bounds = level_bounds(num_items, node_size)?;
    let Some(root_level) = bounds.len().checked_sub(1) else {
        return Ok(Vec::new());
    };

    let mut queue: VecDeque<(Range<u64>, usize)> = VecDeque::new();
    queue.push_back((bounds[root_level].clone(), root_level));
    let mut results = Vec::new();
    let mut buf = Vec::new();
    let mut reads = 0usize;

    while let Some((range, level)) = queue.pop_front() {
        let count = (range.end - range.start) as usize;
        buf.resize(count * NODE_ITEM_SIZE, 0);
        read(&mut buf, range.start * NODE_ITEM_SIZE as u64)?;
        reads += 1;

        let mut r = ByteReader::new(&buf);
        for pos in range {
            let node = NodeItem::read_from(&mut r)?;
            if !node.intersects(query) {
                continue;
            }
            if level == 0 {
                results.push(SearchResultItem {
                    offset: node.offset,
                    index: pos,
                });
                continue;
            }

            let children = child_range(&node, pos, &bounds[level - 1], node_size)?;
            match queue.back_mut() {
                Some((back, back_level))
                    if *back_level == level - 1
                        && back.end == children.start
                        && children.end - back.start <= MAX_READ_NODES =>
                {
                    back.end = children.end;
                }
                _ => queue.push_back((children, level - 1)),
            }
        }
    }

    log::debug!("index search: {} hits in {} reads", results.len(), reads);
    results.sort_by_key(|item| item.offset);
    Ok(results)
}

fn child_range(
    node: &NodeItem,
    pos: u64,
    level: &Range<u64>,
    node_size: u16,
) -> GeobinResult<Range<u64>> {
    if node.offset % NODE_ITEM_SIZE as u64 != 0 {
        return Err(GeobinError::corrupt(format!(
            "node {} has misaligned child offset {}",
            pos, node.offset
        )));
    }
    let start = node.offset / NODE_ITEM_SIZE as u64;
    if !level.contains(&start) {
        return Err(GeobinError::corrupt(format!(
            "node {} points to node {} outside level {:?}",
            pos, start, level
        )));
    }
    Ok(start..(start + node_size as u64).min(level.end))
}

/// Reads the feature offset stored in leaf `index`.
pub fn read_feature_offset<F>(num_items: u64, index: u64, mut read: F) -> GeobinResult<u64>
where
    F: FnMut(&mut [u8], u64) -> GeobinResult<()>,
{
    if index >= num_items {
        return Err(GeobinError::invalid(format!(
            "leaf {} out of range ({} leaves)",
            index, num_items
        )));
    }
    let mut buf = [0u8; 8];
    read(&mut buf, index * NODE_ITEM_SIZE as u64 + 32)?;
    ByteReader::new(&buf).read_u64("feature offset")
}
