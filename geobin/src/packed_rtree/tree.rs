use std::io::Write;
use std::ops::Range;

use crate::bounding_box::BoundingBox;
use crate::codec::le::ByteWriter;
use crate::errors::{GeobinError, GeobinResult};
use crate::packed_rtree::node_item::{NodeItem, NODE_ITEM_SIZE};
use crate::packed_rtree::search::SearchResultItem;
use crate::packed_rtree::{check_node_size, level_bounds};

/// Leaves pulled from a fill callback per call.
const FILL_CHUNK_ITEMS: usize = 4096;

/// An in-memory packed tree over leaves that are already in their final
/// (Hilbert) order.
#[derive(Debug, Clone)]
pub struct PackedRTree {
    nodes: Vec<NodeItem>,
    level_bounds: Vec<Range<u64>>,
    num_items: u64,
    node_size: u16,
    extent: BoundingBox,
}

impl PackedRTree {
    /// Builds the tree over `leaves`. Leaf order is kept as given.
    pub fn build(leaves: &[NodeItem], node_size: u16) -> GeobinResult<PackedRTree> {
        check_node_size(node_size)?;
        let num_items = leaves.len() as u64;
        let level_bounds = level_bounds(num_items, node_size)?;
        let total = level_bounds.last().map_or(0, |root| root.end) as usize;

        let mut nodes = Vec::with_capacity(total);
        nodes.extend_from_slice(leaves);
        for level in 1..level_bounds.len() {
            let children = &level_bounds[level - 1];
            let parents = parents_of(&nodes[as_range(children)], children.start, node_size);
            nodes.extend(parents);
        }

        let extent = nodes.last().map_or(BoundingBox::empty(), |root| root.bbox());
        Ok(PackedRTree {
            nodes,
            level_bounds,
            num_items,
            node_size,
            extent,
        })
    }

    pub fn num_items(&self) -> u64 {
        self.num_items
    }

    pub fn node_size(&self) -> u16 {
        self.node_size
    }

    /// Union of all leaf boxes, empty for a tree without leaves.
    pub fn extent(&self) -> BoundingBox {
        self.extent
    }

    /// Node index range of each level, leaves first.
    pub fn level_bounds(&self) -> &[Range<u64>] {
        &self.level_bounds
    }

    pub fn nodes(&self) -> &[NodeItem] {
        &self.nodes
    }

    pub fn size(&self) -> u64 {
        (self.nodes.len() * NODE_ITEM_SIZE) as u64
    }

    /// Writes every node, leaves first and root last.
    pub fn stream_write<W: Write>(&self, out: &mut W) -> GeobinResult<()> {
        write_nodes(out, &self.nodes)
    }

    /// Query against the in-memory nodes. Same result as
    /// [`stream_search`](crate::packed_rtree::stream_search) over the
    /// serialized tree.
    pub fn search(&self, query: &BoundingBox) -> GeobinResult<Vec<SearchResultItem>> {
        let nodes = &self.nodes;
        crate::packed_rtree::stream_search(
            self.num_items,
            self.node_size,
            query,
            |buf: &mut [u8], byte_offset: u64| {
                let start = byte_offset as usize / NODE_ITEM_SIZE;
                let count = buf.len() / NODE_ITEM_SIZE;
                let slice = nodes.get(start..start + count).ok_or_else(|| {
                    GeobinError::corrupt(format!("node range {}+{} out of tree", start, count))
                })?;
                let mut w = ByteWriter::with_capacity(buf.len());
                for node in slice {
                    node.write_to(&mut w);
                }
                buf.copy_from_slice(w.as_slice());
                Ok(())
            },
        )
    }
}

fn as_range(range: &Range<u64>) -> Range<usize> {
    range.start as usize..range.end as usize
}

/// Builds the parents of one level. `first_index` is the node index of
/// `children[0]` within the whole tree.
fn parents_of(children: &[NodeItem], first_index: u64, node_size: u16) -> Vec<NodeItem> {
    children
        .chunks(node_size as usize)
        .enumerate()
        .map(|(i, chunk)| {
            let first_child = first_index + (i * node_size as usize) as u64;
            let mut parent = NodeItem::empty();
            for child in chunk {
                parent.expand(child);
            }
            parent.offset = first_child * NODE_ITEM_SIZE as u64;
            parent
        })
        .collect()
}

fn write_nodes<W: Write>(out: &mut W, nodes: &[NodeItem]) -> GeobinResult<()> {
    for chunk in nodes.chunks(FILL_CHUNK_ITEMS) {
        let mut w = ByteWriter::with_capacity(chunk.len() * NODE_ITEM_SIZE);
        for node in chunk {
            node.write_to(&mut w);
        }
        out.write_all(w.as_slice())?;
    }
    Ok(())
}

/// Writes a tree whose leaves are produced on demand.
///
/// `fill(start, buf)` must fill `buf` with leaves `start..start + buf.len()`
/// in their final order. Leaves are written as they arrive; only the
/// levels above the leaves are kept in memory. The output is byte-identical
/// to [`PackedRTree::build`] followed by [`PackedRTree::stream_write`].
/// Returns the union of all leaf boxes.
pub fn stream_write_from_fill<W, F>(
    num_items: u64,
    node_size: u16,
    mut fill: F,
    out: &mut W,
) -> GeobinResult<BoundingBox>
where
    W: Write,
    F: FnMut(u64, &mut [NodeItem]) -> GeobinResult<()>,
{
    check_node_size(node_size)?;
    let bounds = level_bounds(num_items, node_size)?;
    if bounds.is_empty() {
        return Ok(BoundingBox::empty());
    }

    // Chunks hold whole runs of siblings so each parent is finished inside
    // one chunk.
    let ns = node_size as usize;
    let chunk_items = FILL_CHUNK_ITEMS.div_ceil(ns).max(1) * ns;
    let mut upper: Vec<NodeItem> = Vec::with_capacity(as_range(&bounds[1]).len());
    let mut chunk = vec![NodeItem::empty(); chunk_items.min(num_items as usize)];

    let mut start = 0u64;
    while start < num_items {
        let len = chunk_items.min((num_items - start) as usize);
        let buf = &mut chunk[..len];
        fill(start, buf)?;
        write_nodes(out, buf)?;
        upper.extend(parents_of(buf, start, node_size));
        start += len as u64;
    }
    log::debug!("streamed {} leaves, {} parents", num_items, upper.len());

    for level in 2..bounds.len() {
        let children = &upper[as_range(&shift(&bounds[level - 1], bounds[1].start))];
        let parents = parents_of(children, bounds[level - 1].start, node_size);
        upper.extend(parents);
    }
    write_nodes(out, &upper)?;

    Ok(upper.last().map_or(BoundingBox::empty(), |root| root.bbox()))
}

fn shift(range: &Range<u64>, by: u64) -> Range<u64> {
    range.start - by..range.end - by
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hilbert::hilbert_sort;
    use crate::packed_rtree::index_size;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_leaves(n: usize, seed: u64) -> Vec<NodeItem> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut leaves: Vec<NodeItem> = (0..n)
            .map(|i| {
                let x: f64 = rng.gen_range(-1000.0..1000.0);
                let y: f64 = rng.gen_range(-1000.0..1000.0);
                let w: f64 = rng.gen_range(0.0..20.0);
                let h: f64 = rng.gen_range(0.0..20.0);
                NodeItem::new(x, y, x + w, y + h, i as u64)
            })
            .collect();
        let mut extent = BoundingBox::empty();
        leaves.iter().for_each(|n| extent.expand(&n.bbox()));
        hilbert_sort(&mut leaves, &extent, |n| n.bbox());
        leaves
    }

    #[test]
    fn test_three_items_node_size_two() {
        let leaves = vec![
            NodeItem::new(0.0, 0.0, 1.0, 1.0, 0),
            NodeItem::new(2.0, 2.0, 3.0, 3.0, 100),
            NodeItem::new(10.0, 10.0, 11.0, 11.0, 200),
        ];
        let tree = PackedRTree::build(&leaves, 2).unwrap();
        let nodes = tree.nodes();
        assert_eq!(nodes.len(), 6);
        assert_eq!(&nodes[..3], &leaves[..]);
        assert_eq!(nodes[3], NodeItem::new(0.0, 0.0, 3.0, 3.0, 0));
        assert_eq!(nodes[4], NodeItem::new(10.0, 10.0, 11.0, 11.0, 2 * 40));
        assert_eq!(nodes[5], NodeItem::new(0.0, 0.0, 11.0, 11.0, 3 * 40));
        assert_eq!(tree.extent(), BoundingBox::new(0.0, 0.0, 11.0, 11.0));
        assert_eq!(tree.size(), 240);
    }

    #[test]
    fn test_single_item() {
        let leaves = vec![NodeItem::new(1.0, 1.0, 2.0, 2.0, 0)];
        let tree = PackedRTree::build(&leaves, 16).unwrap();
        assert_eq!(tree.nodes().len(), 2);
        assert_eq!(tree.nodes()[1], NodeItem::new(1.0, 1.0, 2.0, 2.0, 0));
    }

    #[test]
    fn test_empty_tree_writes_nothing() {
        let tree = PackedRTree::build(&[], 16).unwrap();
        let mut out = Vec::new();
        tree.stream_write(&mut out).unwrap();
        assert!(out.is_empty());
        assert!(tree.extent().is_empty());
    }

    #[test]
    fn test_build_rejects_small_node_size() {
        let leaves = vec![NodeItem::new(1.0, 1.0, 2.0, 2.0, 0)];
        assert!(matches!(
            PackedRTree::build(&leaves, 1).unwrap_err(),
            GeobinError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_fill_builder_is_byte_identical() {
        for (n, node_size) in [(1usize, 2u16), (3, 2), (100, 16), (5000, 16), (10000, 7), (4097, 4096)] {
            let leaves = random_leaves(n, n as u64);
            let tree = PackedRTree::build(&leaves, node_size).unwrap();
            let mut in_memory = Vec::new();
            tree.stream_write(&mut in_memory).unwrap();
            assert_eq!(in_memory.len() as u64, index_size(n as u64, node_size).unwrap());

            let mut streamed = Vec::new();
            let extent = stream_write_from_fill(
                n as u64,
                node_size,
                |start, buf| {
                    let start = start as usize;
                    buf.copy_from_slice(&leaves[start..start + buf.len()]);
                    Ok(())
                },
                &mut streamed,
            )
            .unwrap();
            assert_eq!(streamed, in_memory, "n={} node_size={}", n, node_size);
            assert_eq!(extent, tree.extent());
        }
    }

    #[test]
    fn test_fill_errors_propagate() {
        let mut out = Vec::new();
        let err = stream_write_from_fill(10, 4, |_, _| Err(GeobinError::corrupt("boom")), &mut out)
            .unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = random_leaves(3000, 9);
        let b = random_leaves(3000, 9);
        let mut out_a = Vec::new();
        let mut out_b = Vec::new();
        PackedRTree::build(&a, 16).unwrap().stream_write(&mut out_a).unwrap();
        PackedRTree::build(&b, 16).unwrap().stream_write(&mut out_b).unwrap();
        assert_eq!(out_a, out_b);
    }
}
