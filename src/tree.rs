//! Hierarchical Resource Tree
//!
//! Records non-overlapping, possibly nested physical address ranges.
//! Sibling chains are kept sorted by start address; insertion resolves
//! containment in both directions:
//! - a node fully inside an existing node descends and becomes its child;
//! - a node fully containing a run of existing siblings adopts that run
//!   as its children and takes its place in the chain;
//! - partial overlap cannot be reconciled and is rejected.
//!
//! The tree owns no node storage. Nodes live in a [`NodeStore`] and are
//! referenced by [`NodeId`]; links are store indices, so the whole
//! structure is safe code.

use log::warn;

use crate::addr::PhysAddr;
use crate::arena::NodeStore;
use crate::node::{NodeId, ResourceNode};

/// Error type for tree insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    /// The node partially overlaps an existing node.
    Conflict,
    /// The node's range has `start > end`.
    InvalidRange,
    /// The node lies outside the tree's root span.
    OutOfSpan,
}

impl core::fmt::Display for InsertError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Conflict => write!(f, "range partially overlaps an existing node"),
            Self::InvalidRange => write!(f, "range start exceeds end"),
            Self::OutOfSpan => write!(f, "range outside the tree span"),
        }
    }
}

/// Where a child link lives: at the root, or inside another node.
#[derive(Clone, Copy)]
enum Link {
    /// The tree's first top-level node.
    Root,
    /// The `child` link of a node.
    Child(NodeId),
    /// The `sibling` link of a node.
    Sibling(NodeId),
}

/// The resource tree.
///
/// Covers one root span (the whole physical address space by default);
/// every inserted node must fall inside it.
pub struct ResourceTree {
    first_child: Option<NodeId>,
    span_start: PhysAddr,
    span_end: PhysAddr,
}

impl ResourceTree {
    /// Create an empty tree spanning the whole physical address space.
    pub const fn new() -> Self {
        Self {
            first_child: None,
            span_start: PhysAddr::ZERO,
            span_end: PhysAddr::MAX,
        }
    }

    /// Check whether the tree holds no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.first_child.is_none()
    }

    fn link_get(&self, link: Link, store: &NodeStore) -> Option<NodeId> {
        match link {
            Link::Root => self.first_child,
            Link::Child(id) => store.node(id).child,
            Link::Sibling(id) => store.node(id).sibling,
        }
    }

    fn link_set(&mut self, link: Link, value: Option<NodeId>, store: &mut NodeStore) {
        match link {
            Link::Root => self.first_child = value,
            Link::Child(id) => store.node_mut(id).child = value,
            Link::Sibling(id) => store.node_mut(id).sibling = value,
        }
    }

    /// Insert a populated node into the tree.
    ///
    /// On success the node is linked at the deepest level whose span
    /// contains it, in sorted sibling order. On failure the tree is
    /// unchanged.
    pub fn insert(&mut self, id: NodeId, store: &mut NodeStore) -> Result<(), InsertError> {
        let (start, end) = {
            let node = store.node(id);
            (node.start, node.end)
        };
        if start > end {
            return Err(InsertError::InvalidRange);
        }
        if start < self.span_start || end > self.span_end {
            return Err(InsertError::OutOfSpan);
        }

        let mut cursor = Link::Root;
        loop {
            let Some(cur) = self.link_get(cursor, store) else {
                // end of the sibling chain: no conflict at this level
                store.node_mut(id).sibling = None;
                self.link_set(cursor, Some(id), store);
                return Ok(());
            };
            let (cur_start, cur_end) = {
                let node = store.node(cur);
                (node.start, node.end)
            };

            if cur_end < start {
                // entirely before the new range; keep walking
                cursor = Link::Sibling(cur);
            } else if end < cur_start {
                // slots in sorted order ahead of `cur`
                store.node_mut(id).sibling = Some(cur);
                self.link_set(cursor, Some(id), store);
                return Ok(());
            } else if store.node(cur).contains_range(start, end) {
                // fully inside `cur`: descend one level
                cursor = Link::Child(cur);
            } else if start <= cur_start && cur_end <= end {
                return self.adopt_run(id, cur, cursor, end, store);
            } else {
                warn!(
                    "resource insert conflict: [{start}, {end}] vs existing [{cur_start}, {cur_end}]"
                );
                return Err(InsertError::Conflict);
            }
        }
    }

    /// Replace a fully contained run of siblings starting at `first`
    /// with the new node, re-parenting the run under it.
    fn adopt_run(
        &mut self,
        id: NodeId,
        first: NodeId,
        at: Link,
        end: PhysAddr,
        store: &mut NodeStore,
    ) -> Result<(), InsertError> {
        // every sibling after `first` that still overlaps the new range
        // must be fully contained as well
        let mut last = first;
        while let Some(next) = store.node(last).sibling {
            let node = store.node(next);
            if node.start > end {
                break;
            }
            if node.end > end {
                warn!(
                    "resource insert conflict: new range ends at {end} inside [{}, {}]",
                    node.start, node.end
                );
                return Err(InsertError::Conflict);
            }
            last = next;
        }

        let after = store.node(last).sibling;
        store.node_mut(last).sibling = None;
        {
            let new = store.node_mut(id);
            new.child = Some(first);
            new.sibling = after;
        }
        self.link_set(at, Some(id), store);
        Ok(())
    }

    /// Drop every inserted node, restoring the tree to empty.
    ///
    /// It is safer to present an empty tree than an inconsistent one;
    /// this is the rollback primitive for a failed build.
    pub fn release_all(&mut self, store: &mut NodeStore) {
        store.clear_links();
        self.first_child = None;
    }

    /// Visit every node depth-first, with its nesting depth.
    pub fn for_each<F>(&self, store: &NodeStore, f: &mut F)
    where
        F: FnMut(usize, &ResourceNode),
    {
        Self::visit(self.first_child, 0, store, f);
    }

    fn visit<F>(link: Option<NodeId>, depth: usize, store: &NodeStore, f: &mut F)
    where
        F: FnMut(usize, &ResourceNode),
    {
        let mut cur = link;
        while let Some(id) = cur {
            let node = store.node(id);
            f(depth, node);
            Self::visit(node.child, depth + 1, store, f);
            cur = node.sibling;
        }
    }

    /// Number of nodes in the tree.
    pub fn len(&self, store: &NodeStore) -> usize {
        let mut count = 0;
        self.for_each(store, &mut |_, _| count += 1);
        count
    }
}

impl Default for ResourceTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::NodeArena;
    use crate::layout::ImageLayout;
    use crate::node::ResourceFlags;
    use crate::region::Block;
    use core::ptr::NonNull;
    use std::alloc::Layout;

    // image sections far away from the test ranges below
    const LAYOUT: ImageLayout =
        ImageLayout::new(0x100_0000, 0x100_ffff, 0x101_0000, 0x101_ffff, 0x102_0000, 0x102_ffff);

    fn store(capacity: usize) -> NodeStore {
        let layout =
            Layout::from_size_align(NodeArena::block_size(capacity), NodeArena::block_align())
                .unwrap();
        let ptr = unsafe { std::alloc::alloc(layout) };
        let arena = unsafe { NodeArena::from_block(Block::new(NonNull::new(ptr).unwrap()), capacity) };
        let mut store = NodeStore::new(&LAYOUT);
        store.attach(arena);
        store
    }

    fn add(store: &mut NodeStore, start: u64, end: u64) -> NodeId {
        let slot = store.arena_mut().claim().unwrap();
        store.node_mut(NodeId::Slot(slot)).set(
            "test",
            PhysAddr::new(start),
            PhysAddr::new(end),
            ResourceFlags::MEM,
        );
        NodeId::Slot(slot)
    }

    fn ranges(tree: &ResourceTree, store: &NodeStore) -> Vec<(usize, u64, u64)> {
        let mut out = Vec::new();
        tree.for_each(store, &mut |depth, node| {
            out.push((depth, node.start.as_u64(), node.end.as_u64()));
        });
        out
    }

    #[test]
    fn test_sorted_sibling_order() {
        let mut store = store(3);
        let mut tree = ResourceTree::new();
        let b = add(&mut store, 0x2000, 0x2fff);
        let a = add(&mut store, 0x0000, 0x0fff);
        let c = add(&mut store, 0x4000, 0x4fff);
        tree.insert(b, &mut store).unwrap();
        tree.insert(a, &mut store).unwrap();
        tree.insert(c, &mut store).unwrap();
        assert_eq!(
            ranges(&tree, &store),
            vec![(0, 0x0000, 0x0fff), (0, 0x2000, 0x2fff), (0, 0x4000, 0x4fff)]
        );
    }

    #[test]
    fn test_descends_into_container() {
        let mut store = store(2);
        let mut tree = ResourceTree::new();
        let outer = add(&mut store, 0x1000, 0x8fff);
        let inner = add(&mut store, 0x2000, 0x2fff);
        tree.insert(outer, &mut store).unwrap();
        tree.insert(inner, &mut store).unwrap();
        assert_eq!(
            ranges(&tree, &store),
            vec![(0, 0x1000, 0x8fff), (1, 0x2000, 0x2fff)]
        );
    }

    #[test]
    fn test_adopts_contained_run() {
        let mut store = store(4);
        let mut tree = ResourceTree::new();
        let a = add(&mut store, 0x1000, 0x1fff);
        let b = add(&mut store, 0x3000, 0x3fff);
        let c = add(&mut store, 0x9000, 0x9fff);
        tree.insert(a, &mut store).unwrap();
        tree.insert(b, &mut store).unwrap();
        tree.insert(c, &mut store).unwrap();
        // swallows a and b, leaves c a sibling
        let big = add(&mut store, 0x0000, 0x7fff);
        tree.insert(big, &mut store).unwrap();
        assert_eq!(
            ranges(&tree, &store),
            vec![
                (0, 0x0000, 0x7fff),
                (1, 0x1000, 0x1fff),
                (1, 0x3000, 0x3fff),
                (0, 0x9000, 0x9fff)
            ]
        );
    }

    #[test]
    fn test_partial_overlap_rejected() {
        let mut store = store(3);
        let mut tree = ResourceTree::new();
        let a = add(&mut store, 0x1000, 0x2fff);
        tree.insert(a, &mut store).unwrap();
        let left = add(&mut store, 0x0000, 0x1fff);
        assert_eq!(tree.insert(left, &mut store), Err(InsertError::Conflict));
        let right = add(&mut store, 0x2000, 0x3fff);
        assert_eq!(tree.insert(right, &mut store), Err(InsertError::Conflict));
        // failed inserts leave the tree unchanged
        assert_eq!(tree.len(&store), 1);
    }

    #[test]
    fn test_adoption_rejects_partial_tail() {
        let mut store = store(3);
        let mut tree = ResourceTree::new();
        let a = add(&mut store, 0x1000, 0x1fff);
        let b = add(&mut store, 0x3000, 0x4fff);
        tree.insert(a, &mut store).unwrap();
        tree.insert(b, &mut store).unwrap();
        // contains a entirely but cuts b in half
        let big = add(&mut store, 0x0000, 0x3fff);
        assert_eq!(tree.insert(big, &mut store), Err(InsertError::Conflict));
    }

    #[test]
    fn test_invalid_range() {
        let mut store = store(1);
        let mut tree = ResourceTree::new();
        let slot = store.arena_mut().claim().unwrap();
        store.node_mut(NodeId::Slot(slot)).set(
            "test",
            PhysAddr::new(0x2000),
            PhysAddr::new(0x1000),
            ResourceFlags::MEM,
        );
        assert_eq!(
            tree.insert(NodeId::Slot(slot), &mut store),
            Err(InsertError::InvalidRange)
        );
    }

    #[test]
    fn test_release_all() {
        let mut store = store(2);
        let mut tree = ResourceTree::new();
        let a = add(&mut store, 0x1000, 0x1fff);
        let b = add(&mut store, 0x3000, 0x3fff);
        tree.insert(a, &mut store).unwrap();
        tree.insert(b, &mut store).unwrap();
        assert_eq!(tree.len(&store), 2);
        tree.release_all(&mut store);
        assert!(tree.is_empty());
        assert_eq!(tree.len(&store), 0);
    }
}
