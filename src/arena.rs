//! Backing Block Arena and Node Store
//!
//! All dynamic resource nodes for one build come out of a single
//! contiguous block acquired from the region tracker before any region
//! iteration begins. [`NodeArena`] wraps that block and hands out slots
//! by monotonically increasing index; its capacity is fixed at attach
//! time and claiming fails closed once the block is exhausted, so the
//! "exactly one allocation" property is structural rather than a
//! convention.
//!
//! [`NodeStore`] combines the arena with the three fixed kernel-image
//! nodes and resolves [`NodeId`]s for the tree.

use core::mem;

use crate::layout::{ImageLayout, ImageSection, IMAGE_SECTIONS};
use crate::node::{NodeId, NodeSlot, ResourceFlags, ResourceNode};
use crate::region::Block;

/// Arena over the single preallocated backing block.
///
/// Slots are claimed in increasing index order. The only supported
/// release is of the most recently claimed slot, which the reserved-pass
/// uses to recycle a slot whose region turned out to be ordinary memory.
pub struct NodeArena {
    slots: &'static mut [ResourceNode],
    next: usize,
}

impl NodeArena {
    /// An arena with no storage. Claiming always fails.
    pub fn unattached() -> Self {
        Self {
            slots: &mut [],
            next: 0,
        }
    }

    /// Byte size of a block holding `count` nodes.
    #[inline]
    pub const fn block_size(count: usize) -> usize {
        count * mem::size_of::<ResourceNode>()
    }

    /// Alignment required of the backing block.
    #[inline]
    pub const fn block_align() -> usize {
        mem::align_of::<ResourceNode>()
    }

    /// Build an arena over a raw block of `capacity` nodes.
    ///
    /// Every slot is initialized to [`ResourceNode::empty`].
    ///
    /// # Safety
    /// - `block` must point to at least [`block_size(capacity)`](Self::block_size)
    ///   bytes, aligned to [`block_align`](Self::block_align).
    /// - The block must be exclusively owned by the caller and must stay
    ///   valid until it is handed back to the tracker (failure path) or
    ///   for the rest of the kernel's lifetime (success path).
    pub unsafe fn from_block(block: Block, capacity: usize) -> Self {
        let base = block.as_ptr().cast::<ResourceNode>();
        debug_assert!(base as usize % Self::block_align() == 0);
        // SAFETY:
        // - Caller guarantees the block covers `capacity` nodes and is
        //   exclusively owned.
        // - Each slot is written before the slice is formed, so no
        //   uninitialized node is ever read.
        unsafe {
            for i in 0..capacity {
                base.add(i).write(ResourceNode::empty());
            }
            Self {
                slots: core::slice::from_raw_parts_mut(base, capacity),
                next: 0,
            }
        }
    }

    /// Total number of slots in the backing block.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently claimed.
    #[inline]
    pub fn claimed(&self) -> usize {
        self.next
    }

    /// Claim the next unused slot.
    ///
    /// Returns `None` once the block is exhausted; the arena never grows.
    pub fn claim(&mut self) -> Option<NodeSlot> {
        if self.next == self.slots.len() {
            return None;
        }
        let slot = NodeSlot::new(self.next as u32);
        self.next += 1;
        Some(slot)
    }

    /// Return the most recently claimed slot to the unused state.
    ///
    /// The slot's storage is reset and will be handed out again by the
    /// next [`claim`](Self::claim).
    ///
    /// # Panics
    /// Panics if `slot` is not the most recently claimed slot; releasing
    /// anything else would break the monotone-index invariant.
    pub fn release_last(&mut self, slot: NodeSlot) {
        if self.next == 0 || slot.index() != self.next - 1 {
            panic!("released slot {} is not the last claimed", slot.index());
        }
        self.next -= 1;
        self.slots[self.next] = ResourceNode::empty();
    }

    /// Access a claimed slot.
    #[inline]
    fn slot(&self, slot: NodeSlot) -> &ResourceNode {
        debug_assert!(slot.index() < self.next);
        &self.slots[slot.index()]
    }

    /// Mutable access to a claimed slot.
    #[inline]
    fn slot_mut(&mut self, slot: NodeSlot) -> &mut ResourceNode {
        debug_assert!(slot.index() < self.next);
        &mut self.slots[slot.index()]
    }

    /// Detach the storage, leaving this arena unattached.
    ///
    /// Used on the failure path right before the block is handed back to
    /// the tracker, so no slot can be touched after the memory is gone.
    pub fn detach(&mut self) {
        *self = Self::unattached();
    }
}

/// The fixed kernel-image nodes plus the dynamic-node arena.
///
/// Resolves a [`NodeId`] to its storage. The three fixed nodes are
/// created once from the injected image layout and are never drawn from
/// the backing block.
pub struct NodeStore {
    fixed: [ResourceNode; IMAGE_SECTIONS],
    arena: NodeArena,
}

impl NodeStore {
    /// Create a store with populated fixed nodes and no arena attached.
    pub fn new(layout: &ImageLayout) -> Self {
        let mut fixed = [ResourceNode::empty(); IMAGE_SECTIONS];
        for section in ImageSection::ALL {
            let (start, end) = layout.section(section);
            fixed[section.index()].set(
                section.name(),
                start,
                end,
                ResourceFlags::SYSTEM_RAM | ResourceFlags::BUSY,
            );
        }
        Self {
            fixed,
            arena: NodeArena::unattached(),
        }
    }

    /// Attach the backing-block arena.
    pub fn attach(&mut self, arena: NodeArena) {
        self.arena = arena;
    }

    /// The dynamic-node arena.
    #[inline]
    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    /// Mutable access to the dynamic-node arena.
    #[inline]
    pub fn arena_mut(&mut self) -> &mut NodeArena {
        &mut self.arena
    }

    /// Resolve a node id.
    #[inline]
    pub fn node(&self, id: NodeId) -> &ResourceNode {
        match id {
            NodeId::Fixed(section) => &self.fixed[section.index()],
            NodeId::Slot(slot) => self.arena.slot(slot),
        }
    }

    /// Resolve a node id mutably.
    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut ResourceNode {
        match id {
            NodeId::Fixed(section) => &mut self.fixed[section.index()],
            NodeId::Slot(slot) => self.arena.slot_mut(slot),
        }
    }

    /// Drop every tree link, in fixed nodes and claimed slots alike.
    ///
    /// Descriptive fields are left intact; this only detaches nodes from
    /// the tree structure for a bulk release.
    pub fn clear_links(&mut self) {
        for node in &mut self.fixed {
            node.child = None;
            node.sibling = None;
        }
        for i in 0..self.arena.next {
            let node = &mut self.arena.slots[i];
            node.child = None;
            node.sibling = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::PhysAddr;
    use core::ptr::NonNull;
    use std::alloc::Layout;

    fn arena(capacity: usize) -> NodeArena {
        let layout =
            Layout::from_size_align(NodeArena::block_size(capacity), NodeArena::block_align())
                .unwrap();
        // Leaked on purpose: the arena expects block storage that outlives it.
        let ptr = unsafe { std::alloc::alloc(layout) };
        unsafe { NodeArena::from_block(Block::new(NonNull::new(ptr).unwrap()), capacity) }
    }

    #[test]
    fn test_claim_monotonic() {
        let mut a = arena(3);
        assert_eq!(a.claim().unwrap().index(), 0);
        assert_eq!(a.claim().unwrap().index(), 1);
        assert_eq!(a.claim().unwrap().index(), 2);
        assert!(a.claim().is_none());
        assert_eq!(a.claimed(), 3);
    }

    #[test]
    fn test_release_last_recycles() {
        let mut a = arena(2);
        let first = a.claim().unwrap();
        a.release_last(first);
        let again = a.claim().unwrap();
        assert_eq!(again.index(), 0);
        // released storage comes back clean
        assert_eq!(a.slot(again).name, "");
    }

    #[test]
    #[should_panic]
    fn test_release_non_last_panics() {
        let mut a = arena(2);
        let first = a.claim().unwrap();
        let _second = a.claim().unwrap();
        a.release_last(first);
    }

    #[test]
    fn test_unattached_fails_closed() {
        let mut a = NodeArena::unattached();
        assert_eq!(a.capacity(), 0);
        assert!(a.claim().is_none());
    }

    #[test]
    fn test_store_fixed_nodes() {
        let store = NodeStore::new(&ImageLayout::QEMU_VIRT);
        let code = store.node(NodeId::Fixed(ImageSection::Code));
        assert_eq!(code.name, "Kernel code");
        assert_eq!(code.start, PhysAddr::new(0x4008_0000));
        assert!(code
            .flags
            .contains(ResourceFlags::SYSTEM_RAM | ResourceFlags::BUSY));
    }
}
