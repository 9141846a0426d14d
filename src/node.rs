//! Resource Nodes
//!
//! One [`ResourceNode`] describes a committed address range in the
//! resource tree: a human-readable name, the inclusive physical range,
//! semantic flags, and the tree links. Links are store indices rather
//! than pointers, so the whole tree stays in safe code.

use core::fmt;

use bitflags::bitflags;

use crate::addr::PhysAddr;
use crate::layout::ImageSection;

bitflags! {
    /// Semantic tags carried by a resource node.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct ResourceFlags: u32 {
        /// Generic memory-mapped range (not system RAM).
        const MEM = 1 << 0;
        /// Ordinary system RAM.
        const SYSTEM_RAM = 1 << 1;
        /// Claimed exclusively; not available for further assignment.
        const BUSY = 1 << 2;
        /// Excluded from the kernel's usable-memory mapping.
        const NOMAP = 1 << 3;
    }
}

/// A slot index into the backing-block arena.
///
/// Newtype to prevent arbitrary integers being used as node indices;
/// valid slots only come out of the arena's `claim`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct NodeSlot(u32);

impl NodeSlot {
    /// Create a slot index. Only the arena should do this.
    #[inline]
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the index value.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a node inside a [`NodeStore`](crate::arena::NodeStore).
///
/// The three image-section nodes live outside the backing block and are
/// addressed by section; every dynamic node is addressed by its arena
/// slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeId {
    /// One of the fixed kernel image nodes.
    Fixed(ImageSection),
    /// A node backed by the preallocated block.
    Slot(NodeSlot),
}

/// One entry in the resource tree.
#[derive(Clone, Copy)]
pub struct ResourceNode {
    /// Human-readable label ("Kernel code", "Reserved", caller label, ...).
    pub name: &'static str,
    /// First byte of the range.
    pub start: PhysAddr,
    /// Last byte of the range (inclusive).
    pub end: PhysAddr,
    /// Semantic tags.
    pub flags: ResourceFlags,
    /// First child in the tree, if any.
    pub(crate) child: Option<NodeId>,
    /// Next sibling in the tree, if any.
    pub(crate) sibling: Option<NodeId>,
}

impl ResourceNode {
    /// An unpopulated node.
    pub const fn empty() -> Self {
        Self {
            name: "",
            start: PhysAddr::ZERO,
            end: PhysAddr::ZERO,
            flags: ResourceFlags::empty(),
            child: None,
            sibling: None,
        }
    }

    /// Populate the descriptive fields, leaving tree links untouched.
    #[inline]
    pub fn set(&mut self, name: &'static str, start: PhysAddr, end: PhysAddr, flags: ResourceFlags) {
        self.name = name;
        self.start = start;
        self.end = end;
        self.flags = flags;
    }

    /// Check whether this node's range fully contains `[start, end]`.
    #[inline]
    pub const fn contains_range(&self, start: PhysAddr, end: PhysAddr) -> bool {
        self.start.as_u64() <= start.as_u64() && end.as_u64() <= self.end.as_u64()
    }
}

impl fmt::Debug for ResourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} : {} [{:?}]",
            self.start, self.end, self.name, self.flags
        )
    }
}
