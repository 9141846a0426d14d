//! Resource Tree Builder
//!
//! Turns the region tracker's two region lists into a populated resource
//! tree using exactly one allocation.
//!
//! # Build order
//! 1. The three fixed kernel-image nodes go in first; a failure there
//!    means the link-time layout is corrupt and is fatal to the caller.
//! 2. The backing block is sized from both list lengths and acquired in
//!    a single call — strictly before any region iteration, because the
//!    tracker's allocator may mutate the reserved list as a side effect.
//! 3. The reserved pass runs before the memory pass, so wherever both
//!    lists claim an address the memory pass's classification wins and
//!    the reserved entry is recycled instead of inserted.
//! 4. Any insertion failure rolls the whole tree back and returns the
//!    whole block in one free; on success the block is kept forever.

use core::fmt;

use log::{debug, error, warn};

use crate::arena::{NodeArena, NodeStore};
use crate::layout::{ImageLayout, ImageSection};
use crate::node::{NodeId, ResourceFlags, ResourceNode};
use crate::region::RegionSource;
use crate::tree::{InsertError, ResourceTree};

/// Error type for the build operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// The backing block could not be acquired. There is no fallback;
    /// callers treat this as fatal to the boot sequence.
    AllocationFailed {
        /// The requested block size in bytes.
        size: usize,
    },
    /// A fixed kernel-image node could not be inserted, implying a
    /// corrupt link-time layout. Fatal to the caller.
    ImageLayoutConflict(InsertError),
    /// A dynamic node could not be inserted. The tree has been released
    /// and the backing block freed; the caller decides whether to
    /// continue with an empty tree or halt.
    InsertRejected(InsertError),
    /// The backing block ran out of slots before all regions were
    /// placed, meaning a region list changed under the builder in
    /// violation of the tracker contract.
    BlockExhausted,
    /// The map has already been populated.
    AlreadyBuilt,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed { size } => {
                write!(f, "backing block allocation failed ({size} bytes)")
            }
            Self::ImageLayoutConflict(e) => write!(f, "kernel image node rejected: {e}"),
            Self::InsertRejected(e) => write!(f, "node insertion rejected: {e}"),
            Self::BlockExhausted => {
                write!(f, "backing block exhausted before all regions were placed")
            }
            Self::AlreadyBuilt => write!(f, "resource tree already built"),
        }
    }
}

/// The resource tree together with the storage backing its nodes.
///
/// Create one with the image layout, then call
/// [`populate`](Self::populate) exactly once during early boot.
pub struct ResourceMap {
    store: NodeStore,
    tree: ResourceTree,
    built: bool,
}

impl ResourceMap {
    /// Create an empty map whose fixed nodes describe `layout`.
    pub fn new(layout: &ImageLayout) -> Self {
        Self {
            store: NodeStore::new(layout),
            tree: ResourceTree::new(),
            built: false,
        }
    }

    /// Build the resource tree from the tracker's region lists.
    ///
    /// Usable memory nodes are labelled `ram_name`; reserved and no-map
    /// ranges are labelled "Reserved". On success the backing block's
    /// ownership transfers permanently to the tree. On
    /// [`BuildError::InsertRejected`] the tree is left empty and the
    /// block has been returned to the tracker in one piece; the other
    /// errors are fatal to a sane boot sequence.
    pub fn populate<S: RegionSource>(
        &mut self,
        source: &mut S,
        ram_name: &'static str,
    ) -> Result<(), BuildError> {
        if self.built {
            return Err(BuildError::AlreadyBuilt);
        }

        for section in ImageSection::ALL {
            if let Err(e) = self.tree.insert(NodeId::Fixed(section), &mut self.store) {
                error!("kernel image {} node rejected: {e}", section.name());
                return Err(BuildError::ImageLayoutConflict(e));
            }
        }

        // Sizing happens against the same lists the passes below walk;
        // the tracker contract keeps their lengths stable across this
        // call, except for the reservation `allocate` itself may add —
        // which always starts inside tracked memory, so the reserved
        // pass recycles its slot and the count still suffices.
        let count = source.memory().len() + source.reserved().len();
        let size = NodeArena::block_size(count);
        debug!(
            "resource tree: {} memory + {} reserved regions, {size} byte node block",
            source.memory().len(),
            source.reserved().len()
        );

        if count > 0 {
            // The one and only acquisition, before any iteration begins.
            let Some(block) = source.allocate(size, NodeArena::block_align()) else {
                error!("resource node block allocation failed ({size} bytes)");
                return Err(BuildError::AllocationFailed { size });
            };
            // SAFETY: the tracker contract hands over exclusive ownership
            // of `size` bytes at the requested alignment. The block stays
            // valid until freed on the failure path below, or for the
            // kernel's lifetime once the build commits.
            let arena = unsafe { NodeArena::from_block(block, count) };
            self.store.attach(arena);

            if let Err(err) = self.populate_regions(source, ram_name) {
                // Never leave a partially-populated tree next to a live
                // block: drop the whole tree, then hand the whole block
                // back with its original size.
                self.tree.release_all(&mut self.store);
                self.store.arena_mut().detach();
                source.free(block, size);
                warn!("resource tree discarded: {err}");
                return Err(err);
            }
        }

        self.built = true;
        debug!("resource tree committed: {} nodes", self.len());
        Ok(())
    }

    /// The per-region population loops. No tracker allocation may happen
    /// in here; the region slices stay borrowed for the whole walk.
    fn populate_regions<S: RegionSource>(
        &mut self,
        source: &mut S,
        ram_name: &'static str,
    ) -> Result<(), BuildError> {
        for &region in source.reserved() {
            let slot = self
                .store
                .arena_mut()
                .claim()
                .ok_or(BuildError::BlockExhausted)?;
            let id = NodeId::Slot(slot);
            self.store.node_mut(id).set(
                "Reserved",
                region.start,
                region.end,
                ResourceFlags::SYSTEM_RAM | ResourceFlags::BUSY,
            );
            if source.is_memory(region.start) {
                // ordinary memory, not a true out-of-band reservation:
                // the memory pass will describe this range
                self.store.arena_mut().release_last(slot);
                continue;
            }
            self.tree
                .insert(id, &mut self.store)
                .map_err(BuildError::InsertRejected)?;
        }

        for &region in source.memory() {
            let slot = self
                .store
                .arena_mut()
                .claim()
                .ok_or(BuildError::BlockExhausted)?;
            let id = NodeId::Slot(slot);
            if region.nomap {
                self.store.node_mut(id).set(
                    "Reserved",
                    region.start,
                    region.end,
                    ResourceFlags::SYSTEM_RAM | ResourceFlags::BUSY | ResourceFlags::NOMAP,
                );
            } else {
                self.store
                    .node_mut(id)
                    .set(ram_name, region.start, region.end, ResourceFlags::SYSTEM_RAM);
            }
            self.tree
                .insert(id, &mut self.store)
                .map_err(BuildError::InsertRejected)?;
        }

        Ok(())
    }

    /// Whether the build has committed.
    #[inline]
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Number of nodes currently in the tree.
    pub fn len(&self) -> usize {
        self.tree.len(&self.store)
    }

    /// Check whether the tree holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Visit every node depth-first, with its nesting depth.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(usize, &ResourceNode),
    {
        self.tree.for_each(&self.store, &mut f);
    }
}

/// Indented range dump for boot logs, one node per line.
impl fmt::Display for ResourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut result = Ok(());
        self.for_each(|depth, node| {
            if result.is_ok() {
                result = writeln!(
                    f,
                    "{:indent$}{}-{} : {}",
                    "",
                    node.start,
                    node.end,
                    node.name,
                    indent = depth * 2
                );
            }
        });
        result
    }
}
