//! Boot-Time Physical Memory Resource Tree
//!
//! Builds the kernel's hierarchical map of physical address ranges —
//! system RAM, out-of-band reservations, and the running image's code,
//! data and bss sections — from the primitive region tracker that exists
//! before any general-purpose allocator.
//!
//! # Design
//! - One preallocated backing block holds every dynamic tree node; the
//!   block is sized up front and acquired in a single tracker call
//! - All allocation happens strictly before any region iteration,
//!   because the tracker's allocator may mutate the reserved-region
//!   list as a side effect of satisfying a request
//! - Failure never leaves a partially-populated tree next to a live
//!   block: the tree is released whole and the block freed whole
//!
//! # Usage
//! The boot sequence registers regions with a [`BootRegions`] tracker
//! (or any other [`RegionSource`]), then calls [`init`] once. The
//! committed map is available through [`resources`] afterwards.
//!
//! # Non-goals
//! General-purpose allocation, post-boot mutation of the tree, and
//! address lookup APIs. Construction runs single-threaded before other
//! execution contexts exist.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod addr;
pub mod arena;
pub mod builder;
pub mod layout;
pub mod node;
pub mod region;
pub mod tracker;
pub mod tree;

pub use addr::PhysAddr;
pub use arena::{NodeArena, NodeStore};
pub use builder::{BuildError, ResourceMap};
pub use layout::{ImageLayout, ImageSection};
pub use node::{NodeId, NodeSlot, ResourceFlags, ResourceNode};
pub use region::{Block, Region, RegionSource};
pub use tracker::{BootRegions, RegionError, MAX_REGIONS};
pub use tree::{InsertError, ResourceTree};

use spin::Once;

/// The kernel-global resource map, written exactly once by [`init`].
static RESOURCES: Once<ResourceMap> = Once::new();

/// Build and commit the kernel-global resource map.
///
/// Called once during early boot, after the region tracker has finished
/// its registration phase. [`BuildError::AllocationFailed`] and
/// [`BuildError::ImageLayoutConflict`] are fatal to a sane boot
/// sequence; on [`BuildError::InsertRejected`] the boot sequence may
/// choose to continue without a resource map.
pub fn init<S: RegionSource>(
    source: &mut S,
    layout: &ImageLayout,
    ram_name: &'static str,
) -> Result<&'static ResourceMap, BuildError> {
    if RESOURCES.is_completed() {
        return Err(BuildError::AlreadyBuilt);
    }
    RESOURCES.try_call_once(|| {
        let mut map = ResourceMap::new(layout);
        map.populate(source, ram_name)?;
        Ok(map)
    })
}

/// The committed resource map, if [`init`] has succeeded.
pub fn resources() -> Option<&'static ResourceMap> {
    RESOURCES.get()
}
