//! Region Descriptors and the Region Tracker Contract
//!
//! The resource tree is built from two ordered region lists — all physical
//! memory, and reserved memory — owned by an earlier, more primitive
//! tracker. That tracker is represented here as the [`RegionSource`] trait
//! so the builder never touches process-wide state and tests can supply
//! synthetic region sets.
//!
//! # The allocation-during-iteration hazard
//! The tracker's allocator may register a *new* reservation as a side
//! effect of satisfying a request, mutating the reserved list. The trait
//! therefore hands out regions as plain slices: holding a `&[Region]`
//! across the `&mut self` call to [`RegionSource::allocate`] does not
//! borrow-check, so all allocation is forced to happen strictly before
//! any iteration begins.

use core::ptr::NonNull;

use crate::addr::PhysAddr;

/// A contiguous physical address range tracked during early boot.
///
/// `start` and `end` are both inclusive. Whether a region describes
/// ordinary memory or an out-of-band reservation is conveyed by which
/// tracker list it appears in, not by a field.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Region {
    /// First byte of the region.
    pub start: PhysAddr,
    /// Last byte of the region (inclusive).
    pub end: PhysAddr,
    /// Present in the physical address space but intentionally excluded
    /// from the kernel's usable-memory mapping.
    pub nomap: bool,
}

impl Region {
    /// Create a new region over `[start, end]`.
    #[inline]
    pub const fn new(start: u64, end: u64) -> Self {
        Self {
            start: PhysAddr::new(start),
            end: PhysAddr::new(end),
            nomap: false,
        }
    }

    /// Create a new no-map region over `[start, end]`.
    #[inline]
    pub const fn new_nomap(start: u64, end: u64) -> Self {
        Self {
            start: PhysAddr::new(start),
            end: PhysAddr::new(end),
            nomap: true,
        }
    }

    /// Size of the region in bytes. A region spans at least one byte.
    #[inline]
    pub const fn size(&self) -> u64 {
        self.end.as_u64() - self.start.as_u64() + 1
    }

    /// Check whether an address lies within this region.
    #[inline]
    pub const fn contains(&self, addr: PhysAddr) -> bool {
        self.start.as_u64() <= addr.as_u64() && addr.as_u64() <= self.end.as_u64()
    }

    /// Check whether this region overlaps another.
    #[inline]
    pub const fn overlaps(&self, other: &Region) -> bool {
        self.start.as_u64() <= other.end.as_u64() && other.start.as_u64() <= self.end.as_u64()
    }
}

/// One block of storage handed out by the region tracker.
///
/// Opaque handle: the builder turns it into node storage, and returns it
/// unchanged (with the original size) if construction has to be rolled
/// back.
#[derive(Clone, Copy, Debug)]
pub struct Block {
    ptr: NonNull<u8>,
}

impl Block {
    /// Wrap a pointer to the start of an allocated block.
    #[inline]
    pub const fn new(ptr: NonNull<u8>) -> Self {
        Self { ptr }
    }

    /// Pointer to the first byte of the block.
    #[inline]
    pub const fn as_ptr(self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

/// The early-boot region tracker, as seen by the resource tree builder.
///
/// # Contract
/// - Both region lists are finite and in tracker-defined order.
/// - The lists do not change while the builder runs, except through
///   [`allocate`](Self::allocate)/[`free`](Self::free) on this handle:
///   the boot sequence guarantees no other party registers regions during
///   this phase.
/// - `allocate` is permitted to record the returned block as a new
///   reservation; such a reservation starts inside tracked memory.
/// - `free` must accept exactly the block and size of a prior `allocate`.
pub trait RegionSource {
    /// All physical memory regions, in tracker order.
    fn memory(&self) -> &[Region];

    /// All reserved regions, in tracker order.
    fn reserved(&self) -> &[Region];

    /// One-shot allocation of `size` bytes aligned to `align`.
    ///
    /// Returns `None` when no suitable range exists. The returned block
    /// is directly addressable (early boot runs identity-mapped).
    fn allocate(&mut self, size: usize, align: usize) -> Option<Block>;

    /// Return a block obtained from [`allocate`](Self::allocate).
    fn free(&mut self, block: Block, size: usize);

    /// Check whether an address falls inside any tracked memory region.
    fn is_memory(&self, addr: PhysAddr) -> bool {
        self.memory().iter().any(|r| r.contains(addr))
    }
}
