//! Early-Boot Region Tracker
//!
//! [`BootRegions`] is the primitive memory tracker that exists before any
//! general-purpose allocator: two fixed-capacity region lists (all
//! physical memory, reserved memory) and a one-shot carve-out allocator.
//!
//! # Design
//! - No heap anywhere; both lists are inline arrays with explicit lengths
//! - Regions are kept in registration order and never merged
//! - `allocate` carves from the top of tracked memory, skipping existing
//!   reservations, and **records the carved range as a new reservation**.
//!   That side effect is the reason the resource tree builder must finish
//!   all allocation before iterating these lists.

use core::ptr::NonNull;

use log::{debug, warn};

use crate::addr::PhysAddr;
use crate::region::{Block, Region, RegionSource};

/// Capacity of each region list.
pub const MAX_REGIONS: usize = 32;

/// Error type for region registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionError {
    /// The region list is full.
    TooManyRegions,
    /// The region's start exceeds its end.
    InvalidRange,
}

impl core::fmt::Display for RegionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TooManyRegions => write!(f, "region list is full"),
            Self::InvalidRange => write!(f, "region start exceeds end"),
        }
    }
}

const EMPTY: Region = Region::new(0, 0);

/// The early-boot region tracker.
///
/// Addresses registered with [`add_memory`](Self::add_memory) must be
/// directly addressable: early boot runs identity-mapped, and
/// [`allocate`](Self::allocate) hands out pointers into that memory.
pub struct BootRegions {
    memory: [Region; MAX_REGIONS],
    memory_len: usize,
    reserved: [Region; MAX_REGIONS],
    reserved_len: usize,
}

impl BootRegions {
    /// Create a tracker with no regions registered.
    pub const fn new() -> Self {
        Self {
            memory: [EMPTY; MAX_REGIONS],
            memory_len: 0,
            reserved: [EMPTY; MAX_REGIONS],
            reserved_len: 0,
        }
    }

    /// Register a physical memory region.
    pub fn add_memory(&mut self, region: Region) -> Result<(), RegionError> {
        if region.start > region.end {
            return Err(RegionError::InvalidRange);
        }
        if self.memory_len == MAX_REGIONS {
            return Err(RegionError::TooManyRegions);
        }
        self.memory[self.memory_len] = region;
        self.memory_len += 1;
        Ok(())
    }

    /// Register a reserved region.
    pub fn add_reserved(&mut self, region: Region) -> Result<(), RegionError> {
        if region.start > region.end {
            return Err(RegionError::InvalidRange);
        }
        if self.reserved_len == MAX_REGIONS {
            return Err(RegionError::TooManyRegions);
        }
        self.reserved[self.reserved_len] = region;
        self.reserved_len += 1;
        Ok(())
    }

    /// Find the highest aligned range of `size` bytes inside `region`
    /// that does not overlap any reservation.
    fn find_in_region(&self, region: &Region, size: u64, align: u64) -> Option<u64> {
        let mut limit = region.end;
        loop {
            let candidate = limit
                .checked_sub(size - 1)?
                .align_down(align);
            if candidate < region.start {
                return None;
            }
            let carved = Region::new(candidate.as_u64(), candidate.as_u64() + size - 1);
            match self.reserved().iter().find(|r| r.overlaps(&carved)) {
                None => return Some(candidate.as_u64()),
                // retry below the blocking reservation
                Some(r) => limit = r.start.checked_sub(1)?,
            }
        }
    }
}

impl RegionSource for BootRegions {
    fn memory(&self) -> &[Region] {
        &self.memory[..self.memory_len]
    }

    fn reserved(&self) -> &[Region] {
        &self.reserved[..self.reserved_len]
    }

    /// Carve `size` bytes out of tracked memory, top-down.
    ///
    /// The carved range is recorded in the reserved list before the block
    /// is returned, so callers iterating that list must not hold a borrow
    /// of it across this call.
    fn allocate(&mut self, size: usize, align: usize) -> Option<Block> {
        if size == 0 || !align.is_power_of_two() {
            return None;
        }
        if self.reserved_len == MAX_REGIONS {
            return None;
        }
        let size = size as u64;
        let found = self
            .memory()
            .iter()
            .filter_map(|m| self.find_in_region(m, size, align as u64))
            .max()?;

        self.reserved[self.reserved_len] = Region::new(found, found + size - 1);
        self.reserved_len += 1;
        debug!("early allocation: {size} bytes at {}", PhysAddr::new(found));

        NonNull::new(found as usize as *mut u8).map(Block::new)
    }

    /// Retire the reservation recorded for `block` by `allocate`.
    fn free(&mut self, block: Block, size: usize) {
        let start = block.as_ptr() as usize as u64;
        let end = start + size as u64 - 1;
        let Some(idx) = self
            .reserved()
            .iter()
            .position(|r| r.start.as_u64() == start && r.end.as_u64() == end)
        else {
            warn!("free of unknown block: {size} bytes at {}", PhysAddr::new(start));
            return;
        };
        self.reserved.copy_within(idx + 1..self.reserved_len, idx);
        self.reserved_len -= 1;
        self.reserved[self.reserved_len] = EMPTY;
    }
}

impl Default for BootRegions {
    fn default() -> Self {
        Self::new()
    }
}
