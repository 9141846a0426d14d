//! Physical Address Type
//!
//! Type-safe wrapper for physical memory addresses, so that raw integers,
//! byte counts and addresses cannot be mixed up by accident.
//!
//! The resource tree only ever deals in physical addresses; virtual
//! addressing is not a concern of this crate.

use core::fmt;

/// A physical memory address.
///
/// Newtype wrapper around the raw address. Physical addresses cannot be
/// dereferenced directly; the early-boot identity mapping is the caller's
/// business.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(u64);

impl PhysAddr {
    /// The lowest physical address.
    pub const ZERO: Self = Self(0);

    /// The highest address representable on a 48-bit physical bus.
    pub const MAX: Self = Self(0x0000_FFFF_FFFF_FFFF);

    /// Create a new physical address.
    ///
    /// # Panics
    /// Panics in debug mode if the address uses more than 48 bits.
    #[inline]
    pub const fn new(addr: u64) -> Self {
        // ARM64 with 48-bit physical addressing
        debug_assert!(addr <= Self::MAX.0);
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Get the raw address as usize (for pointer arithmetic).
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Align the address down to `align`, which must be a power of two.
    #[inline]
    pub const fn align_down(self, align: u64) -> Self {
        debug_assert!(align.is_power_of_two());
        Self(self.0 & !(align - 1))
    }

    /// Check whether the address is a multiple of `align`.
    #[inline]
    pub const fn is_aligned(self, align: u64) -> bool {
        debug_assert!(align.is_power_of_two());
        self.0 & (align - 1) == 0
    }

    /// Add an offset, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, offset: u64) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(v) if v <= Self::MAX.0 => Some(Self(v)),
            _ => None,
        }
    }

    /// Subtract an offset, returning `None` on underflow.
    #[inline]
    pub const fn checked_sub(self, offset: u64) -> Option<Self> {
        match self.0.checked_sub(offset) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#012x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#012x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment() {
        let addr = PhysAddr::new(0x8000_1234);
        assert!(!addr.is_aligned(4096));
        assert_eq!(addr.align_down(4096).as_u64(), 0x8000_1000);
        assert!(addr.align_down(4096).is_aligned(4096));
    }

    #[test]
    fn test_checked_arithmetic() {
        let addr = PhysAddr::new(0x1000);
        assert_eq!(addr.checked_add(0x234), Some(PhysAddr::new(0x1234)));
        assert_eq!(addr.checked_sub(0x2000), None);
        assert_eq!(PhysAddr::MAX.checked_add(1), None);
    }
}
