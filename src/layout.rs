//! Kernel Image Layout
//!
//! The running image contributes three fixed resource nodes — code, data
//! and bss — whose ranges come from link-time symbol addresses rather
//! than from the region tracker. The layout is injected as a plain value
//! so the builder stays free of linker-symbol plumbing and tests can use
//! synthetic section bounds.

use crate::addr::PhysAddr;

/// The three pre-declared sections of the running kernel image.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ImageSection {
    /// Executable kernel text.
    Code,
    /// Initialized kernel data.
    Data,
    /// Zero-initialized kernel data.
    Bss,
}

/// Number of fixed image-section nodes.
pub const IMAGE_SECTIONS: usize = 3;

impl ImageSection {
    /// All sections, in insertion order.
    pub const ALL: [Self; IMAGE_SECTIONS] = [Self::Code, Self::Data, Self::Bss];

    /// Canonical resource name for this section.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Code => "Kernel code",
            Self::Data => "Kernel data",
            Self::Bss => "Kernel bss",
        }
    }

    /// Index into the fixed-node array.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Code => 0,
            Self::Data => 1,
            Self::Bss => 2,
        }
    }
}

/// Physical bounds of the running image's sections.
///
/// All bounds are inclusive. A sane layout keeps the three sections
/// disjoint; a layout that violates this shows up as a fixed-node
/// insertion conflict during the build, which callers treat as fatal.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ImageLayout {
    pub code_start: PhysAddr,
    pub code_end: PhysAddr,
    pub data_start: PhysAddr,
    pub data_end: PhysAddr,
    pub bss_start: PhysAddr,
    pub bss_end: PhysAddr,
}

impl ImageLayout {
    /// Reference layout for a QEMU virt machine image loaded at
    /// `0x4008_0000`.
    pub const QEMU_VIRT: Self = Self::new(
        0x4008_0000,
        0x400f_ffff,
        0x4010_0000,
        0x4013_ffff,
        0x4014_0000,
        0x401f_ffff,
    );

    /// Create a layout from raw section bounds.
    pub const fn new(
        code_start: u64,
        code_end: u64,
        data_start: u64,
        data_end: u64,
        bss_start: u64,
        bss_end: u64,
    ) -> Self {
        Self {
            code_start: PhysAddr::new(code_start),
            code_end: PhysAddr::new(code_end),
            data_start: PhysAddr::new(data_start),
            data_end: PhysAddr::new(data_end),
            bss_start: PhysAddr::new(bss_start),
            bss_end: PhysAddr::new(bss_end),
        }
    }

    /// Bounds of one section.
    #[inline]
    pub const fn section(&self, section: ImageSection) -> (PhysAddr, PhysAddr) {
        match section {
            ImageSection::Code => (self.code_start, self.code_end),
            ImageSection::Data => (self.data_start, self.data_end),
            ImageSection::Bss => (self.bss_start, self.bss_end),
        }
    }
}
