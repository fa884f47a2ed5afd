//! The `memory` module provides the memory abstractions the classifier, the selector and the hammerer share.
//!
//! The `memory` module provides the following abstractions:
//! - `Memory`: A managed memory region allocated with mmap.
//! - `BytePointer`: A trait for accessing memory as a byte pointer.
//! - `PhysAddr`, `LinuxPageMap` and `VirtToPhysResolver`: physical addresses and their resolution via pagemap.
//! - `AddressTranslation` and `PageMapTranslator`: both directions of virtual/physical translation over one buffer.
//! - `DRAMAddr`, `MemConfiguration` and `DramGeometry`: the (row, bank, column) layout of a physical address.
//! - `CacheMaintenance`: cache line eviction and fences, one backend per instruction set.
//! - `Clock`, `MemoryTupleTimer` and `TimingOracle`: timed access to address pairs.
//!
//! The `memory` module also provides the following helper functions:
//! - `construct_memory_tuple_timer`: A function that constructs a memory tuple timer.
mod cache;
mod dram_addr;
mod mem_configuration;
mod memblock;
mod timer;
mod translation;
mod virt_to_phys;

pub use self::cache::{CacheMaintenance, NativeCache, evict_range};
pub use self::dram_addr::{DRAMAddr, DramGeometry};
pub use self::mem_configuration::{MemConfiguration, XorSource};
pub use self::memblock::Memory;
pub use self::timer::{
    Clock, ClockError, ClockKind, CountingThreadClock, CycleCounter, LatencyClass,
    MemoryTupleTimer, MonotonicClock, ParseClockKindError, Thresholds, TimingOracle,
    construct_memory_tuple_timer,
};
pub use self::translation::{AddressTranslation, PageMapTranslator, TranslationError};
pub use self::virt_to_phys::PhysAddr;
pub use self::virt_to_phys::{LinuxPageMap, LinuxPageMapError, VirtToPhysResolver};

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during memory operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Memory allocation failed
    #[error("Allocation failed: {0}")]
    AllocFailed(#[from] std::io::Error),
    /// Attempted to create a zero-size memory layout
    #[error("Zero size layout")]
    ZeroSizeLayout,
}

/// Trait for accessing memory as a byte pointer.
///
/// Provides low-level access to memory regions with byte-level addressing.
#[allow(clippy::len_without_is_empty)]
pub trait BytePointer {
    /// Returns a mutable pointer to the byte at the given offset.
    ///
    /// # Safety
    ///
    /// The returned pointer is valid only while the memory region exists.
    /// Dereferencing requires unsafe code.
    fn addr(&self, offset: usize) -> *mut u8;

    /// Returns a mutable pointer to the start of the memory region.
    fn ptr(&self) -> *mut u8;

    /// Returns the total length of the memory region in bytes.
    fn len(&self) -> usize;

    /// Number of whole rows of `row_size` bytes in this region.
    fn num_rows(&self, row_size: usize) -> usize {
        self.len() / row_size
    }

    /// Pointer to the start of row `idx`.
    fn row(&self, idx: usize, row_size: usize) -> *mut u8 {
        self.addr(idx * row_size)
    }
}

/// Represents a bit flip detected in memory.
///
/// A bit flip is a change in memory where one or more bits differ from their
/// expected value. This is the primary indicator of a successful Rowhammer attack.
#[derive(Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub struct BitFlip {
    /// Virtual address where the bit flip occurred
    pub addr: usize,
    /// Bitmask indicating which bits flipped (1 = bit flipped)
    pub bitmask: u8,
    /// The expected data value (before the flip)
    pub data: u8,
}

/// Direction of bit flip transitions.
///
/// Indicates whether bits flipped from 0→1, 1→0, or multiple directions.
#[derive(Clone, Debug, Serialize, Eq, PartialEq)]
pub enum FlipDirection {
    /// Bit flipped from 0 to 1
    ZeroToOne,
    /// Bit flipped from 1 to 0
    OneToZero,
    /// Multiple bits flipped in (potentially) different directions
    Multiple(Vec<FlipDirection>),
    /// No bit flip occurred
    None,
}

impl core::fmt::Debug for BitFlip {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BitFlip")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("bitmask", &format_args!("{:#x}", self.bitmask))
            .field("data", &format_args!("{:#x}", self.data))
            .finish()
    }
}

impl BitFlip {
    /// Constructor for BitFlip
    pub fn new(addr: *const u8, bitmask: u8, data: u8) -> Self {
        BitFlip {
            addr: addr as usize,
            bitmask,
            data,
        }
    }

    /// Builds a flip from the expected and the observed byte, or `None` if they agree.
    pub fn from_observed(addr: *const u8, expected: u8, observed: u8) -> Option<Self> {
        match expected ^ observed {
            0 => None,
            bitmask => Some(BitFlip::new(addr, bitmask, expected)),
        }
    }

    /// Calculate the FlipDirection (1->0 or 0->1 or Multiple) observed in this BitFlip
    pub fn flip_direction(&self) -> FlipDirection {
        let direction_of = |bit: u8| {
            if self.data & bit != 0 {
                FlipDirection::OneToZero
            } else {
                FlipDirection::ZeroToOne
            }
        };
        match self.bitmask.count_ones() {
            0 => FlipDirection::None,
            1 => direction_of(self.bitmask),
            2.. => FlipDirection::Multiple(
                (0..8)
                    .map(|i| 1u8 << i)
                    .filter(|bit| self.bitmask & bit != 0)
                    .map(direction_of)
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BitFlip, FlipDirection};
    use crate::util::{AGGRESSOR_PATTERN, VICTIM_PATTERN};

    #[test]
    fn test_bitflip_direction() {
        let flip = BitFlip::new(std::ptr::null(), 0b0000_0000, 0xFF);
        assert_eq!(flip.flip_direction(), FlipDirection::None);
        let flip = BitFlip::new(std::ptr::null(), 0b0000_0001, 0b0000_0001);
        assert_eq!(flip.flip_direction(), FlipDirection::OneToZero);

        let flip = BitFlip::new(std::ptr::null(), 0b0000_0001, 0b1111_1110);
        assert_eq!(flip.flip_direction(), FlipDirection::ZeroToOne);

        let flip = BitFlip::new(std::ptr::null(), 0b0000_0011, 0b0000_0010);
        assert_eq!(
            flip.flip_direction(),
            FlipDirection::Multiple(vec![FlipDirection::ZeroToOne, FlipDirection::OneToZero])
        );
    }

    #[test]
    fn test_from_observed() {
        assert_eq!(
            BitFlip::from_observed(std::ptr::null(), VICTIM_PATTERN, VICTIM_PATTERN),
            None
        );
        // 0x55 -> 0x54: bit 0 dropped
        let flip = BitFlip::from_observed(std::ptr::null(), VICTIM_PATTERN, 0x54).unwrap();
        assert_eq!(flip.bitmask, 0x01);
        assert_eq!(flip.flip_direction(), FlipDirection::OneToZero);
        // 0x55 -> 0xAA: every bit flipped
        let flip =
            BitFlip::from_observed(std::ptr::null(), VICTIM_PATTERN, AGGRESSOR_PATTERN).unwrap();
        assert_eq!(flip.bitmask, 0xFF);
        assert!(matches!(flip.flip_direction(), FlipDirection::Multiple(d) if d.len() == 8));
    }
}
