use std::fmt::{Debug, Display, Formatter};
use std::ops::{Add, Sub};

use crate::util::{PAGE_MASK, PAGE_SHIFT};
use pagemap2::{PageMapError, VirtualMemoryArea};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[repr(transparent)]
#[derive(
    Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
/// Physical memory address.
///
/// A newtype wrapper around a physical address value.
pub struct PhysAddr(usize);

impl Debug for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("PhysAddr(0x{:02x})", self.0))
    }
}

impl Display for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl PhysAddr {
    /// Creates a new physical address.
    pub const fn new(addr: usize) -> Self {
        PhysAddr(addr)
    }

    /// Returns the address as a usize.
    pub const fn as_usize(&self) -> usize {
        self.0
    }

    /// Physical frame number of the page containing this address.
    pub const fn pfn(&self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Offset of this address within its page.
    pub const fn page_offset(&self) -> usize {
        self.0 & PAGE_MASK
    }
}

/// Resolves virtual addresses of the current process to physical addresses.
pub trait VirtToPhysResolver {
    /// Errors that can occur during physical address resolution
    type Error;

    /// Physical addresses of every page in `region`, in virtual address order.
    ///
    /// Pages that are not present resolve to `PhysAddr(0)`.
    ///
    /// # Errors
    ///
    /// Returns an error if pagemap cannot be read.
    fn get_phys_range(&mut self, region: VirtualMemoryArea) -> Result<Vec<PhysAddr>, Self::Error>;
}

/// Errors that can happen during PageMap operations
#[derive(Debug, Error)]
#[error(transparent)]
pub struct LinuxPageMapError(#[from] PageMapError);

/// Virtual to physical address translator using Linux pagemap.
///
/// Uses `/proc/{pid}/pagemap` to translate virtual to physical addresses.
/// Requires root privileges, otherwise the kernel reports PFN 0 for every page.
pub struct LinuxPageMap {
    pagemap_wrapper: pagemap2::PageMap,
}

impl LinuxPageMap {
    /// Creates a new pagemap for the current process.
    ///
    /// # Errors
    ///
    /// Returns an error if opening `/proc/self/pagemap` fails.
    pub fn new() -> Result<LinuxPageMap, LinuxPageMapError> {
        let res = LinuxPageMap {
            pagemap_wrapper: pagemap2::PageMap::new(std::process::id() as u64)?,
        };
        Ok(res)
    }
}

impl VirtToPhysResolver for LinuxPageMap {
    type Error = LinuxPageMapError;
    fn get_phys_range(
        &mut self,
        memory_region: VirtualMemoryArea,
    ) -> Result<Vec<PhysAddr>, Self::Error> {
        let entries = self.pagemap_wrapper.pagemap_vma(&memory_region)?;
        let frames = entries
            .into_iter()
            .map(|e| match e.pfn() {
                Ok(pfn) => Ok(PhysAddr((pfn as usize) << PAGE_SHIFT)),
                Err(PageMapError::PageNotPresent) => Ok(PhysAddr(0)),
                Err(e) => Err(e.into()),
            })
            .collect::<Result<Vec<PhysAddr>, Self::Error>>()?;
        Ok(frames)
    }
}

impl From<PhysAddr> for usize {
    fn from(addr: PhysAddr) -> usize {
        addr.0
    }
}

impl From<PhysAddr> for u64 {
    fn from(addr: PhysAddr) -> u64 {
        addr.0 as u64
    }
}

impl Add<usize> for PhysAddr {
    type Output = PhysAddr;

    fn add(self, rhs: usize) -> Self::Output {
        PhysAddr(self.0 + rhs)
    }
}

impl Sub<PhysAddr> for PhysAddr {
    type Output = usize;

    fn sub(self, rhs: PhysAddr) -> Self::Output {
        assert!(self.0 >= rhs.0);
        self.0 - rhs.0
    }
}

#[cfg(test)]
mod tests {
    use super::PhysAddr;

    #[test]
    fn test_phys_addr_parts() {
        let p = PhysAddr::new(0x1234_5678);
        assert_eq!(p.pfn(), 0x12345);
        assert_eq!(p.page_offset(), 0x678);
        assert_eq!(format!("{}", p), "0x12345678");
        assert_eq!(format!("{:?}", p), "PhysAddr(0x12345678)");
        assert_eq!((p + 0x10) - p, 0x10);
    }

    #[test]
    fn test_phys_addr_order() {
        let mut addrs = vec![PhysAddr::new(3), PhysAddr::new(1), PhysAddr::new(2)];
        addrs.sort();
        assert_eq!(
            addrs,
            vec![PhysAddr::new(1), PhysAddr::new(2), PhysAddr::new(3)]
        );
    }
}
