use crate::util::CL_SIZE;

/// Cache line eviction and memory ordering.
///
/// One backend exists per instruction set. Test code swaps in recording or
/// fault-injecting implementations.
pub trait CacheMaintenance {
    /// Evicts the cache line containing `addr` from every cache level.
    fn evict(&self, addr: *const u8);

    /// Full memory fence. Orders all previous loads, stores and evictions.
    fn fence(&self);
}

/// Evicts every cache line in `[addr, addr + len)`.
pub fn evict_range<C: CacheMaintenance + ?Sized>(cache: &C, addr: *const u8, len: usize) {
    for offset in (0..len).step_by(CL_SIZE) {
        cache.evict(addr.wrapping_add(offset));
    }
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use super::CacheMaintenance;
    use std::arch::x86_64::{_mm_clflush, _mm_mfence};

    /// `clflush` and `mfence`.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct Clflush;

    impl CacheMaintenance for Clflush {
        #[inline(always)]
        fn evict(&self, addr: *const u8) {
            unsafe { _mm_clflush(addr) }
        }

        #[inline(always)]
        fn fence(&self) {
            unsafe { _mm_mfence() }
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod arm {
    use super::CacheMaintenance;
    use std::arch::asm;

    /// `dc civac` to the point of coherency, `dsb sy; isb` as fence.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct DcCivac;

    impl CacheMaintenance for DcCivac {
        #[inline(always)]
        fn evict(&self, addr: *const u8) {
            unsafe { asm!("dc civac, {0}", in(reg) addr, options(nostack, preserves_flags)) }
        }

        #[inline(always)]
        fn fence(&self) {
            unsafe { asm!("dsb sy", "isb", options(nostack, preserves_flags)) }
        }
    }
}

#[cfg(target_arch = "x86_64")]
pub use self::x86::Clflush;
/// Cache maintenance backend of the build target.
#[cfg(target_arch = "x86_64")]
pub type NativeCache = Clflush;

#[cfg(target_arch = "aarch64")]
pub use self::arm::DcCivac;
/// Cache maintenance backend of the build target.
#[cfg(target_arch = "aarch64")]
pub type NativeCache = DcCivac;

#[cfg(test)]
mod tests {
    use super::{CacheMaintenance, NativeCache, evict_range};
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        evicted: RefCell<Vec<usize>>,
    }

    impl CacheMaintenance for Recorder {
        fn evict(&self, addr: *const u8) {
            self.evicted.borrow_mut().push(addr as usize);
        }
        fn fence(&self) {}
    }

    #[test]
    fn test_evict_range_lines() {
        let rec = Recorder::default();
        evict_range(&rec, 0x1000 as *const u8, 256);
        assert_eq!(*rec.evicted.borrow(), vec![0x1000, 0x1040, 0x1080, 0x10c0]);
    }

    #[test]
    fn test_native_evict_valid_memory() {
        let buf = vec![0x55u8; 4096];
        let cache = NativeCache::default();
        evict_range(&cache, buf.as_ptr(), buf.len());
        cache.fence();
        assert!(buf.iter().all(|&b| b == 0x55));
    }
}
