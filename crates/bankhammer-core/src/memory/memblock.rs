use std::ptr::null_mut;

use super::{BytePointer, MemoryError};
use crate::util::PAGE_SIZE;
use libc::{MAP_ANONYMOUS, MAP_POPULATE, MAP_PRIVATE};
use log::debug;

/// A managed memory region.
///
/// The single buffer every component of a run reads and writes. It is never
/// accessed by more than one logical operation at a time.
#[derive(Clone, Debug)]
pub struct Memory {
    /// Block pointer
    pub ptr: *mut u8,
    /// Block length in bytes
    pub len: usize,
}

unsafe impl Send for Memory {}

impl Memory {
    /// Creates a new memory block with the given pointer and length.
    pub fn new(ptr: *mut u8, len: usize) -> Self {
        Memory { ptr, len }
    }

    /// Allocates memory using mmap.
    ///
    /// Creates a private anonymous mapping of `size` bytes and writes to every page so
    /// that each one is backed by a physical frame before any address is translated.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ZeroSizeLayout`] for `size == 0` and
    /// [`MemoryError::AllocFailed`] if mmap fails.
    pub fn mmap(size: usize) -> Result<Self, MemoryError> {
        if size == 0 {
            return Err(MemoryError::ZeroSizeLayout);
        }
        let p = unsafe {
            libc::mmap(
                null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS | MAP_POPULATE,
                -1,
                0,
            )
        };
        if p == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error().into());
        }
        let memory = Memory::new(p as *mut u8, size);
        memory.touch_pages();
        debug!("mmap'd {} bytes at {:p}", size, memory.ptr);
        Ok(memory)
    }

    /// Zeroes the first word of every page.
    pub fn touch_pages(&self) {
        for offset in (0..self.len).step_by(PAGE_SIZE) {
            unsafe { std::ptr::write_volatile(self.ptr.byte_add(offset) as *mut u64, 0) };
        }
    }

    /// Deallocates the memory block.
    ///
    /// Unmaps the memory region using munmap. Consumes self.
    pub fn dealloc(self) {
        unsafe { libc::munmap(self.ptr as *mut libc::c_void, self.len) };
    }
}

impl BytePointer for Memory {
    fn addr(&self, offset: usize) -> *mut u8 {
        assert!(
            offset < self.len,
            "Memory::addr failed. Offset {} >= {}",
            offset,
            self.len
        );
        unsafe { self.ptr.byte_add(offset) }
    }
    fn ptr(&self) -> *mut u8 {
        self.ptr
    }
    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::Memory;
    use crate::memory::{BytePointer, MemoryError};
    use crate::util::{PAGE_SIZE, ROW_SIZE};

    #[test]
    fn test_mmap_rows() {
        let memory = Memory::mmap(4 * ROW_SIZE).expect("mmap");
        assert_eq!(memory.len(), 4 * ROW_SIZE);
        assert_eq!(memory.num_rows(ROW_SIZE), 4);
        assert_eq!(memory.ptr() as usize % PAGE_SIZE, 0);
        assert_eq!(memory.row(2, ROW_SIZE) as usize, memory.ptr() as usize + 2 * ROW_SIZE);
        let first = unsafe { std::ptr::read_volatile(memory.addr(0)) };
        assert_eq!(first, 0);
        memory.dealloc();
    }

    #[test]
    fn test_mmap_zero_size() {
        assert!(matches!(Memory::mmap(0), Err(MemoryError::ZeroSizeLayout)));
    }

    #[test]
    #[should_panic]
    fn test_addr_out_of_bounds() {
        let memory = Memory::new(std::ptr::null_mut(), ROW_SIZE);
        memory.addr(ROW_SIZE);
    }
}
