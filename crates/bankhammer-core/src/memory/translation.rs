use std::collections::HashMap;

use crate::memory::{
    BytePointer, LinuxPageMap, LinuxPageMapError, Memory, PhysAddr, VirtToPhysResolver,
};
use crate::util::{PAGE_MASK, PAGE_SHIFT, PAGE_SIZE};
use log::{debug, warn};
use pagemap2::VirtualMemoryArea;
use thiserror::Error;

/// Both directions of address translation over one buffer.
///
/// # Safety
///
/// A pointer returned by [`AddressTranslation::phys_to_virt`] must be valid for
/// reads and writes from the returned address up to the end of its page, for as
/// long as the implementor is alive.
pub unsafe trait AddressTranslation {
    /// Physical address backing `virt`, or `None` if it is outside the buffer or not present.
    fn virt_to_phys(&self, virt: *const u8) -> Option<PhysAddr>;

    /// Virtual address mapping `phys`, or `None` if no page of the buffer is backed by it.
    fn phys_to_virt(&self, phys: PhysAddr) -> Option<*mut u8>;
}

/// Errors that can occur while building a translator.
#[derive(Debug, Error)]
pub enum TranslationError {
    /// pagemap could not be read
    #[error(transparent)]
    PageMap(#[from] LinuxPageMapError),
    /// The kernel reported no frame for any page of the buffer
    #[error("No physical frames resolved for {pages} pages. Are we root?")]
    NoFrames {
        /// Number of pages looked up
        pages: usize,
    },
}

/// Page granular translation table built once from `/proc/self/pagemap`.
///
/// Physical frame 0 is treated as unmapped, which is what the kernel reports
/// for unprivileged readers and for pages that are not present.
#[derive(Debug)]
pub struct PageMapTranslator {
    base: *mut u8,
    frames: Vec<PhysAddr>,
    pages_by_pfn: HashMap<usize, usize>,
}

impl PageMapTranslator {
    /// Resolves every page of `memory`.
    ///
    /// # Errors
    ///
    /// Fails if pagemap is unavailable or resolves no page at all.
    pub fn new(memory: &Memory) -> Result<Self, TranslationError> {
        let mut pagemap = LinuxPageMap::new()?;
        let start = memory.ptr() as u64;
        let frames = pagemap.get_phys_range(VirtualMemoryArea::from((
            start,
            start + memory.len() as u64,
        )))?;
        let pages = frames.len();
        // SAFETY: `frames` holds one entry per page of `memory`
        let translator = unsafe { Self::from_frames(memory.ptr(), frames) };
        if translator.pages_by_pfn.is_empty() {
            return Err(TranslationError::NoFrames { pages });
        }
        if translator.pages_by_pfn.len() < pages {
            warn!(
                "{} of {} pages have no physical frame",
                pages - translator.pages_by_pfn.len(),
                pages
            );
        }
        debug!(
            "Resolved {} pages starting at {:p}",
            translator.pages_by_pfn.len(),
            memory.ptr()
        );
        Ok(translator)
    }

    /// Builds a translator from known frames, one per page starting at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be page aligned and valid for reads and writes of
    /// `frames.len() * PAGE_SIZE` bytes while the translator is in use.
    pub unsafe fn from_frames(base: *mut u8, frames: Vec<PhysAddr>) -> Self {
        let pages_by_pfn = frames
            .iter()
            .enumerate()
            .filter(|(_, frame)| frame.pfn() != 0)
            .map(|(page, frame)| (frame.pfn(), page))
            .collect();
        PageMapTranslator {
            base,
            frames,
            pages_by_pfn,
        }
    }

    /// Length of the translated buffer in bytes.
    pub fn len(&self) -> usize {
        self.frames.len() * PAGE_SIZE
    }

    /// Returns true if the buffer has no pages.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Physical addresses of every `stride`-aligned offset into the buffer that has a frame.
    ///
    /// The result is sorted and free of duplicates.
    pub fn strided_phys(&self, stride: usize) -> Vec<PhysAddr> {
        let mut addrs: Vec<PhysAddr> = (0..self.len())
            .step_by(stride)
            .filter_map(|offset| self.virt_to_phys(self.base.wrapping_add(offset)))
            .collect();
        addrs.sort_unstable();
        addrs.dedup();
        addrs
    }
}

unsafe impl AddressTranslation for PageMapTranslator {
    fn virt_to_phys(&self, virt: *const u8) -> Option<PhysAddr> {
        let offset = (virt as usize).checked_sub(self.base as usize)?;
        let frame = self.frames.get(offset / PAGE_SIZE)?;
        if frame.pfn() == 0 {
            return None;
        }
        Some(PhysAddr::new((frame.pfn() << PAGE_SHIFT) | (offset & PAGE_MASK)))
    }

    fn phys_to_virt(&self, phys: PhysAddr) -> Option<*mut u8> {
        let page = self.pages_by_pfn.get(&phys.pfn())?;
        Some(self.base.wrapping_add(page * PAGE_SIZE + phys.page_offset()))
    }
}
