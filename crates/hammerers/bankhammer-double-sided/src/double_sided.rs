use bankhammer_core::aggressor::AggressorPair;
use bankhammer_core::hammerer::{Hammering, Never};
use bankhammer_core::memory::{
    AddressTranslation, BitFlip, CacheMaintenance, PhysAddr, evict_range,
};
use bankhammer_core::util::PAGE_SIZE;
use log::{debug, trace};

/// Double-sided hammerer.
///
/// Fills the victim row with the victim pattern and both aggressor rows with the aggressor
/// pattern, then alternately activates the two aggressors, evicting them after every access.
/// Rows are addressed physically and touched page by page through the translation, so a row
/// does not need to be virtually contiguous. Pages of a row that are not mapped are left alone.
pub struct DoubleSided<'a, M> {
    translation: &'a dyn AddressTranslation,
    cache: M,
    iterations: u64,
    row_size: usize,
    victim_pattern: u8,
    aggressor_pattern: u8,
}

/// A virtually contiguous piece of a physical row.
type Chunk = (*mut u8, usize);

impl<'a, M: CacheMaintenance> DoubleSided<'a, M> {
    /// Creates a hammerer.
    ///
    /// # Arguments
    ///
    /// * `translation` - Maps the rows of a pair to virtual addresses
    /// * `cache` - Cache maintenance backend
    /// * `iterations` - Activations of each aggressor per call
    /// * `row_size` - Row size in bytes, a power of two
    /// * `victim_pattern` - Byte the victim row is filled with
    /// * `aggressor_pattern` - Byte the aggressor rows are filled with
    pub fn new(
        translation: &'a dyn AddressTranslation,
        cache: M,
        iterations: u64,
        row_size: usize,
        victim_pattern: u8,
        aggressor_pattern: u8,
    ) -> Self {
        assert!(row_size.is_power_of_two(), "row size must be a power of two");
        DoubleSided {
            translation,
            cache,
            iterations,
            row_size,
            victim_pattern,
            aggressor_pattern,
        }
    }

    fn row_chunks(&self, addr: PhysAddr) -> Vec<Chunk> {
        let start = addr.as_usize() & !(self.row_size - 1);
        let chunk_len = self.row_size.min(PAGE_SIZE);
        (0..self.row_size)
            .step_by(chunk_len)
            .filter_map(|offset| {
                let phys = PhysAddr::new(start + offset);
                match self.translation.phys_to_virt(phys) {
                    Some(ptr) => Some((ptr, chunk_len)),
                    None => {
                        trace!("{} is not mapped", phys);
                        None
                    }
                }
            })
            .collect()
    }

    fn fill(&self, chunks: &[Chunk], pattern: u8) {
        for &(ptr, len) in chunks {
            // SAFETY: `ptr` comes from the translation and is valid up to the end of its page
            unsafe { std::ptr::write_bytes(ptr, pattern, len) };
        }
    }

    fn evict(&self, chunks: &[Chunk]) {
        for &(ptr, len) in chunks {
            evict_range(&self.cache, ptr, len);
        }
    }

    fn check(&self, chunks: &[Chunk]) -> Vec<BitFlip> {
        let mut flips = vec![];
        for &(ptr, len) in chunks {
            for i in 0..len {
                let addr = ptr.wrapping_add(i);
                // SAFETY: see `fill`
                let observed = unsafe { std::ptr::read_volatile(addr) };
                if let Some(flip) = BitFlip::from_observed(addr, self.victim_pattern, observed) {
                    flips.push(flip);
                }
            }
        }
        flips
    }
}

impl<M: CacheMaintenance> Hammering for DoubleSided<'_, M> {
    type Error = Never;

    fn hammer(&self, pair: &AggressorPair) -> Result<Vec<BitFlip>, Self::Error> {
        let victim = self.row_chunks(pair.victim.phys);
        let aggressor_rows = [
            self.row_chunks(pair.aggressors[0].phys),
            self.row_chunks(pair.aggressors[1].phys),
        ];
        self.fill(&victim, self.victim_pattern);
        for row in &aggressor_rows {
            self.fill(row, self.aggressor_pattern);
        }
        self.evict(&victim);
        for row in &aggressor_rows {
            self.evict(row);
        }
        self.cache.fence();

        let a1 = pair.aggressors[0].ptr as *const u8;
        let a2 = pair.aggressors[1].ptr as *const u8;
        debug!("Hammering {} for {} iterations", pair, self.iterations);
        for _ in 0..self.iterations {
            // SAFETY: aggressor pointers come from the translation
            unsafe {
                std::ptr::read_volatile(a1);
                std::ptr::read_volatile(a2);
            }
            self.cache.evict(a1);
            self.cache.evict(a2);
            self.cache.fence();
        }

        self.evict(&victim);
        self.cache.fence();
        let flips = self.check(&victim);
        if !flips.is_empty() {
            debug!("{} flips in victim {}", flips.len(), pair.victim.phys);
        }
        Ok(flips)
    }
}
