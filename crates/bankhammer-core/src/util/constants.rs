/// Page shift value (12 bits) for 4KB pages
pub const PAGE_SHIFT: usize = 12;
/// Standard page size (4096 bytes)
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
/// Mask for extracting page offset
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Row shift value (13 bits) for 8KB rows
pub const ROW_SHIFT: usize = 13;
/// DRAM row size of one bank (8192 bytes)
pub const ROW_SIZE: usize = 1 << ROW_SHIFT;

/// Cache line size (64 bytes)
pub const CL_SIZE: usize = 64;

/// Number of banks assumed by the classifier
pub const NUM_BANKS: usize = 8;

/// Averaged latencies below this value are row buffer hits
pub const ROW_BUFFER_HIT_LATENCY: u64 = 290;
/// Averaged latencies at or above this value are row buffer conflicts
pub const ROW_BUFFER_CONFLICT_LATENCY: u64 = 390;

/// Number of timing samples averaged per address pair
pub const SAMPLES: usize = 10;

/// Aggressor activations per hammering round
pub const HAMMERS_PER_ITER: u64 = 5_000_000;

/// Upper bound on aggressor translation attempts per victim
pub const SELECT_ATTEMPTS: usize = 1000;

/// Byte written to every victim row before hammering
pub const VICTIM_PATTERN: u8 = 0x55;
/// Byte written to every aggressor row before hammering
pub const AGGRESSOR_PATTERN: u8 = 0xAA;

/// Latency histogram bucket width
pub const BUCKET_LAT_STEP: u64 = 20;
/// Number of latency histogram buckets (excluding overflow)
pub const NUM_LAT_BUCKETS: usize = 50;

/// Width of physical addresses in printed reports
pub const PHYS_ADDR_BITS: usize = 33;
