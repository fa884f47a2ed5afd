//! # Bankhammer
//!
//! Timing-based DRAM bank inference and double-sided Rowhammer.
//!
//! This crate re-exports [`bankhammer_core`] and, behind features, the hammerer and
//! allocator modules:
//!
//! - `double-sided` (default): [`double_sided::DoubleSided`]
//! - `hugepage`: [`hugepage::HugepageAllocator`]

pub use bankhammer_core::*;

#[cfg(feature = "double-sided")]
pub use bankhammer_double_sided as double_sided;

#[cfg(feature = "hugepage")]
pub use bankhammer_hugepage as hugepage;
