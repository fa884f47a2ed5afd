//! Hugepage-backed buffers for Bankhammer.
//!
//! A hammered buffer is mostly physically contiguous when it lives in a single 1 GiB
//! hugepage, so nearly every victim row finds both aggressors inside the buffer.
//! Hugepages must be configured at boot time via kernel parameters.
//!
//! # Platform Requirements
//!
//! - x86_64 Linux with 1GB hugepage support
//! - Hugepages must be pre-allocated via kernel boot parameters or runtime configuration
//! - Mounted hugepagefs at `/dev/hugepages`

#![warn(missing_docs)]

mod hugepage;

pub use hugepage::*;
