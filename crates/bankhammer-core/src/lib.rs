//! # Bankhammer Core
//!
//! `bankhammer-core` infers the DRAM bank of physical rows from access timing and uses the
//! DRAM address geometry to mount double-sided Rowhammer attacks on every row of a buffer.
//!
//! ## Architecture Overview
//!
//! Two pipelines share one buffer and its address translation:
//!
//! - [`classifier::BankClassifier`] - Partitions row addresses into banks from pairwise
//!   latencies measured by a [`memory::MemoryTupleTimer`]. Used to inspect bank assignment.
//!
//! - [`sweep::Sweep`] - Selects aggressors for every victim row with an
//!   [`aggressor::AggressorSelector`], which derives bank membership from the
//!   [`memory::DramGeometry`] instead of timing, and hammers them through a
//!   [`hammerer::Hammering`] implementation.
//!
//! ## Main Components
//!
//! - [`memory`] module - Physical addresses, pagemap translation, the address geometry,
//!   cache maintenance and the timing oracle.
//!
//! - [`calibrate`] module - Latency histograms for choosing thresholds.
//!
//! - [`config`] module - The JSON run configuration.
//!
//! - [`util`] module - Constants, sizes, progress bars and a seedable RNG.
//!
//! ## Platform Support
//!
//! x86_64 and aarch64 Linux. Translation reads `/proc/self/pagemap`, which requires root.

#![warn(missing_docs)]

pub mod aggressor;
pub mod calibrate;
pub mod classifier;
pub mod config;
pub mod hammerer;
pub mod memory;
pub mod sweep;
pub mod util;

pub use aggressor::{AggressorPair, AggressorSelector, SelectError};
pub use classifier::{BankClassifier, BankId, BankMap, RoundRobin};
pub use config::{ConfigError, HammerConfig};
pub use sweep::{FlipReport, Sweep, SweepConfig, SweepResult};
