//! Double-sided Rowhammer.
//!
//! This crate provides a hammerer that activates the two rows surrounding a victim row
//! in alternation, flushing both after every access so each read reaches DRAM. The
//! victim row is checked against its fill pattern afterwards.
//!
//! Implements the [`bankhammer_core::hammerer::Hammering`] trait.
//!
//! # Use Cases
//!
//! - Sweeping a buffer with [`bankhammer_core::sweep::Sweep`]
//! - Reproducing a known flipping victim

#![warn(missing_docs)]

mod double_sided;

pub use double_sided::DoubleSided;
