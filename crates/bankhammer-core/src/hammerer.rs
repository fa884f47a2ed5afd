//! Rowhammer hammering traits.
//!
//! This module defines the [`Hammering`] trait that hammering implementations implement
//! to disturb a victim row through its aggressors and report what changed.

use crate::aggressor::AggressorPair;
use crate::memory::BitFlip;
use thiserror::Error;

/// Trait for implementing Rowhammer hammering techniques.
///
/// Implementors fill the victim and aggressor rows, activate the aggressors and compare
/// the victim row against its fill pattern afterwards. No state is kept between calls,
/// so hammering the same pair again reproduces the experiment.
///
/// # Associated Types
///
/// * `Error` - The error type returned by hammering operations. Must implement [`std::error::Error`].
///
/// # Examples
///
/// See `bankhammer-double-sided` for the double-sided implementation.
pub trait Hammering {
    /// The error type returned by hammering operations.
    type Error: std::error::Error;

    /// Hammers the aggressors of `pair` and returns the flips found in the victim row.
    ///
    /// The number of returned flips is the number of victim bytes that differ from the
    /// victim pattern.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn hammer(&self, pair: &AggressorPair) -> Result<Vec<BitFlip>, Self::Error>;
}

/// Error type that can never occur.
#[derive(Debug, Error)]
pub enum Never {}
