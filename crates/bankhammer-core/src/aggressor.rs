//! Derivation of the two aggressor rows for a victim from the address geometry.
use std::fmt::{self, Display, Formatter};

use crate::memory::{AddressTranslation, DRAMAddr, DramGeometry, PhysAddr};
use log::{debug, trace};
use thiserror::Error;

/// A physical address together with the virtual address it is mapped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedAddr {
    /// Physical address
    pub phys: PhysAddr,
    /// Virtual address of `phys` in the probed buffer
    pub ptr: *mut u8,
}

/// The two rows hammered to disturb a victim, both in the victim's bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggressorPair {
    /// The victim the pair was derived for
    pub victim: MappedAddr,
    /// Aggressors at `row + row_offset` and `row - row_offset`
    pub aggressors: [MappedAddr; 2],
    /// Row distance between victim and aggressors
    pub row_offset: usize,
}

impl Display for AggressorPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "victim {} aggressors ({}, {}) at +/-{}",
            self.victim.phys, self.aggressors[0].phys, self.aggressors[1].phys, self.row_offset
        )
    }
}

/// Reasons a victim has no usable aggressor pair. The victim is skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    /// `row - offset` underflows or `row + offset` leaves the row field
    #[error("Row {row} has no neighbours at distance {offset}")]
    RowOutOfRange {
        /// Victim row
        row: usize,
        /// Requested distance
        offset: usize,
    },
    /// The victim itself is not mapped
    #[error("Victim {0} is not mapped")]
    VictimUnmapped(PhysAddr),
    /// An aggressor stayed unmapped for every attempt
    #[error("No mapped aggressors after {attempts} attempts")]
    Exhausted {
        /// Number of attempts made
        attempts: usize,
    },
}

/// Picks aggressors in the victim's bank by recomposing neighbouring rows.
pub struct AggressorSelector<'a> {
    geometry: &'a dyn DramGeometry,
    translation: &'a dyn AddressTranslation,
    attempts: usize,
}

impl<'a> AggressorSelector<'a> {
    /// Creates a selector giving up after `attempts` translation attempts per victim.
    pub fn new(
        geometry: &'a dyn DramGeometry,
        translation: &'a dyn AddressTranslation,
        attempts: usize,
    ) -> Self {
        AggressorSelector {
            geometry,
            translation,
            attempts,
        }
    }

    /// The physical aggressor addresses for `victim` at `row_offset`, without translating them.
    ///
    /// Both keep the victim's bank selector and column.
    ///
    /// # Errors
    ///
    /// Returns [`SelectError::RowOutOfRange`] if either neighbour row does not exist.
    pub fn candidates(
        &self,
        victim: PhysAddr,
        row_offset: usize,
    ) -> Result<[PhysAddr; 2], SelectError> {
        let dram = self.geometry.decompose(victim);
        let out_of_range = || SelectError::RowOutOfRange {
            row: dram.row,
            offset: row_offset,
        };
        let above: DRAMAddr = dram
            .row_above(row_offset, self.geometry.max_row())
            .ok_or_else(out_of_range)?;
        let below: DRAMAddr = dram.row_below(row_offset).ok_or_else(out_of_range)?;
        Ok([
            self.geometry.recompose(&above),
            self.geometry.recompose(&below),
        ])
    }

    /// Selects and translates the aggressors of `victim`.
    ///
    /// Translation is retried while either aggressor is unmapped, up to the configured
    /// number of attempts.
    ///
    /// # Errors
    ///
    /// All errors are recoverable. The caller skips the victim.
    pub fn select(&self, victim: PhysAddr, row_offset: usize) -> Result<AggressorPair, SelectError> {
        let victim_ptr = self
            .translation
            .phys_to_virt(victim)
            .ok_or(SelectError::VictimUnmapped(victim))?;
        let [upper, lower] = self.candidates(victim, row_offset)?;
        for attempt in 1..=self.attempts {
            match (
                self.translation.phys_to_virt(upper),
                self.translation.phys_to_virt(lower),
            ) {
                (Some(u), Some(l)) => {
                    trace!("Aggressors for {} found after {} attempts", victim, attempt);
                    return Ok(AggressorPair {
                        victim: MappedAddr {
                            phys: victim,
                            ptr: victim_ptr,
                        },
                        aggressors: [
                            MappedAddr { phys: upper, ptr: u },
                            MappedAddr { phys: lower, ptr: l },
                        ],
                        row_offset,
                    });
                }
                _ => trace!("Attempt {}: ({}, {}) not mapped", attempt, upper, lower),
            }
        }
        debug!(
            "Giving up on {} after {} attempts, aggressors ({}, {})",
            victim, self.attempts, upper, lower
        );
        Err(SelectError::Exhausted {
            attempts: self.attempts,
        })
    }
}
