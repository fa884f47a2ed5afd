use crate::memory::{MemConfiguration, PhysAddr, XorSource};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// DRAM address with bank, row, and column components.
///
/// Represents the physical organization of a memory address in DRAM,
/// decoded from a physical address using a [`DramGeometry`].
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DRAMAddr {
    /// Bank selector
    pub bank: usize,
    /// Row number
    pub row: usize,
    /// Column number
    pub col: usize,
}

impl Display for DRAMAddr {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        write!(fmt, "({}, {}, {})", self.bank, self.row, self.col)
    }
}

impl DRAMAddr {
    /// Creates a new DRAM address.
    ///
    /// # Arguments
    ///
    /// * `bank` - Bank selector
    /// * `row` - Row number
    /// * `col` - Column number
    pub fn new(bank: usize, row: usize, col: usize) -> Self {
        DRAMAddr { bank, row, col }
    }

    /// The same bank and column, `offset` rows further up.
    ///
    /// Returns `None` if the row index would leave `0..=max_row`.
    pub fn row_above(&self, offset: usize, max_row: usize) -> Option<DRAMAddr> {
        self.row
            .checked_add(offset)
            .filter(|&row| row <= max_row)
            .map(|row| DRAMAddr { row, ..*self })
    }

    /// The same bank and column, `offset` rows further down.
    ///
    /// Returns `None` on underflow.
    pub fn row_below(&self, offset: usize) -> Option<DRAMAddr> {
        self.row
            .checked_sub(offset)
            .map(|row| DRAMAddr { row, ..*self })
    }
}

/// Bidirectional mapping between physical addresses and their DRAM coordinates.
pub trait DramGeometry {
    /// Splits a physical address into (row, bank selector, column).
    fn decompose(&self, addr: PhysAddr) -> DRAMAddr;

    /// Builds the physical address whose decomposition is `dram`.
    ///
    /// Inverse of [`DramGeometry::decompose`] for every in-range triple.
    fn recompose(&self, dram: &DRAMAddr) -> PhysAddr;

    /// Largest row index this geometry can represent.
    fn max_row(&self) -> usize;
}

impl MemConfiguration {
    fn xor_bits(&self, row: usize, col: usize) -> usize {
        match self.xor_source {
            XorSource::AddressLowBits => col & self.bk_mask(),
            XorSource::RowLowBits => row & self.bk_mask(),
        }
    }
}

impl DramGeometry for MemConfiguration {
    fn decompose(&self, addr: PhysAddr) -> DRAMAddr {
        let p = addr.as_usize();
        let col = p & self.col_mask();
        let row = p >> self.row_shift;
        let bank = ((p >> self.bk_shift) & self.bk_mask()) ^ self.xor_bits(row, col);
        DRAMAddr { bank, row, col }
    }

    fn recompose(&self, dram: &DRAMAddr) -> PhysAddr {
        // solve bank = field ^ xor_bits for the bank field
        let field = (dram.bank ^ self.xor_bits(dram.row, dram.col)) & self.bk_mask();
        PhysAddr::new(
            (dram.row << self.row_shift)
                | (field << self.bk_shift)
                | (dram.col & self.col_mask()),
        )
    }

    fn max_row(&self) -> usize {
        MemConfiguration::max_row(self)
    }
}
