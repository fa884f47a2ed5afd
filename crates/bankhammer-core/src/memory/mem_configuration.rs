use serde::{Deserialize, Serialize};

/// Source of the three bits the bank field is XORed with.
#[derive(Deserialize, Serialize, Debug, Copy, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum XorSource {
    /// The low bits of the physical address itself (inside the column)
    #[default]
    AddressLowBits,
    /// The low bits of the row index
    RowLowBits,
}

/// DRAM addressing configuration.
///
/// Describes where column, bank and row live in a physical address:
/// `column = addr & col_mask`, `row = addr >> row_shift` and
/// `bank = ((addr >> bk_shift) & bk_mask) ^ (xor source & bk_mask)`.
#[derive(Deserialize, Serialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct MemConfiguration {
    /// Number of column bits
    pub col_bits: usize,
    /// Bit shift for bank extraction
    pub bk_shift: usize,
    /// Number of bank bits
    pub bk_bits: usize,
    /// Bit shift for row extraction
    pub row_shift: usize,
    /// What the bank field is XORed with
    pub xor_source: XorSource,
}

impl Default for MemConfiguration {
    fn default() -> Self {
        MemConfiguration {
            col_bits: 13,
            bk_shift: 13,
            bk_bits: 3,
            row_shift: 16,
            xor_source: XorSource::AddressLowBits,
        }
    }
}

impl MemConfiguration {
    /// Bit mask for column extraction
    pub fn col_mask(&self) -> usize {
        (1 << self.col_bits) - 1
    }

    /// Bit mask for bank extraction (applied after shifting)
    pub fn bk_mask(&self) -> usize {
        (1 << self.bk_bits) - 1
    }

    /// Returns the number of bank selector values in this DRAM configuration.
    pub fn get_bank_count(&self) -> usize {
        1 << self.bk_bits
    }

    /// Largest row index a `usize` address can carry.
    pub fn max_row(&self) -> usize {
        usize::MAX >> self.row_shift
    }
}

#[cfg(test)]
mod tests {
    use super::{MemConfiguration, XorSource};

    #[test]
    fn test_default_layout() {
        let cfg = MemConfiguration::default();
        assert_eq!(cfg.col_mask(), 0x1FFF);
        assert_eq!(cfg.bk_mask(), 0x7);
        assert_eq!(cfg.get_bank_count(), 8);
        assert_eq!(cfg.xor_source, XorSource::AddressLowBits);
    }

    #[test]
    fn test_partial_json() {
        let cfg: MemConfiguration = serde_json::from_str(r#"{"xor_source": "row_low_bits"}"#)
            .expect("valid configuration");
        assert_eq!(cfg.xor_source, XorSource::RowLowBits);
        assert_eq!(cfg.row_shift, 16);
    }
}
