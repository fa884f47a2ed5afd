//! Run configuration loaded from JSON.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::memory::{ClockKind, MemConfiguration, Thresholds, XorSource};
use crate::util::{
    AGGRESSOR_PATTERN, BUCKET_LAT_STEP, HAMMERS_PER_ITER, NUM_BANKS, NUM_LAT_BUCKETS, ROW_SIZE,
    SAMPLES, SELECT_ATTEMPTS, VICTIM_PATTERN,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading a [`HammerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not a valid configuration
    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    /// The configuration is inconsistent
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Every tunable of a classification, calibration or hammering run.
///
/// Missing fields take their default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HammerConfig {
    /// DRAM row size in bytes
    pub row_size: usize,
    /// Number of banks the classifier distributes rows over
    pub num_banks: usize,
    /// Row buffer hit and conflict latency thresholds
    pub thresholds: Thresholds,
    /// Timing samples averaged per address pair
    pub samples: usize,
    /// Aggressor activations per hammering round
    pub hammer_iterations: u64,
    /// Byte the victim row is filled with
    pub victim_pattern: u8,
    /// Byte the aggressor rows are filled with
    pub aggressor_pattern: u8,
    /// Translation attempts per victim before it is skipped
    pub select_attempts: usize,
    /// Row distances between victim and aggressors, one sweep each
    pub row_offsets: Vec<usize>,
    /// Additional hammering rounds after a flip was found
    pub reproductions: usize,
    /// Latency histogram bucket width
    pub bucket_width: u64,
    /// Number of latency histogram buckets before the overflow bucket
    pub num_buckets: usize,
    /// Timestamp source
    pub clock: ClockKind,
    /// Physical address layout
    pub geometry: MemConfiguration,
}

impl Default for HammerConfig {
    fn default() -> Self {
        HammerConfig {
            row_size: ROW_SIZE,
            num_banks: NUM_BANKS,
            thresholds: Thresholds::default(),
            samples: SAMPLES,
            hammer_iterations: HAMMERS_PER_ITER,
            victim_pattern: VICTIM_PATTERN,
            aggressor_pattern: AGGRESSOR_PATTERN,
            select_attempts: SELECT_ATTEMPTS,
            row_offsets: vec![1, 2],
            reproductions: 2,
            bucket_width: BUCKET_LAT_STEP,
            num_buckets: NUM_LAT_BUCKETS,
            clock: ClockKind::default(),
            geometry: MemConfiguration::default(),
        }
    }
}

impl HammerConfig {
    /// Reads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, is not valid JSON or is inconsistent.
    pub fn from_jsonfile<P: AsRef<Path>>(filepath: P) -> Result<HammerConfig, ConfigError> {
        let mut file = File::open(filepath.as_ref())?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let config: HammerConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants between fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_geometry()?;
        if !self.row_size.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "row_size {} is not a power of two",
                self.row_size
            )));
        }
        if self.row_size != 1 << self.geometry.col_bits {
            return Err(ConfigError::Invalid(format!(
                "row_size {} does not match {} column bits",
                self.row_size, self.geometry.col_bits
            )));
        }
        if self.num_banks == 0 {
            return Err(ConfigError::Invalid("num_banks must not be 0".into()));
        }
        if self.thresholds.hit > self.thresholds.conflict {
            return Err(ConfigError::Invalid(format!(
                "hit threshold {} above conflict threshold {}",
                self.thresholds.hit, self.thresholds.conflict
            )));
        }
        if self.row_offsets.contains(&0) {
            return Err(ConfigError::Invalid("row offset 0 hammers the victim".into()));
        }
        if self.bucket_width == 0 {
            return Err(ConfigError::Invalid("bucket_width must not be 0".into()));
        }
        Ok(())
    }

    /// Column, bank and row fields must be disjoint and in ascending order, so that
    /// recomposing a decomposed address yields the address again.
    fn validate_geometry(&self) -> Result<(), ConfigError> {
        let g = &self.geometry;
        let bits = usize::BITS as usize;
        if g.col_bits >= bits || g.row_shift >= bits {
            return Err(ConfigError::Invalid(format!(
                "col_bits {} and row_shift {} must be below {}",
                g.col_bits, g.row_shift, bits
            )));
        }
        if g.bk_shift < g.col_bits {
            return Err(ConfigError::Invalid(format!(
                "bank field at bit {} overlaps {} column bits",
                g.bk_shift, g.col_bits
            )));
        }
        if g.row_shift < g.bk_shift + g.bk_bits {
            return Err(ConfigError::Invalid(format!(
                "row field at bit {} overlaps bank bits {}..{}",
                g.row_shift,
                g.bk_shift,
                g.bk_shift + g.bk_bits
            )));
        }
        if g.xor_source == XorSource::AddressLowBits && g.bk_bits > g.col_bits {
            return Err(ConfigError::Invalid(format!(
                "{} bank bits cannot be XORed with {} column bits",
                g.bk_bits, g.col_bits
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, HammerConfig};
    use crate::memory::{DRAMAddr, DramGeometry, XorSource};

    #[test]
    fn test_empty_document_is_default() {
        let config: HammerConfig = serde_json::from_str("{}").expect("valid config");
        assert_eq!(config, HammerConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document() -> anyhow::Result<()> {
        let config: HammerConfig = serde_json::from_str(
            r#"{
                "thresholds": {"hit": 100, "conflict": 200},
                "row_offsets": [1],
                "geometry": {"xor_source": "row_low_bits"}
            }"#,
        )?;
        config.validate()?;
        assert_eq!(config.thresholds.conflict, 200);
        assert_eq!(config.row_offsets, vec![1]);
        assert_eq!(config.geometry.xor_source, XorSource::RowLowBits);
        assert_eq!(config.samples, 10);
        Ok(())
    }

    #[test]
    fn test_invalid_thresholds() {
        let config: HammerConfig =
            serde_json::from_str(r#"{"thresholds": {"hit": 500, "conflict": 200}}"#)
                .expect("valid json");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            HammerConfig::from_jsonfile("/nonexistent/bankhammer.json"),
            Err(ConfigError::Io(_))
        ));
    }

    fn invalid(json: &str) -> bool {
        let config: HammerConfig = serde_json::from_str(json).expect("valid json");
        matches!(config.validate(), Err(ConfigError::Invalid(_)))
    }

    #[test]
    fn test_overlapping_geometry_rejected() {
        // bank field reaches into the column
        assert!(invalid(r#"{"geometry": {"bk_shift": 12}}"#));
        // row field reaches into the bank field
        assert!(invalid(r#"{"geometry": {"row_shift": 15}}"#));
        // more bank bits than column bits to XOR with
        assert!(invalid(
            r#"{"row_size": 4, "geometry": {"col_bits": 2, "bk_shift": 2, "row_shift": 5}}"#
        ));
    }

    #[test]
    fn test_oversized_shifts_rejected() {
        assert!(invalid(r#"{"geometry": {"row_shift": 64}}"#));
        assert!(invalid(r#"{"geometry": {"col_bits": 64, "bk_shift": 64, "row_shift": 67}}"#));
    }

    #[test]
    fn test_row_low_bits_allow_narrow_columns() -> anyhow::Result<()> {
        let config: HammerConfig = serde_json::from_str(
            r#"{"row_size": 4, "geometry": {"col_bits": 2, "bk_shift": 2, "row_shift": 5, "xor_source": "row_low_bits"}}"#,
        )?;
        config.validate()?;
        Ok(())
    }

    #[test]
    fn test_validated_geometry_roundtrips() -> anyhow::Result<()> {
        let config: HammerConfig = serde_json::from_str(
            r#"{"row_size": 4096, "geometry": {"col_bits": 12, "bk_shift": 14, "bk_bits": 3, "row_shift": 18}}"#,
        )?;
        config.validate()?;
        let g = &config.geometry;
        for bank in 0..g.get_bank_count() {
            let dram = DRAMAddr::new(bank, 3, 0xFFF);
            assert_eq!(g.decompose(g.recompose(&dram)), dram);
        }
        Ok(())
    }
}
