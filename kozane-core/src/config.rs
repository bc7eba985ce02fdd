//! # Configuration
//!
//! Configuration for a single recoverable array.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Smallest supported sub-array shift (16 cells per sub-array).
pub const MIN_SUB_ARRAY_BITS: u32 = 4;
/// Largest supported sub-array shift (16M cells per sub-array).
pub const MAX_SUB_ARRAY_BITS: u32 = 24;

/// Configuration for a recoverable array
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayConfig {
    /// Directory holding the array file and its entry files
    pub directory: PathBuf,
    /// Sub-array size is `1 << sub_array_bits` cells
    pub sub_array_bits: u32,
    /// Records absorbed by one entry before it rolls
    pub max_entry_size: usize,
    /// Entry files in the pool; bounds both pending-write memory and
    /// recovery replay cost
    pub max_entries: usize,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./data"),
            sub_array_bits: 16,
            max_entry_size: 10_000,
            max_entries: 5,
        }
    }
}

impl ArrayConfig {
    /// Create a configuration rooted at `directory` with default tuning
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Default::default()
        }
    }

    /// Number of cells per sub-array
    pub fn sub_array_size(&self) -> u32 {
        1 << self.sub_array_bits
    }

    /// Mask selecting the offset of an index within its sub-array
    pub fn sub_array_mask(&self) -> u32 {
        self.sub_array_size() - 1
    }

    /// Smallest sub-array-aligned length covering `index`, clamped to
    /// `i32::MAX`
    pub fn aligned_length(&self, index: u32) -> u32 {
        let capacity = ((index as u64 >> self.sub_array_bits) + 1) << self.sub_array_bits;
        capacity.min(i32::MAX as u64) as u32
    }

    /// Validate parameter ranges
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SUB_ARRAY_BITS..=MAX_SUB_ARRAY_BITS).contains(&self.sub_array_bits) {
            return Err(Error::Configuration {
                message: format!(
                    "sub_array_bits must be in [{}, {}], got {}",
                    MIN_SUB_ARRAY_BITS, MAX_SUB_ARRAY_BITS, self.sub_array_bits
                ),
            });
        }
        if self.max_entry_size == 0 {
            return Err(Error::Configuration {
                message: "max_entry_size must be positive".to_string(),
            });
        }
        // One slot is always reserved for the open entry
        if self.max_entries < 2 {
            return Err(Error::Configuration {
                message: format!("max_entries must be at least 2, got {}", self.max_entries),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ArrayConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sub_array_size(), 65536);
        assert_eq!(config.sub_array_mask(), 65535);
    }

    #[test]
    fn test_aligned_length() {
        let mut config = ArrayConfig::default();
        config.sub_array_bits = 4;
        assert_eq!(config.aligned_length(0), 16);
        assert_eq!(config.aligned_length(15), 16);
        assert_eq!(config.aligned_length(16), 32);
        assert_eq!(config.aligned_length(100_000), 100_000 / 16 * 16 + 16);
        assert_eq!(config.aligned_length(u32::MAX), i32::MAX as u32);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let mut config = ArrayConfig::new("/tmp/kozane-test");
        config.sub_array_bits = 2;
        assert!(config.validate().is_err());

        config.sub_array_bits = 16;
        config.max_entry_size = 0;
        assert!(config.validate().is_err());

        config.max_entry_size = 100;
        config.max_entries = 1;
        assert!(config.validate().is_err());

        config.max_entries = 2;
        config.validate().unwrap();
    }
}
