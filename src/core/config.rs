//! Format-time configuration
//!
//! Options are read from TOML; every field has a default so an empty file
//! (or no file at all) yields a usable configuration.
//!
//! ```toml
//! signature = "novak"
//! cluster_size = 4096
//! ```

use crate::core::descriptor::{DEFAULT_CLUSTER_SIZE, DEFAULT_SIGNATURE, SIGNATURE_LEN};
use crate::core::error::{FsError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest cluster size accepted at format time
pub const MIN_CLUSTER_SIZE: u32 = 512;

/// Largest cluster size accepted at format time
pub const MAX_CLUSTER_SIZE: u32 = 64 * 1024;

/// Options applied when a new image is formatted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatOptions {
    /// Author signature stored in the descriptor (1-8 ASCII bytes)
    pub signature: String,

    /// Cluster size in bytes (power of two)
    pub cluster_size: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            signature: DEFAULT_SIGNATURE.to_string(),
            cluster_size: DEFAULT_CLUSTER_SIZE,
        }
    }
}

impl FormatOptions {
    /// Parse options from a TOML document and validate them
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let options: FormatOptions = toml::from_str(source)?;
        options.validate()?;
        Ok(options)
    }

    /// Read options from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Validate all fields
    pub fn validate(&self) -> Result<()> {
        if self.signature.is_empty() || self.signature.len() >= SIGNATURE_LEN {
            return Err(FsError::InvalidConfig(format!(
                "signature must be 1-{} bytes, got {}",
                SIGNATURE_LEN - 1,
                self.signature.len()
            )));
        }

        if !self.signature.is_ascii() || self.signature.contains('\0') {
            return Err(FsError::InvalidConfig(
                "signature must be printable ASCII".to_string(),
            ));
        }

        if !self.cluster_size.is_power_of_two()
            || !(MIN_CLUSTER_SIZE..=MAX_CLUSTER_SIZE).contains(&self.cluster_size)
        {
            return Err(FsError::InvalidConfig(format!(
                "cluster size must be a power of two between {} and {}, got {}",
                MIN_CLUSTER_SIZE, MAX_CLUSTER_SIZE, self.cluster_size
            )));
        }

        Ok(())
    }
}
