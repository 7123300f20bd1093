// EngineConfig - knobs that change how kernels run, never what they compute
//
// Loaded from JSON (serde) or built in code with the `with_*` setters. All
// fields have defaults, so `{}` is a valid config.

use serde::{Deserialize, Serialize};
use vole_core::{Error, Result};

/// Runtime configuration of an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Tile edge of the cache-blocked matmul loop (default: 48).
    pub matmul_block_size: usize,
    /// Split matmul and conv2d work across the batch on the rayon pool.
    pub parallel: bool,
    /// Fail any operator whose float output contains NaN.
    pub check_numerics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matmul_block_size: 48,
            parallel: false,
            check_numerics: false,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.matmul_block_size == 0 {
            return Err(Error::Config("matmul_block_size must be positive".into()));
        }
        Ok(())
    }

    /// Set the matmul tile size.
    pub fn with_matmul_block_size(mut self, size: usize) -> Self {
        self.matmul_block_size = size;
        self
    }

    /// Enable or disable batch parallelism.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_check_numerics(mut self, check: bool) -> Self {
        self.check_numerics = check;
        self
    }
}
