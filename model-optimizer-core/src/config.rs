//! Pipeline configuration
//!
//! Loaded from YAML; every field has a default so partial files work.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{OptimizerError, Result};

/// Default cache budget: 100 MiB
pub const DEFAULT_CACHE_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// Default performance monitor window
pub const DEFAULT_METRICS_WINDOW: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Byte budget of the scene cache
    pub cache_max_bytes: u64,
    /// Concurrency bound for batch preloading
    pub max_concurrent_loads: usize,
    /// Location of mesh-compression decoder assets
    pub decoder_path: Option<PathBuf>,
    /// Samples kept per performance monitor series
    pub metrics_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
            max_concurrent_loads: num_cpus::get().clamp(1, 4),
            decoder_path: None,
            metrics_window: DEFAULT_METRICS_WINDOW,
        }
    }
}

impl PipelineConfig {
    /// Small budget for memory constrained hosts
    pub fn for_low_memory() -> Self {
        Self {
            cache_max_bytes: 32 * 1024 * 1024,
            max_concurrent_loads: 1,
            ..Self::default()
        }
    }

    pub fn for_desktop() -> Self {
        Self {
            cache_max_bytes: 512 * 1024 * 1024,
            max_concurrent_loads: num_cpus::get().clamp(1, 8),
            ..Self::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            OptimizerError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_max_bytes == 0 {
            return Err(OptimizerError::validation(
                "cache_max_bytes",
                "must be greater than zero",
            ));
        }
        if self.max_concurrent_loads == 0 {
            return Err(OptimizerError::validation(
                "max_concurrent_loads",
                "must be greater than zero",
            ));
        }
        if self.metrics_window == 0 {
            return Err(OptimizerError::validation(
                "metrics_window",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
