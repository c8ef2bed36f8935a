//! Optimization settings and cache keys

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Quality/strength tier used by both compression and texture resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = crate::error::OptimizerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(crate::error::OptimizerError::validation(
                "tier",
                format!("expected low, medium or high, got '{}'", other),
            )),
        }
    }
}

/// Immutable optimization request parameters
///
/// A different settings value is a different cache entry for the same URL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationSettings {
    #[serde(rename = "enableLOD")]
    pub enable_lod: bool,
    pub compression_level: Tier,
    pub enable_frustum_culling: bool,
    pub texture_resolution: Tier,
    pub max_distance: f32,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            enable_lod: true,
            compression_level: Tier::Medium,
            enable_frustum_culling: true,
            texture_resolution: Tier::Medium,
            max_distance: 100.0,
        }
    }
}

impl OptimizationSettings {
    /// Settings for low-end devices: aggressive decimation, small textures
    pub fn low_end() -> Self {
        Self {
            enable_lod: true,
            compression_level: Tier::High,
            enable_frustum_culling: true,
            texture_resolution: Tier::Low,
            max_distance: 50.0,
        }
    }

    /// Settings for capable desktops
    pub fn high_end() -> Self {
        Self {
            enable_lod: true,
            compression_level: Tier::Low,
            enable_frustum_culling: true,
            texture_resolution: Tier::High,
            max_distance: 200.0,
        }
    }

    /// LOD switch distances: full detail at 0, then half and full `max_distance`
    pub fn lod_distances(&self) -> Vec<f32> {
        let strides = self.lod_strides();
        match strides.len() {
            2 => vec![0.0, self.max_distance],
            _ => vec![0.0, self.max_distance * 0.5, self.max_distance],
        }
    }

    /// Triangle strides per LOD level ("keep every Nth triangle")
    pub fn lod_strides(&self) -> &'static [usize] {
        match self.compression_level {
            Tier::Low => &[1, 2],
            Tier::Medium => &[1, 2, 4],
            Tier::High => &[1, 3, 6],
        }
    }

    /// Stable serialized form used in cache keys
    pub fn serialize_key(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn cache_key(&self, url: &str) -> Result<CacheKey> {
        CacheKey::new(url, self)
    }
}

/// Composite identity of a processed scene: source URL + serialized settings
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(url: &str, settings: &OptimizationSettings) -> Result<Self> {
        Ok(Self(format!("{}{}", url, settings.serialize_key()?)))
    }

    /// Key for scenes not tied to optimization settings
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}
