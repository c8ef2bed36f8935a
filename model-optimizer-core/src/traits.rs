//! Collaborator traits
//!
//! The loader is assembled from a fetcher (transport), a scene decoder
//! (file format) and optionally a mesh decoder (compressed geometry).

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::scene::{Scene, Vec2, Vec3};

/// Load stage reported through progress callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Fetching,
    Decoding,
    Optimizing,
    Caching,
    Done,
}

/// Load progress information
#[derive(Debug, Clone, PartialEq)]
pub struct LoadProgress {
    pub stage: LoadStage,
    /// Bytes fetched so far
    pub bytes_loaded: u64,
}

impl LoadProgress {
    pub fn new(stage: LoadStage, bytes_loaded: u64) -> Self {
        Self {
            stage,
            bytes_loaded,
        }
    }

    /// Completion ratio (0.0 - 1.0) by stage
    pub fn completion_ratio(&self) -> f32 {
        match self.stage {
            LoadStage::Fetching => 0.0,
            LoadStage::Decoding => 0.25,
            LoadStage::Optimizing => 0.5,
            LoadStage::Caching => 0.9,
            LoadStage::Done => 1.0,
        }
    }
}

/// Retrieves raw asset bytes for a URL
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// Decodes raw asset bytes into a scene; CPU bound, called off the async runtime
pub trait SceneDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], url: &str) -> Result<Scene>;
}

/// Geometry produced by a mesh-compression decoder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMeshData {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub uvs: Option<Vec<Vec2>>,
    pub indices: Option<Vec<u32>>,
}

/// Decoder for compressed mesh payloads
pub trait MeshDecoder: Send + Sync {
    fn decode(&self, compressed: &[u8]) -> Result<RawMeshData>;
}
