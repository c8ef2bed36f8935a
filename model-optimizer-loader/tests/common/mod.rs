//! Shared fixtures: counting fetcher and decoder over an in-memory asset store

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use model_optimizer_core::{
    AssetFetcher, Geometry, Material, Node, OptimizerError, PipelineConfig, Result, Scene,
    SceneDecoder, Texture,
};
use model_optimizer_loader::ModelLoader;

/// Serves registered byte payloads, counting every fetch
#[derive(Debug, Default)]
pub struct CountingFetcher {
    assets: HashMap<String, Bytes>,
    delay: Option<Duration>,
    panic_on: Option<String>,
    pub fetches: AtomicUsize,
}

impl CountingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, url: &str, triangles: u32) -> Self {
        self.assets
            .insert(url.to_string(), Bytes::from(triangles.to_le_bytes().to_vec()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Panic instead of answering for `url`
    pub fn with_panic_on(mut self, url: &str) -> Self {
        self.panic_on = Some(url.to_string());
        self
    }

    pub fn count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetFetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.panic_on.as_deref() == Some(url) {
            panic!("fetcher crashed on {}", url);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.assets
            .get(url)
            .cloned()
            .ok_or_else(|| OptimizerError::Io(format!("404 Not Found: {}", url)))
    }
}

/// Decodes a little-endian triangle count into [`fixture_scene`]
#[derive(Debug, Default)]
pub struct CountingDecoder {
    pub decodes: AtomicUsize,
}

impl CountingDecoder {
    pub fn count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl SceneDecoder for CountingDecoder {
    fn decode(&self, bytes: &[u8], url: &str) -> Result<Scene> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        let raw: [u8; 4] = bytes
            .try_into()
            .map_err(|_| OptimizerError::load(url, "fixture payload must be 4 bytes"))?;
        Ok(fixture_scene(u32::from_le_bytes(raw) as usize))
    }
}

/// Split-triangle soup with one textured material
///
/// Every triangle has its own three vertices, on a grid so nothing welds.
pub fn fixture_scene(triangles: usize) -> Scene {
    let mut positions = Vec::with_capacity(triangles * 3);
    for t in 0..triangles {
        let x = t as f32;
        positions.push([x, 0.0, 0.0]);
        positions.push([x + 0.5, 0.0, 0.0]);
        positions.push([x, 1.0, 0.0]);
    }

    let mut scene = Scene::new(Node::group(Vec::new()));
    let texture = scene.add_texture(Texture::with_dimensions(256, 256));
    let material = scene.add_material(Material {
        base_color_map: Some(texture),
        ..Material::default()
    });
    scene.root.children.push(Node::mesh(Geometry::new(positions), Some(material)));
    scene
}

pub struct Harness {
    pub loader: ModelLoader,
    pub fetcher: Arc<CountingFetcher>,
    pub decoder: Arc<CountingDecoder>,
}

pub fn harness(fetcher: CountingFetcher, config: PipelineConfig) -> Harness {
    let fetcher = Arc::new(fetcher);
    let decoder = Arc::new(CountingDecoder::default());
    let loader = ModelLoader::new(fetcher.clone(), decoder.clone(), config);
    Harness {
        loader,
        fetcher,
        decoder,
    }
}
