//! Byte-budgeted scene cache
//!
//! Maps a [`CacheKey`] to an optimized scene. Entries are deep copies: the
//! stored scene is cloned on `set` and again on every `get`, so no two
//! consumers ever share geometry. Eviction is strict LRU by touch order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use model_optimizer_core::{CacheKey, LodTraversal, MeshNode, Scene, SceneVisitor};

/// Size assumed for a texture whose dimensions are not known yet
pub const UNKNOWN_TEXTURE_BYTES: u64 = 4 * 1024 * 1024;

/// Approximate memory footprint of a scene
///
/// Vertex and index buffers of every mesh (all LOD levels) plus each
/// distinct texture once, as RGBA8.
pub fn estimate_scene_size(scene: &Scene) -> u64 {
    struct BufferBytes(u64);

    impl SceneVisitor for BufferBytes {
        fn visit_mesh(&mut self, mesh: &MeshNode) {
            self.0 += mesh.geometry.byte_length() as u64;
        }

        fn lod_traversal(&self) -> LodTraversal {
            LodTraversal::AllLevels
        }
    }

    let mut buffers = BufferBytes(0);
    scene.accept(&mut buffers);

    let textures: u64 = scene
        .referenced_textures()
        .into_iter()
        .filter_map(|handle| scene.texture(handle))
        .map(|texture| match texture.dimensions {
            Some((width, height)) => width as u64 * height as u64 * 4,
            None => UNKNOWN_TEXTURE_BYTES,
        })
        .sum();

    buffers.0 + textures
}

#[derive(Debug, Clone)]
struct CacheEntry {
    scene: Scene,
    size_bytes: u64,
    optimized: bool,
    touched: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: IndexMap<CacheKey, CacheEntry>,
    current_size: u64,
    /// Logical clock for touch order
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove_entry(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.shift_remove(key)?;
        debug_assert!(
            entry.size_bytes <= self.current_size,
            "cache size underflow: removing {} from {}",
            entry.size_bytes,
            self.current_size
        );
        self.current_size = self.current_size.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    /// Least recently touched entry; ties go to the smallest key
    fn lru_key(&self) -> Option<CacheKey> {
        self.entries
            .iter()
            .min_by(|(ka, a), (kb, b)| a.touched.cmp(&b.touched).then_with(|| ka.cmp(kb)))
            .map(|(key, _)| key.clone())
    }
}

/// Diagnostic snapshot of the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub current_size: u64,
    pub max_size: u64,
    /// `current_size / max_size`; can exceed 1.0 when one entry is larger than the budget
    pub utilization: f64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Recency-ordered, byte-budgeted store of optimized scenes
#[derive(Debug)]
pub struct CacheManager {
    max_bytes: u64,
    state: Mutex<CacheState>,
}

impl CacheManager {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Store a deep copy of `scene` under `key`, evicting LRU entries to fit
    ///
    /// An entry larger than the whole budget is still admitted, after every
    /// other entry has been evicted.
    pub async fn set(&self, key: CacheKey, scene: &Scene, optimized: bool) {
        let size_bytes = estimate_scene_size(scene);
        let scene = scene.clone();

        let mut state = self.state.lock().await;
        state.remove_entry(&key);

        while state.current_size + size_bytes > self.max_bytes {
            let Some(victim) = state.lru_key() else {
                break;
            };
            if let Some(evicted) = state.remove_entry(&victim) {
                state.evictions += 1;
                debug!("Evicted {} ({} bytes)", victim, evicted.size_bytes);
            }
        }
        if size_bytes > self.max_bytes {
            warn!(
                "Entry {} ({} bytes) exceeds the cache budget of {} bytes",
                key, size_bytes, self.max_bytes
            );
        }

        let touched = state.tick();
        state.current_size += size_bytes;
        state.entries.insert(
            key,
            CacheEntry {
                scene,
                size_bytes,
                optimized,
                touched,
            },
        );
    }

    /// Deep copy of the stored scene; refreshes its recency
    pub async fn get(&self, key: &CacheKey) -> Option<Scene> {
        let mut state = self.state.lock().await;
        let touched = state.tick();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.touched = touched;
                let scene = entry.scene.clone();
                state.hits += 1;
                Some(scene)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Existence check; does not touch recency
    pub async fn has(&self, key: &CacheKey) -> bool {
        self.state.lock().await.entries.contains_key(key)
    }

    /// Whether the entry was stored as an optimized scene
    pub async fn is_optimized(&self, key: &CacheKey) -> Option<bool> {
        self.state
            .lock()
            .await
            .entries
            .get(key)
            .map(|entry| entry.optimized)
    }

    pub async fn remove(&self, key: &CacheKey) -> bool {
        self.state.lock().await.remove_entry(key).is_some()
    }

    /// Keys in insertion order
    pub async fn keys(&self) -> Vec<CacheKey> {
        self.state.lock().await.entries.keys().cloned().collect()
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.current_size = 0;
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            entries: state.entries.len(),
            current_size: state.current_size,
            max_size: self.max_bytes,
            utilization: if self.max_bytes > 0 {
                state.current_size as f64 / self.max_bytes as f64
            } else {
                0.0
            },
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}
