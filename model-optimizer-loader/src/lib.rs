//! Model Optimizer Loader
//!
//! Async side of the optimization pipeline.
//!
//! # Features
//!
//! - **Scene cache**: byte-budgeted LRU store handing out deep copies
//! - **De-duplicated loads**: concurrent requests for one key share a single load
//! - **glTF decoding**: `.gltf`/`.glb` into the scene model, pluggable mesh decompression
//! - **Orchestration**: per-view state machine with coalesced re-optimization
//! - **Monitoring**: rolling load, render and memory statistics
//!
//! # Examples
//!
//! ```rust,no_run
//! use model_optimizer_core::{OptimizationSettings, PipelineConfig};
//! use model_optimizer_loader::ModelLoader;
//!
//! # async fn example() -> model_optimizer_core::Result<()> {
//! let loader = ModelLoader::from_config(PipelineConfig::default());
//! let scene = loader
//!     .load("assets/chair.glb", &OptimizationSettings::default(), false)
//!     .await?;
//! println!("{} meshes", scene.root.mesh_count());
//!
//! let stats = loader.cache().stats().await;
//! println!("cache: {} entries, {} bytes", stats.entries, stats.current_size);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod fetch;
pub mod gltf_decoder;
pub mod hook;
pub mod loader;
pub mod monitor;

pub use cache::{CacheManager, CacheStats, UNKNOWN_TEXTURE_BYTES, estimate_scene_size};
pub use fetch::FileFetcher;
pub use gltf_decoder::GltfDecoder;
pub use hook::{HookState, OptimizationHook, OptimizedModel};
pub use loader::{ModelLoader, ProgressCallback};
pub use monitor::{PerformanceMetrics, PerformanceMonitor};
