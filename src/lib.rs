//! Model Optimizer
//!
//! Loads 3D models, optimizes them for real-time rendering and keeps the
//! results in a byte-budgeted LRU cache.
//!
//! - [`core`]: scene model, settings, configuration and errors
//! - [`processing`]: geometry, texture and LOD stages plus the inspector
//! - [`loader`]: async loader with in-flight de-duplication, the scene
//!   cache, the performance monitor and the orchestration hook
//!
//! # Examples
//!
//! ```rust,no_run
//! use model_optimizer::prelude::*;
//!
//! # async fn demo() -> Result<()> {
//! let loader = ModelLoader::from_config(PipelineConfig::default());
//! let scene = loader
//!     .load("assets/chair.glb", &OptimizationSettings::low_end(), false)
//!     .await?;
//!
//! let stats = SceneInspector::new().inspect(&scene);
//! println!("{} triangles, {} complexity", stats.triangles, stats.complexity);
//! # Ok(())
//! # }
//! ```

pub use model_optimizer_core as core;
pub use model_optimizer_loader as loader;
pub use model_optimizer_processing as processing;

pub use model_optimizer_core::{OptimizerError, Result, VERSION};

/// Commonly used types
pub mod prelude {
    pub use model_optimizer_core::{
        CacheKey, LoadProgress, LoadStage, Node, NodeKind, OptimizationSettings, OptimizerError,
        PipelineConfig, Result, Scene, Tier,
    };
    pub use model_optimizer_loader::{
        CacheManager, HookState, ModelLoader, OptimizationHook, OptimizedModel,
        PerformanceMonitor,
    };
    pub use model_optimizer_processing::{Complexity, SceneInspector, SceneStats, optimize_scene};
}
