//! Model Optimizer Core
//!
//! Shared data model for the model optimization pipeline: the scene tree
//! with its material and texture arenas, optimization settings and cache
//! keys, pipeline configuration, the error taxonomy and the collaborator
//! traits the async loader is built from.
//!
//! # Examples
//!
//! ```rust
//! use model_optimizer_core::{Geometry, Node, OptimizationSettings, Scene};
//!
//! let triangle = Geometry::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
//! let scene = Scene::new(Node::group(vec![Node::mesh(triangle, None)]));
//! assert_eq!(scene.root.mesh_count(), 1);
//!
//! let key = OptimizationSettings::default().cache_key("chair.glb")?;
//! assert!(key.as_str().starts_with("chair.glb"));
//! # Ok::<(), model_optimizer_core::OptimizerError>(())
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod scene;
pub mod settings;
pub mod traits;

pub use config::PipelineConfig;
pub use error::{ErrorRecovery, OptimizationStage, OptimizerError, Result, RetryConfig};
pub use metrics::{LoadCounters, LoadStatistics, RingBuffer};
pub use scene::{
    Aabb, BoundingSphere, Camera, FilterMode, Geometry, Light, LightKind, LodLevel, LodNode,
    LodTraversal, Mat4, Material, MaterialHandle, MeshNode, MinFilter, Node, NodeKind, Sampler,
    Scene, SceneVisitor, Texture, TextureHandle, Vec2, Vec3, WrapMode,
};
pub use settings::{CacheKey, OptimizationSettings, Tier};
pub use traits::{AssetFetcher, LoadProgress, LoadStage, MeshDecoder, RawMeshData, SceneDecoder};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
