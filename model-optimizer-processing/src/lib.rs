//! Model Optimizer Processing
//!
//! Synchronous CPU stages of the optimization pipeline.
//!
//! # Architecture
//!
//! - `geometry` - vertex welding, normal generation, bounds, attribute stripping
//! - `texture` - sampling state per resolution tier, optional downsampling
//! - `lod` - stride-decimated level-of-detail copies
//! - `inspector` - scene statistics and complexity classification
//! - `pipeline` - runs the stages in order over a decoded scene
//!
//! # Examples
//!
//! ```rust
//! use model_optimizer_core::{Geometry, Node, OptimizationSettings, Scene};
//! use model_optimizer_processing::{optimize_scene, SceneInspector};
//!
//! let triangle = Geometry::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
//! let mut scene = Scene::new(Node::group(vec![Node::mesh(triangle, None)]));
//!
//! optimize_scene(&mut scene, &OptimizationSettings::default())?;
//! let stats = SceneInspector::new().inspect(&scene);
//! assert_eq!(stats.triangles, 1);
//! # Ok::<(), model_optimizer_core::OptimizerError>(())
//! ```

pub mod geometry;
pub mod inspector;
pub mod lod;
pub mod pipeline;
pub mod texture;

pub use geometry::{GeometryConfig, GeometryOptimizer, GeometryReport};
pub use inspector::{Complexity, SceneInspector, SceneStats};
pub use lod::{LodBuilder, MIN_DECIMATION_TRIANGLES};
pub use pipeline::{OptimizationReport, SceneOptimizer, optimize_scene};
pub use texture::{TextureOptimizer, max_dimension};
