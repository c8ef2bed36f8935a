//! Level-of-detail construction
//!
//! Builds one copy of the scene tree per distance threshold. Level 0 keeps
//! full detail; every further level keeps every Nth triangle of each mesh,
//! N growing with the level. Stride decimation can leave disconnected
//! fragments on irregular meshes, so small meshes are left alone.

use model_optimizer_core::{
    Geometry, LodLevel, LodNode, MeshNode, Node, NodeKind, OptimizationStage, OptimizerError,
    Result, Scene,
};
use tracing::debug;

/// Meshes with fewer triangles than this are never decimated
pub const MIN_DECIMATION_TRIANGLES: usize = 500;

/// Default strides for three levels
pub const DEFAULT_STRIDES: [usize; 3] = [1, 2, 4];

#[derive(Debug, Clone)]
pub struct LodBuilder {
    strides: Vec<usize>,
    min_triangles: usize,
}

impl Default for LodBuilder {
    fn default() -> Self {
        Self {
            strides: DEFAULT_STRIDES.to_vec(),
            min_triangles: MIN_DECIMATION_TRIANGLES,
        }
    }
}

impl LodBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strides(strides: &[usize]) -> Self {
        Self {
            strides: strides.to_vec(),
            ..Self::default()
        }
    }

    pub fn min_triangles(mut self, min_triangles: usize) -> Self {
        self.min_triangles = min_triangles;
        self
    }

    /// Stride for a level; levels past the configured list keep doubling
    pub fn stride_for_level(&self, level: usize) -> usize {
        match self.strides.get(level) {
            Some(&stride) => stride,
            None => {
                let last = self.strides.last().copied().unwrap_or(1).max(1);
                let extra = (level + 1 - self.strides.len()) as u32;
                last.saturating_mul(2usize.saturating_pow(extra))
            }
        }
    }

    /// Build the distance-switched structure for `scene`'s root
    pub fn build(&self, scene: &Scene, distances: &[f32]) -> Result<LodNode> {
        self.build_from_node(&scene.root, distances)
    }

    pub fn build_from_node(&self, root: &Node, distances: &[f32]) -> Result<LodNode> {
        validate_distances(distances)?;
        if self.strides.iter().any(|&s| s == 0) {
            return Err(OptimizerError::optimization(
                OptimizationStage::Lod,
                "LOD stride must be at least 1",
            ));
        }

        let mut levels = Vec::with_capacity(distances.len());
        for (level, &distance) in distances.iter().enumerate() {
            let stride = self.stride_for_level(level);
            let mut node = root.clone();
            if stride > 1 {
                node.try_for_each_mesh_mut(&mut |mesh: &mut MeshNode| {
                    let triangles = mesh.geometry.triangle_count();
                    if triangles >= self.min_triangles {
                        decimate(&mut mesh.geometry, stride);
                    }
                    Ok::<(), OptimizerError>(())
                })?;
            }
            debug!("LOD level {} at distance {} (stride {})", level, distance, stride);
            levels.push(LodLevel { distance, node });
        }

        Ok(LodNode { levels })
    }

    /// Replace the scene root with an LOD node built from it
    pub fn apply(&self, scene: &mut Scene, distances: &[f32]) -> Result<()> {
        let lod = self.build(scene, distances)?;
        scene.root = Node::new(NodeKind::Lod(lod)).named("LOD");
        Ok(())
    }
}

fn validate_distances(distances: &[f32]) -> Result<()> {
    if distances.is_empty() {
        return Err(OptimizerError::optimization(
            OptimizationStage::Lod,
            "at least one LOD distance is required",
        ));
    }
    if distances.iter().any(|d| !d.is_finite() || *d < 0.0) {
        return Err(OptimizerError::optimization(
            OptimizationStage::Lod,
            format!("LOD distances must be finite and non-negative: {:?}", distances),
        ));
    }
    if distances.windows(2).any(|pair| pair[1] < pair[0]) {
        return Err(OptimizerError::optimization(
            OptimizationStage::Lod,
            format!("LOD distances must be ascending: {:?}", distances),
        ));
    }
    Ok(())
}

/// Keep every `stride`th triangle; non-indexed geometry gets an index
pub fn decimate(geometry: &mut Geometry, stride: usize) {
    let stride = stride.max(1);
    let source: Vec<u32> = match geometry.indices.take() {
        Some(indices) => indices,
        None => (0..geometry.vertex_count() as u32).collect(),
    };
    let kept = source
        .chunks_exact(3)
        .enumerate()
        .filter(|(triangle, _)| triangle % stride == 0)
        .flat_map(|(_, face)| face.iter().copied())
        .collect();
    geometry.indices = Some(kept);
}
