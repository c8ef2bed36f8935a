//! Scene inspection
//!
//! Aggregate statistics for display: triangles, vertices, distinct
//! materials and textures, and a coarse complexity class. LOD nodes
//! contribute only their full-detail level.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use model_optimizer_core::{
    LodTraversal, MaterialHandle, MeshNode, Scene, SceneVisitor, TextureHandle,
};

/// Triangle count above which a scene is `High`
pub const HIGH_TRIANGLES: usize = 100_000;
/// Distinct texture count above which a scene is `High`
pub const HIGH_TEXTURES: usize = 10;
/// Triangle count above which a scene is `Medium`
pub const MEDIUM_TRIANGLES: usize = 10_000;
/// Distinct texture count above which a scene is `Medium`
pub const MEDIUM_TEXTURES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn classify(triangles: usize, textures: usize) -> Self {
        if triangles > HIGH_TRIANGLES || textures > HIGH_TEXTURES {
            Self::High
        } else if triangles > MEDIUM_TRIANGLES || textures > MEDIUM_TEXTURES {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneStats {
    pub meshes: usize,
    pub triangles: usize,
    pub vertices: usize,
    pub materials: usize,
    pub textures: usize,
    pub complexity: Complexity,
}

struct StatsCollector<'a> {
    scene: &'a Scene,
    meshes: usize,
    triangles: usize,
    vertices: usize,
    materials: HashSet<MaterialHandle>,
    textures: HashSet<TextureHandle>,
}

impl SceneVisitor for StatsCollector<'_> {
    fn visit_mesh(&mut self, mesh: &MeshNode) {
        self.meshes += 1;
        self.triangles += mesh.geometry.triangle_count();
        self.vertices += mesh.geometry.vertex_count();

        if let Some(handle) = mesh.material {
            self.materials.insert(handle);
            if let Some(material) = self.scene.material(handle) {
                self.textures.extend(material.texture_handles());
            }
        }
    }

    fn lod_traversal(&self) -> LodTraversal {
        LodTraversal::NearestLevel
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SceneInspector;

impl SceneInspector {
    pub fn new() -> Self {
        Self
    }

    pub fn inspect(&self, scene: &Scene) -> SceneStats {
        let mut collector = StatsCollector {
            scene,
            meshes: 0,
            triangles: 0,
            vertices: 0,
            materials: HashSet::new(),
            textures: HashSet::new(),
        };
        scene.accept(&mut collector);

        SceneStats {
            meshes: collector.meshes,
            triangles: collector.triangles,
            vertices: collector.vertices,
            materials: collector.materials.len(),
            textures: collector.textures.len(),
            complexity: Complexity::classify(collector.triangles, collector.textures.len()),
        }
    }
}
