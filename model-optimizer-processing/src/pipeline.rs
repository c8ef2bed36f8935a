//! Optimization pipeline
//!
//! Runs the stages over a decoded scene in order: geometry per mesh,
//! frustum-culling hint, textures (each distinct texture once), then LOD.

use std::time::{Duration, Instant};

use model_optimizer_core::{
    MeshNode, NodeKind, OptimizationSettings, OptimizationStage, OptimizerError, Result, Scene,
};
use tracing::{debug, info};

use crate::geometry::GeometryOptimizer;
use crate::lod::LodBuilder;
use crate::texture::TextureOptimizer;

/// Summary of one pipeline run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizationReport {
    pub meshes: usize,
    pub vertices_before: usize,
    pub vertices_after: usize,
    pub normals_generated: usize,
    pub textures_optimized: usize,
    pub lod_levels: usize,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct SceneOptimizer {
    geometry: GeometryOptimizer,
    texture: TextureOptimizer,
}

impl SceneOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stages(geometry: GeometryOptimizer, texture: TextureOptimizer) -> Self {
        Self { geometry, texture }
    }

    /// Optimize `scene` in place for `settings`
    pub fn optimize(
        &self,
        scene: &mut Scene,
        settings: &OptimizationSettings,
    ) -> Result<OptimizationReport> {
        let start = Instant::now();
        let mut report = OptimizationReport::default();

        scene.try_for_each_mesh_mut(|mesh: &mut MeshNode| {
            let geometry = self.geometry.optimize(&mut mesh.geometry)?;
            report.meshes += 1;
            report.vertices_before += geometry.vertices_before;
            report.vertices_after += geometry.vertices_after;
            report.normals_generated += usize::from(geometry.normals_generated);
            mesh.frustum_culled = settings.enable_frustum_culling;
            Ok::<(), OptimizerError>(())
        })?;
        debug!(
            "Geometry pass: {} meshes, {} -> {} vertices",
            report.meshes, report.vertices_before, report.vertices_after
        );

        for handle in scene.referenced_textures() {
            let texture = scene.texture_mut(handle).ok_or_else(|| {
                OptimizerError::optimization(
                    OptimizationStage::Texture,
                    format!("material references missing texture {}", handle.index()),
                )
            })?;
            self.texture.optimize(texture, settings.texture_resolution)?;
            report.textures_optimized += 1;
        }

        let already_lod = matches!(scene.root.kind, NodeKind::Lod(_));
        if settings.enable_lod && !already_lod {
            let distances = settings.lod_distances();
            LodBuilder::with_strides(settings.lod_strides()).apply(scene, &distances)?;
            report.lod_levels = distances.len();
        }

        report.duration = start.elapsed();
        info!(
            "Optimized scene: {} meshes, {} textures, {} LOD levels in {:?}",
            report.meshes, report.textures_optimized, report.lod_levels, report.duration
        );
        Ok(report)
    }
}

/// Optimize with the default stage configuration
pub fn optimize_scene(
    scene: &mut Scene,
    settings: &OptimizationSettings,
) -> Result<OptimizationReport> {
    SceneOptimizer::new().optimize(scene, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_optimizer_core::{Geometry, Material, Node, Texture, Tier, WrapMode};

    fn textured_scene() -> Scene {
        let mut scene = Scene::new(Node::group(Vec::new()));
        let texture = scene.add_texture(Texture::with_dimensions(512, 512));
        let material = scene.add_material(Material {
            base_color_map: Some(texture),
            ..Material::default()
        });
        let quad = Geometry::new(vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ]);
        scene.root.children = vec![
            Node::mesh(quad.clone(), Some(material)),
            Node::mesh(quad, Some(material)),
        ];
        scene
    }

    #[test]
    fn test_full_pipeline() {
        let mut scene = textured_scene();
        let report = optimize_scene(&mut scene, &OptimizationSettings::default()).unwrap();

        assert_eq!(report.meshes, 2);
        assert_eq!(report.vertices_before, 12);
        assert_eq!(report.vertices_after, 8);
        assert_eq!(report.normals_generated, 2);
        assert_eq!(report.textures_optimized, 1);
        assert_eq!(report.lod_levels, 3);
        assert!(matches!(scene.root.kind, NodeKind::Lod(_)));
        assert_eq!(scene.textures()[0].sampler.wrap_s, WrapMode::Repeat);
    }

    #[test]
    fn test_every_mesh_has_normals_and_bounds() {
        let mut scene = textured_scene();
        optimize_scene(&mut scene, &OptimizationSettings::default()).unwrap();

        scene
            .try_for_each_mesh_mut(|mesh: &mut MeshNode| {
                assert!(mesh.geometry.normals.is_some());
                assert!(mesh.geometry.bounding_box.is_some());
                assert!(mesh.geometry.bounding_sphere.is_some());
                assert!(mesh.frustum_culled);
                Ok::<(), OptimizerError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_lod_disabled() {
        let mut scene = textured_scene();
        let settings = OptimizationSettings {
            enable_lod: false,
            enable_frustum_culling: false,
            texture_resolution: Tier::Low,
            ..OptimizationSettings::default()
        };
        let report = optimize_scene(&mut scene, &settings).unwrap();

        assert_eq!(report.lod_levels, 0);
        assert!(matches!(scene.root.kind, NodeKind::Group));
        assert!(!scene.root.children[0].as_mesh().unwrap().frustum_culled);
        assert!(!scene.textures()[0].sampler.generate_mipmaps);
    }

    #[test]
    fn test_geometry_failure_is_wrapped() {
        let mut scene = Scene::new(Node::mesh(
            Geometry::new(vec![[0.0; 3]; 3]).with_indices(vec![0, 1, 3]),
            None,
        ));
        let err = optimize_scene(&mut scene, &OptimizationSettings::default()).unwrap_err();
        assert!(err.to_string().starts_with("Optimization failed: geometry"));
    }
}
