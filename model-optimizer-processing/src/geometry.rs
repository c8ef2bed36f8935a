//! Geometry optimization
//!
//! Normalizes a mesh's buffers in four steps: weld bit-identical vertices,
//! generate missing normals from face winding, recompute bounding volumes
//! and drop the secondary UV channel. Running it twice yields the same
//! buffers as running it once.

use std::collections::HashMap;

use model_optimizer_core::{
    Aabb, BoundingSphere, Geometry, OptimizationStage, OptimizerError, Result, Vec3,
};

/// Geometry optimizer configuration
#[derive(Debug, Clone)]
pub struct GeometryConfig {
    pub merge_vertices: bool,
    pub compute_normals: bool,
    pub strip_secondary_uvs: bool,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            merge_vertices: true,
            compute_normals: true,
            strip_secondary_uvs: true,
        }
    }
}

/// Vertex counts before and after one optimization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryReport {
    pub vertices_before: usize,
    pub vertices_after: usize,
    pub normals_generated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GeometryOptimizer {
    config: GeometryConfig,
}

impl GeometryOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GeometryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    /// Optimize `geometry` in place
    pub fn optimize(&self, geometry: &mut Geometry) -> Result<GeometryReport> {
        validate(geometry)?;

        let mut report = GeometryReport {
            vertices_before: geometry.vertex_count(),
            ..GeometryReport::default()
        };

        if self.config.merge_vertices && !geometry.positions.is_empty() {
            merge_vertices(geometry);
        }

        if self.config.compute_normals && geometry.normals.is_none() {
            geometry.normals = Some(compute_vertex_normals(geometry));
            report.normals_generated = true;
        }

        compute_bounds(geometry);

        if self.config.strip_secondary_uvs {
            geometry.uvs2 = None;
        }

        report.vertices_after = geometry.vertex_count();
        Ok(report)
    }
}

fn validate(geometry: &Geometry) -> Result<()> {
    let vertex_count = geometry.vertex_count();
    let attribute_lengths = [
        ("normal", geometry.normals.as_ref().map(Vec::len)),
        ("uv", geometry.uvs.as_ref().map(Vec::len)),
        ("uv2", geometry.uvs2.as_ref().map(Vec::len)),
    ];
    for (name, len) in attribute_lengths {
        if let Some(len) = len {
            if len != vertex_count {
                return Err(OptimizerError::optimization(
                    OptimizationStage::Geometry,
                    format!(
                        "{} attribute has {} entries for {} vertices",
                        name, len, vertex_count
                    ),
                ));
            }
        }
    }

    if let Some(indices) = &geometry.indices {
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(OptimizerError::optimization(
                OptimizationStage::Geometry,
                format!("index {} out of range for {} vertices", bad, vertex_count),
            ));
        }
    }
    Ok(())
}

/// Bit pattern of every attribute of one vertex
type VertexKey = [u32; 10];

fn vertex_key(geometry: &Geometry, i: usize) -> VertexKey {
    let mut key = [0u32; 10];
    let p = geometry.positions[i];
    key[0..3].copy_from_slice(&[p[0].to_bits(), p[1].to_bits(), p[2].to_bits()]);
    if let Some(normals) = &geometry.normals {
        let n = normals[i];
        key[3..6].copy_from_slice(&[n[0].to_bits(), n[1].to_bits(), n[2].to_bits()]);
    }
    if let Some(uvs) = &geometry.uvs {
        key[6..8].copy_from_slice(&[uvs[i][0].to_bits(), uvs[i][1].to_bits()]);
    }
    if let Some(uvs2) = &geometry.uvs2 {
        key[8..10].copy_from_slice(&[uvs2[i][0].to_bits(), uvs2[i][1].to_bits()]);
    }
    key
}

/// Weld vertices identical across all attributes; always leaves the
/// geometry indexed, vertices ordered by first reference
fn merge_vertices(geometry: &mut Geometry) {
    let vertex_count = geometry.vertex_count();
    let source: Vec<u32> = match &geometry.indices {
        Some(indices) => indices.clone(),
        None => (0..vertex_count as u32).collect(),
    };

    let mut unique: HashMap<VertexKey, u32> = HashMap::with_capacity(vertex_count);
    let mut remap = vec![u32::MAX; vertex_count];
    let mut order: Vec<usize> = Vec::with_capacity(vertex_count);
    let mut indices = Vec::with_capacity(source.len());

    for &index in &source {
        let i = index as usize;
        if remap[i] == u32::MAX {
            let next = order.len() as u32;
            let id = *unique.entry(vertex_key(geometry, i)).or_insert_with(|| {
                order.push(i);
                next
            });
            remap[i] = id;
        }
        indices.push(remap[i]);
    }

    geometry.positions = order.iter().map(|&i| geometry.positions[i]).collect();
    if let Some(normals) = &geometry.normals {
        geometry.normals = Some(order.iter().map(|&i| normals[i]).collect());
    }
    if let Some(uvs) = &geometry.uvs {
        geometry.uvs = Some(order.iter().map(|&i| uvs[i]).collect());
    }
    if let Some(uvs2) = &geometry.uvs2 {
        geometry.uvs2 = Some(order.iter().map(|&i| uvs2[i]).collect());
    }
    geometry.indices = Some(indices);
}

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn length(v: Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Area-weighted vertex normals from counter-clockwise face winding
pub fn compute_vertex_normals(geometry: &Geometry) -> Vec<Vec3> {
    let positions = &geometry.positions;
    let mut normals = vec![[0.0f32; 3]; positions.len()];

    let sequential: Vec<u32>;
    let indices: &[u32] = match &geometry.indices {
        Some(indices) => indices,
        None => {
            sequential = (0..positions.len() as u32).collect();
            &sequential
        }
    };

    for face in indices.chunks_exact(3) {
        let [a, b, c] = [face[0] as usize, face[1] as usize, face[2] as usize];
        let face_normal = cross(
            sub(positions[b], positions[a]),
            sub(positions[c], positions[a]),
        );
        for v in [a, b, c] {
            for axis in 0..3 {
                normals[v][axis] += face_normal[axis];
            }
        }
    }

    for normal in &mut normals {
        let len = length(*normal);
        if len > f32::EPSILON {
            for component in normal.iter_mut() {
                *component /= len;
            }
        }
    }
    normals
}

/// Bounding box and sphere (centered on the box) of the vertex set
pub fn compute_bounds(geometry: &mut Geometry) {
    geometry.bounding_box = Aabb::from_points(geometry.positions.iter());
    geometry.bounding_sphere = geometry.bounding_box.map(|aabb| {
        let center = aabb.center();
        let radius = geometry
            .positions
            .iter()
            .map(|&p| length(sub(p, center)))
            .fold(0.0f32, f32::max);
        BoundingSphere { center, radius }
    });
}
