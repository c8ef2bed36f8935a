//! Scene data model
//!
//! A [`Scene`] is an ownership tree of [`Node`]s plus two arenas: materials
//! and textures. Meshes reference materials by [`MaterialHandle`], materials
//! reference textures by [`TextureHandle`], so sharing one texture between
//! many meshes is explicit and `Clone` on a scene is a full deep copy.

use std::collections::BTreeSet;

pub type Vec2 = [f32; 2];
pub type Vec3 = [f32; 3];
pub type Mat4 = [[f32; 4]; 4];

/// Column-major identity matrix
pub const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Index of a texture in its scene's texture arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(u32);

impl TextureHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a material in its scene's material arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(u32);

impl MaterialHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Bounding box of a point set, `None` when the set is empty
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Vec3>,
    {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut aabb = Self {
            min: first,
            max: first,
        };
        for p in iter {
            for axis in 0..3 {
                aabb.min[axis] = aabb.min[axis].min(p[axis]);
                aabb.max[axis] = aabb.max[axis].max(p[axis]);
            }
        }
        Some(aabb)
    }

    pub fn center(&self) -> Vec3 {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    pub fn size(&self) -> Vec3 {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

/// Vertex and index buffers of one mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub uvs: Option<Vec<Vec2>>,
    /// Secondary UV channel (lightmaps); dropped by the geometry optimizer
    pub uvs2: Option<Vec<Vec2>>,
    pub indices: Option<Vec<u32>>,
    pub bounding_box: Option<Aabb>,
    pub bounding_sphere: Option<BoundingSphere>,
}

impl Geometry {
    pub fn new(positions: Vec<Vec3>) -> Self {
        Self {
            positions,
            ..Self::default()
        }
    }

    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.indices = Some(indices);
        self
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_indexed(&self) -> bool {
        self.indices.is_some()
    }

    pub fn index_count(&self) -> usize {
        self.indices.as_ref().map_or(0, Vec::len)
    }

    /// `index_count / 3` when indexed, `vertex_count / 3` otherwise
    pub fn triangle_count(&self) -> usize {
        match &self.indices {
            Some(indices) => indices.len() / 3,
            None => self.positions.len() / 3,
        }
    }

    /// Byte length of the vertex attribute and index arrays
    pub fn byte_length(&self) -> usize {
        let vec3 = std::mem::size_of::<Vec3>();
        let vec2 = std::mem::size_of::<Vec2>();
        self.positions.len() * vec3
            + self.normals.as_ref().map_or(0, |n| n.len() * vec3)
            + self.uvs.as_ref().map_or(0, |uv| uv.len() * vec2)
            + self.uvs2.as_ref().map_or(0, |uv| uv.len() * vec2)
            + self.index_count() * std::mem::size_of::<u32>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinFilter {
    Nearest,
    Linear,
    /// Trilinear filtering across mip levels
    LinearMipmapLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

/// Sampling state of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampler {
    pub mag_filter: FilterMode,
    pub min_filter: MinFilter,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub generate_mipmaps: bool,
    /// `None` leaves the renderer default
    pub anisotropy: Option<u16>,
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: MinFilter::LinearMipmapLinear,
            wrap_s: WrapMode::ClampToEdge,
            wrap_t: WrapMode::ClampToEdge,
            generate_mipmaps: true,
            anisotropy: None,
        }
    }
}

/// A texture; decoded pixels are optional
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Texture {
    pub name: Option<String>,
    /// Width and height, when known at decode time
    pub dimensions: Option<(u32, u32)>,
    /// Tightly packed RGBA8 pixels matching `dimensions`
    pub pixels: Option<Vec<u8>>,
    pub sampler: Sampler,
}

impl Texture {
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            dimensions: Some((width, height)),
            ..Self::default()
        }
    }

    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            dimensions: Some((width, height)),
            pixels: Some(pixels),
            ..Self::default()
        }
    }
}

/// PBR material with up to five texture maps
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    pub base_color: [f32; 4],
    pub base_color_map: Option<TextureHandle>,
    pub normal_map: Option<TextureHandle>,
    pub roughness_map: Option<TextureHandle>,
    pub metalness_map: Option<TextureHandle>,
    pub occlusion_map: Option<TextureHandle>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            base_color: [1.0, 1.0, 1.0, 1.0],
            base_color_map: None,
            normal_map: None,
            roughness_map: None,
            metalness_map: None,
            occlusion_map: None,
        }
    }
}

impl Material {
    /// Texture maps referenced by this material, in slot order
    pub fn texture_handles(&self) -> impl Iterator<Item = TextureHandle> + '_ {
        [
            self.base_color_map,
            self.normal_map,
            self.roughness_map,
            self.metalness_map,
            self.occlusion_map,
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshNode {
    pub geometry: Geometry,
    pub material: Option<MaterialHandle>,
    /// Renderer hint: skip drawing when outside the view frustum
    pub frustum_culled: bool,
}

impl MeshNode {
    pub fn new(geometry: Geometry, material: Option<MaterialHandle>) -> Self {
        Self {
            geometry,
            material,
            frustum_culled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Camera {
    Perspective {
        yfov: f32,
        znear: f32,
        zfar: Option<f32>,
    },
    Orthographic {
        xmag: f32,
        ymag: f32,
        znear: f32,
        zfar: f32,
    },
}

/// One level of a distance-switched LOD structure
#[derive(Debug, Clone, PartialEq)]
pub struct LodLevel {
    /// Camera distance from which this level is used
    pub distance: f32,
    pub node: Node,
}

/// Distance-switched level-of-detail node, levels sorted by distance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LodNode {
    pub levels: Vec<LodLevel>,
}

impl LodNode {
    /// Level a renderer would pick at `distance`
    pub fn level_for_distance(&self, distance: f32) -> Option<&LodLevel> {
        self.levels
            .iter()
            .rev()
            .find(|level| distance >= level.distance)
            .or_else(|| self.levels.first())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    Mesh(MeshNode),
    Light(Light),
    Camera(Camera),
    Lod(LodNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: Option<String>,
    pub transform: Mat4,
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

/// How a visitor wants LOD levels traversed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LodTraversal {
    AllLevels,
    /// Only the full-detail level
    NearestLevel,
}

/// Read-only visitor over a node tree
pub trait SceneVisitor {
    fn visit_node(&mut self, _node: &Node, _depth: usize) {}

    fn visit_mesh(&mut self, _mesh: &MeshNode) {}

    fn visit_light(&mut self, _light: &Light) {}

    fn visit_camera(&mut self, _camera: &Camera) {}

    fn lod_traversal(&self) -> LodTraversal {
        LodTraversal::AllLevels
    }
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            name: None,
            transform: IDENTITY,
            kind,
            children: Vec::new(),
        }
    }

    pub fn group(children: Vec<Node>) -> Self {
        Self {
            children,
            ..Self::new(NodeKind::Group)
        }
    }

    pub fn mesh(geometry: Geometry, material: Option<MaterialHandle>) -> Self {
        Self::new(NodeKind::Mesh(MeshNode::new(geometry, material)))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn as_mesh(&self) -> Option<&MeshNode> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    /// Depth-first traversal dispatching on node kind
    pub fn accept<V: SceneVisitor + ?Sized>(&self, visitor: &mut V) {
        self.accept_at(visitor, 0);
    }

    fn accept_at<V: SceneVisitor + ?Sized>(&self, visitor: &mut V, depth: usize) {
        visitor.visit_node(self, depth);
        match &self.kind {
            NodeKind::Group => {}
            NodeKind::Mesh(mesh) => visitor.visit_mesh(mesh),
            NodeKind::Light(light) => visitor.visit_light(light),
            NodeKind::Camera(camera) => visitor.visit_camera(camera),
            NodeKind::Lod(lod) => match visitor.lod_traversal() {
                LodTraversal::AllLevels => {
                    for level in &lod.levels {
                        level.node.accept_at(visitor, depth + 1);
                    }
                }
                LodTraversal::NearestLevel => {
                    if let Some(level) = lod.levels.first() {
                        level.node.accept_at(visitor, depth + 1);
                    }
                }
            },
        }
        for child in &self.children {
            child.accept_at(visitor, depth + 1);
        }
    }

    /// Apply `f` to every mesh in the subtree, all LOD levels included
    pub fn try_for_each_mesh_mut<E, F>(&mut self, f: &mut F) -> Result<(), E>
    where
        F: FnMut(&mut MeshNode) -> Result<(), E>,
    {
        match &mut self.kind {
            NodeKind::Mesh(mesh) => f(mesh)?,
            NodeKind::Lod(lod) => {
                for level in &mut lod.levels {
                    level.node.try_for_each_mesh_mut(f)?;
                }
            }
            NodeKind::Group | NodeKind::Light(_) | NodeKind::Camera(_) => {}
        }
        for child in &mut self.children {
            child.try_for_each_mesh_mut(f)?;
        }
        Ok(())
    }

    pub fn mesh_count(&self) -> usize {
        struct Counter(usize);
        impl SceneVisitor for Counter {
            fn visit_mesh(&mut self, _mesh: &MeshNode) {
                self.0 += 1;
            }
        }
        let mut counter = Counter(0);
        self.accept(&mut counter);
        counter.0
    }
}

/// One loaded 3D asset
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub name: Option<String>,
    pub root: Node,
    materials: Vec<Material>,
    textures: Vec<Texture>,
}

impl Scene {
    pub fn new(root: Node) -> Self {
        Self {
            name: None,
            root,
            materials: Vec::new(),
            textures: Vec::new(),
        }
    }

    pub fn add_texture(&mut self, texture: Texture) -> TextureHandle {
        self.textures.push(texture);
        TextureHandle((self.textures.len() - 1) as u32)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialHandle {
        self.materials.push(material);
        MaterialHandle((self.materials.len() - 1) as u32)
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(handle.index())
    }

    pub fn texture_mut(&mut self, handle: TextureHandle) -> Option<&mut Texture> {
        self.textures.get_mut(handle.index())
    }

    pub fn material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle.index())
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }

    pub fn accept<V: SceneVisitor + ?Sized>(&self, visitor: &mut V) {
        self.root.accept(visitor);
    }

    pub fn try_for_each_mesh_mut<E, F>(&mut self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&mut MeshNode) -> Result<(), E>,
    {
        self.root.try_for_each_mesh_mut(&mut f)
    }

    /// Distinct textures reachable through the materials of the scene's meshes
    pub fn referenced_textures(&self) -> BTreeSet<TextureHandle> {
        struct Collector<'a> {
            scene: &'a Scene,
            textures: BTreeSet<TextureHandle>,
        }
        impl SceneVisitor for Collector<'_> {
            fn visit_mesh(&mut self, mesh: &MeshNode) {
                if let Some(material) = mesh.material.and_then(|h| self.scene.material(h)) {
                    self.textures.extend(material.texture_handles());
                }
            }
        }

        let mut collector = Collector {
            scene: self,
            textures: BTreeSet::new(),
        };
        self.accept(&mut collector);
        collector.textures
    }
}
